//! # Device Lifecycle Manager
//!
//! [`DcVideo`] owns every piece of driver state: the hardware handle, the
//! configuration, the active mode and its framebuffer. Nothing lives in
//! globals.
//!
//! A mode-set validates and resolves the request first, so a rejected
//! request leaves the previous mode running. Once the request is known to
//! be good the previous mode is torn down completely before the hardware
//! is reprogrammed. If bringing up the new mode fails halfway, everything
//! acquired so far is released and the device is left uninitialized.

use crate::config::{AcceptDefault, RefreshPrompt, VideoConfig, VideoDriver};
use crate::framebuffer::{self, AllocRequest, CopyEngine, Framebuffer, Strategy, WindowRequest};
use crate::mode::{self, DisplayMode, TEXTURED_DISPLAY};
use crate::present;
use crate::surface::{Color, PixelFormat, Rect, Surface, SurfaceFlags};
use crate::{DisplayStatus, VideoError, VideoResult};
use alloc::boxed::Box;
use alloc::sync::Arc;
use core::fmt;
use dcvideo_hal::dma::DmaEngine;
use dcvideo_hal::pvr::PowerVr;
use dcvideo_hal::video::VideoOutput;
use dcvideo_hal::ConsoleHal;

/// Framework-facing video device interface
pub trait VideoDevice {
    /// Backend name
    fn name(&self) -> &'static str;

    /// Prepare the device and report the power-on pixel format
    fn init(&mut self) -> VideoResult<PixelFormat>;

    /// Modes available at `bpp` with `flags`, largest first
    fn list_modes(&self, bpp: u8, flags: SurfaceFlags) -> Option<&'static [Rect]>;

    /// Switch to a new mode and describe it in `surface`
    fn set_mode(
        &mut self,
        surface: &mut Surface,
        width: u32,
        height: u32,
        bpp: u8,
        flags: SurfaceFlags,
    ) -> VideoResult<()>;

    /// Load palette entries starting at `first`
    fn set_colors(&mut self, first: usize, colors: &[Color]) -> bool;

    /// Push the listed regions of the surface to the display
    fn update_rects(&mut self, rects: &[Rect]) -> VideoResult<()>;

    /// Present the current frame
    fn flip(&mut self) -> VideoResult<()>;

    /// Allocate an additional hardware surface
    fn alloc_hw_surface(&mut self, surface: &mut Surface) -> VideoResult<()>;

    /// Free an additional hardware surface
    fn free_hw_surface(&mut self, _surface: &mut Surface) {}

    /// Lock a hardware surface for CPU access
    fn lock_hw_surface(&mut self, _surface: &mut Surface) -> VideoResult<()> {
        Ok(())
    }

    /// Release a lock taken with [`VideoDevice::lock_hw_surface`]
    fn unlock_hw_surface(&mut self, _surface: &mut Surface) {}

    /// Release everything and return the hardware to idle
    ///
    /// Idempotent. Must not race a `flip` or `update_rects` on another
    /// thread.
    fn quit(&mut self);
}

/// Static description of a video backend
#[derive(Debug, Clone, Copy)]
pub struct VideoBootstrap {
    /// Short name used to select the backend
    pub name: &'static str,
    /// Human readable description
    pub description: &'static str,
    /// Probe whether the backend can run
    pub available: fn() -> bool,
}

impl VideoBootstrap {
    /// Create a device bound to `hal`
    pub fn create<H: ConsoleHal>(&self, hal: H) -> DcVideo<H> {
        log::debug!("creating {} device on {}", self.name, hal.platform_name());
        DcVideo::new(hal)
    }
}

fn always_available() -> bool {
    true
}

/// Bootstrap entry for the Dreamcast backend
pub static DC_BOOTSTRAP: VideoBootstrap = VideoBootstrap {
    name: "dcvideo",
    description: "Dreamcast Video",
    available: always_available,
};

/// State of an active mode
#[derive(Debug)]
struct ActiveMode {
    mode: DisplayMode,
    /// GPU and DMA channel were brought up for this mode
    hardware: bool,
    framebuffer: Framebuffer,
}

/// Dreamcast video device
pub struct DcVideo<H: ConsoleHal> {
    hal: H,
    config: VideoConfig,
    prompt: Box<dyn RefreshPrompt + Send>,
    status: Arc<DisplayStatus>,
    active: Option<ActiveMode>,
}

impl<H: ConsoleHal> fmt::Debug for DcVideo<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DcVideo")
            .field("platform", &self.hal.platform_name())
            .field("config", &self.config)
            .field("status", &self.status)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

impl<H: ConsoleHal> DcVideo<H> {
    /// Create a device with the default configuration
    pub fn new(hal: H) -> Self {
        Self::with_config(hal, VideoConfig::default())
    }

    /// Create a device with `config`
    pub fn with_config(hal: H, config: VideoConfig) -> Self {
        Self {
            hal,
            config,
            prompt: Box::new(AcceptDefault),
            status: Arc::new(DisplayStatus::new()),
            active: None,
        }
    }

    /// Use `prompt` to ask the user about the refresh rate
    pub fn with_prompt<P: RefreshPrompt + Send + 'static>(mut self, prompt: P) -> Self {
        self.prompt = Box::new(prompt);
        self
    }

    /// Hardware handle
    pub fn hal(&self) -> &H {
        &self.hal
    }

    /// Current configuration
    pub fn config(&self) -> &VideoConfig {
        &self.config
    }

    /// Shared display status
    pub fn status(&self) -> Arc<DisplayStatus> {
        self.status.clone()
    }

    /// Active display mode
    pub fn mode(&self) -> Option<&DisplayMode> {
        self.active.as_ref().map(|active| &active.mode)
    }

    /// Active framebuffer
    pub fn framebuffer(&self) -> Option<&Framebuffer> {
        self.active.as_ref().map(|active| &active.framebuffer)
    }

    /// Select the driver used by the next mode-set
    pub fn set_video_driver(&mut self, driver: VideoDriver) {
        self.config.driver = driver;
    }

    /// Enable or disable the vertical-blank wait on present
    pub fn set_vertical_wait(&mut self, wait: bool) {
        self.config.vertical_wait = wait;
    }

    /// Show or suppress the refresh-rate prompt
    pub fn show_refresh_prompt(&mut self, show: bool) {
        self.config.refresh.show_prompt = show;
    }

    /// Set the refresh-rate answer used when the prompt is suppressed
    pub fn set_default_60hz(&mut self, default_60hz: bool) {
        self.config.refresh.default_60hz = default_60hz;
    }

    /// Set the part of the texture shown by the textured driver
    ///
    /// With a textured mode active the sampled rectangle changes at once.
    /// Otherwise the size is kept and applied by the next textured
    /// mode-set.
    pub fn set_window(&mut self, width: u32, height: u32) -> VideoResult<()> {
        match self.active.as_mut().and_then(|active| active.framebuffer.texture_mut()) {
            Some(texture) => texture.set_logical(width, height),
            None => {
                self.config.window = Some((width, height));
                Ok(())
            }
        }
    }

    fn bring_up(&self, textured: bool, double_buffered: bool) -> VideoResult<bool> {
        if textured {
            self.hal.gpu().init_defaults()?;
            if let Err(err) = self.hal.dma().init() {
                self.hal.gpu().shutdown();
                return Err(err.into());
            }
            Ok(true)
        } else if double_buffered && self.config.driver != VideoDriver::Direct {
            self.hal.dma().init()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn abandon(&self, framebuffer: Option<Framebuffer>, hardware: bool) {
        if let Some(framebuffer) = framebuffer {
            framebuffer.release(&self.hal);
        }
        if hardware {
            self.hal.gpu().shutdown();
        }
    }

    fn teardown(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };

        if active.hardware {
            present::drain(&self.hal);
            if active.framebuffer.strategy() == Strategy::DoubleBufferDma {
                if let Err(err) = self.hal.gpu().init_defaults() {
                    log::warn!("gpu reset failed during teardown: {}", err);
                }
            }
        }
        active.framebuffer.release(&self.hal);
        if active.hardware {
            self.hal.gpu().shutdown();
        }
        log::debug!("{}x{} mode torn down", active.mode.width, active.mode.height);
    }
}

impl<H: ConsoleHal> VideoDevice for DcVideo<H> {
    fn name(&self) -> &'static str {
        DC_BOOTSTRAP.name
    }

    fn init(&mut self) -> VideoResult<PixelFormat> {
        log::info!("{} on {}", DC_BOOTSTRAP.description, self.hal.platform_name());
        Ok(PixelFormat::RGB565)
    }

    fn list_modes(&self, bpp: u8, flags: SurfaceFlags) -> Option<&'static [Rect]> {
        mode::list_modes(self.config.driver, bpp, flags)
    }

    fn set_mode(
        &mut self,
        surface: &mut Surface,
        width: u32,
        height: u32,
        bpp: u8,
        flags: SurfaceFlags,
    ) -> VideoResult<()> {
        let textured =
            self.config.driver == VideoDriver::Textured && !flags.contains(SurfaceFlags::FULLSCREEN);
        let double_buffered = flags.contains(SurfaceFlags::DOUBLEBUF);

        let window = if textured {
            let request = WindowRequest { logical: (width, height), bpp };
            let backing = request.backing_size()?;
            if let Some((w, h)) = self.config.window {
                if w == 0 || h == 0 || w > backing.0 || h > backing.1 {
                    log::warn!("window {}x{} does not fit {}x{} texture", w, h, backing.0, backing.1);
                    return Err(VideoError::UnsupportedMode);
                }
            }
            Some(request)
        } else {
            None
        };

        let (hw_width, hw_height, hw_bpp) = match window {
            Some(_) => (TEXTURED_DISPLAY.0, TEXTURED_DISPLAY.1, 16),
            None => (width, height, bpp),
        };
        let mode = mode::resolve_mode(
            &self.hal,
            &self.config.refresh,
            self.prompt.as_mut(),
            hw_width,
            hw_height,
            hw_bpp,
        )?;

        self.teardown();
        self.hal.video().set_display_mode(mode.timing, mode.pixel_mode);

        let hardware = self.bring_up(textured, double_buffered)?;
        let engine = match self.config.driver {
            VideoDriver::Direct => CopyEngine::Cpu,
            _ => CopyEngine::Dma,
        };
        let request = AllocRequest { double_buffered, engine, window };
        let mut framebuffer = match framebuffer::allocate(&self.hal, &mode, &request) {
            Ok(framebuffer) => framebuffer,
            Err(err) => {
                log::warn!("framebuffer allocation for {}x{} failed: {}", width, height, err);
                self.abandon(None, hardware);
                return Err(err);
            }
        };

        if let Some((w, h)) = self.config.window {
            if let Some(texture) = framebuffer.texture_mut() {
                if let Err(err) = texture.set_logical(w, h) {
                    self.abandon(Some(framebuffer), hardware);
                    return Err(err);
                }
                self.config.window = None;
            }
        }

        let mut surface_flags = if textured {
            SurfaceFlags::empty()
        } else {
            SurfaceFlags::FULLSCREEN | SurfaceFlags::HWSURFACE
        };
        if framebuffer.is_double_buffered() {
            surface_flags |= SurfaceFlags::DOUBLEBUF;
        }
        surface.flags = surface_flags;
        surface.format = mode.format;
        surface.w = framebuffer.width();
        surface.h = framebuffer.height();
        surface.pitch = framebuffer.pitch();
        surface.pixels = Some(framebuffer.pixels());

        self.status.publish_refresh(mode.refresh_60hz);
        self.status.publish_pointer_shift(surface.w);

        log::info!(
            "{}x{}@{} set: {:?} {:?}, {:?}",
            surface.w,
            surface.h,
            mode.bpp(),
            mode.timing,
            mode.pixel_mode,
            framebuffer.strategy()
        );

        self.active = Some(ActiveMode { mode, hardware, framebuffer });
        Ok(())
    }

    fn set_colors(&mut self, _first: usize, _colors: &[Color]) -> bool {
        true
    }

    fn update_rects(&mut self, _rects: &[Rect]) -> VideoResult<()> {
        let active = self.active.as_ref().ok_or(VideoError::NotInitialized)?;
        if active.framebuffer.strategy() == Strategy::TexturedBlit {
            present::present(&self.hal, &active.framebuffer, self.config.vertical_wait)?;
        }
        Ok(())
    }

    fn flip(&mut self) -> VideoResult<()> {
        let active = self.active.as_ref().ok_or(VideoError::NotInitialized)?;
        present::present(&self.hal, &active.framebuffer, self.config.vertical_wait)
    }

    fn alloc_hw_surface(&mut self, _surface: &mut Surface) -> VideoResult<()> {
        Err(VideoError::NotSupported)
    }

    fn quit(&mut self) {
        self.teardown();
    }
}

impl<H: ConsoleHal> Drop for DcVideo<H> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcvideo_hal::sim::SimConsole;

    #[test]
    fn test_bootstrap() {
        assert_eq!(DC_BOOTSTRAP.name, "dcvideo");
        assert_eq!(DC_BOOTSTRAP.description, "Dreamcast Video");
        assert!((DC_BOOTSTRAP.available)());

        let mut device = DC_BOOTSTRAP.create(SimConsole::new());
        assert_eq!(device.name(), "dcvideo");
        assert_eq!(device.init(), Ok(PixelFormat::RGB565));
    }

    #[test]
    fn test_unsupported_extras() {
        let mut device = DcVideo::new(SimConsole::new());
        let mut surface = Surface::default();

        assert!(device.set_colors(0, &[Color { r: 1, g: 2, b: 3 }]));
        assert_eq!(device.alloc_hw_surface(&mut surface), Err(VideoError::NotSupported));
        assert_eq!(device.lock_hw_surface(&mut surface), Ok(()));
        device.unlock_hw_surface(&mut surface);
        device.free_hw_surface(&mut surface);
    }

    #[test]
    fn test_present_before_mode_set() {
        let mut device = DcVideo::new(SimConsole::new());
        assert_eq!(device.flip(), Err(VideoError::NotInitialized));
        assert_eq!(device.update_rects(&[]), Err(VideoError::NotInitialized));
    }

    #[test]
    fn test_list_modes_follows_driver() {
        let mut device = DcVideo::new(SimConsole::new());
        assert_eq!(device.list_modes(16, SurfaceFlags::empty()).map(<[Rect]>::len), Some(5));

        device.set_video_driver(VideoDriver::Textured);
        assert_eq!(device.list_modes(16, SurfaceFlags::empty()).map(<[Rect]>::len), Some(25));
        assert_eq!(device.list_modes(32, SurfaceFlags::empty()), None);
        assert_eq!(device.list_modes(16, SurfaceFlags::FULLSCREEN).map(<[Rect]>::len), Some(5));
    }

    #[test]
    fn test_window_pending_without_textured_mode() {
        let mut device = DcVideo::new(SimConsole::new());
        device.set_window(200, 150).unwrap();
        assert_eq!(device.config().window, Some((200, 150)));
    }

    #[test]
    fn test_policy_setters() {
        let mut device = DcVideo::new(SimConsole::new());
        device.set_vertical_wait(true);
        device.show_refresh_prompt(false);
        device.set_default_60hz(true);
        device.set_video_driver(VideoDriver::Direct);

        let config = device.config();
        assert!(config.vertical_wait);
        assert!(!config.refresh.show_prompt);
        assert!(config.refresh.default_60hz);
        assert_eq!(config.driver, VideoDriver::Direct);
    }
}
