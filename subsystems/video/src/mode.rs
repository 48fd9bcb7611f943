//! # Mode Resolver
//!
//! Maps a requested geometry and depth onto a hardware timing preset and
//! pixel layout. Which presets are available depends on the display
//! connection: the cable is queried and the console region read on every
//! resolution, never cached.

use crate::config::{RefreshPolicy, RefreshPrompt, VideoDriver};
use crate::surface::{PixelFormat, Rect, SurfaceFlags};
use crate::{VideoError, VideoResult};
use dcvideo_hal::firmware::{Firmware, Region};
use dcvideo_hal::video::{CableType, PixelMode, TimingMode, VideoOutput};
use dcvideo_hal::ConsoleHal;

/// Geometries every display category supports, largest first
pub static VIDEO_MODES: [Rect; 5] = [
    Rect::sized(768, 576),
    Rect::sized(768, 480),
    Rect::sized(640, 480),
    Rect::sized(320, 240),
    Rect::sized(256, 256),
];

/// Hardware geometry programmed by the textured driver
pub const TEXTURED_DISPLAY: (u32, u32) = (640, 480);

/// Window sizes offered by the textured driver
pub static TEXTURE_MODES: [Rect; 25] = texture_modes();

const fn texture_modes() -> [Rect; 25] {
    let mut modes = [Rect::sized(0, 0); 25];
    let mut i = 0;
    while i < 25 {
        modes[i] = Rect::sized(64 << (i / 5), 64 << (i % 5));
        i += 1;
    }
    modes
}

/// Display connection category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayCategory {
    /// VGA box: progressive 60 Hz for the low resolutions
    Vga,
    /// 50 Hz television: interlaced PAL timings
    Pal,
    /// 60 Hz television: NTSC timings
    Ntsc,
}

impl DisplayCategory {
    /// Work out the category from the cable, the region and the policy
    ///
    /// `prompt` is only consulted on non-US consoles without a VGA cable,
    /// and only if the policy allows it.
    pub fn detect<H: ConsoleHal>(
        hal: &H,
        policy: &RefreshPolicy,
        prompt: &mut dyn RefreshPrompt,
    ) -> Self {
        if hal.video().check_cable() == CableType::Vga {
            return DisplayCategory::Vga;
        }
        if hal.firmware().region() != Region::Us && !policy.choose_60hz(prompt) {
            DisplayCategory::Pal
        } else {
            DisplayCategory::Ntsc
        }
    }

    /// Whether this category refreshes at 60 Hz
    pub const fn is_60hz(self) -> bool {
        !matches!(self, DisplayCategory::Pal)
    }

    /// Timing preset for a geometry, if the category offers one
    pub const fn timing(self, width: u32, height: u32) -> Option<TimingMode> {
        use DisplayCategory::*;
        use TimingMode::*;

        let timing = match (self, width, height) {
            (Vga, 320, 240) => Vga320x240,
            (Vga, 640, 480) => Vga640x480,
            (Pal, 320, 240) => Pal320x240,
            (Pal, 640, 480) => PalIl640x480,
            (Ntsc, 320, 240) => Ntsc320x240,
            (Ntsc, 640, 480) => Ntsc640x480,
            (Ntsc, 768, 480) => Ntsc768x480,
            (Vga | Pal, 768, 480) => PalIl768x480,
            (_, 768, 576) => PalIl768x576,
            (_, 256, 256) => PalIl256x256,
            _ => return None,
        };
        Some(timing)
    }
}

/// A concrete, programmable display mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayMode {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Timing preset
    pub timing: TimingMode,
    /// Pixel layout programmed into the video output stage
    pub pixel_mode: PixelMode,
    /// Depth and channel masks
    pub format: PixelFormat,
    /// Bytes per row
    pub pitch: u32,
    /// Whether the mode refreshes at 60 Hz
    pub refresh_60hz: bool,
}

impl DisplayMode {
    /// Resolve a request against a known display category
    pub fn resolve(category: DisplayCategory, width: u32, height: u32, bpp: u8) -> VideoResult<Self> {
        let Some(timing) = category.timing(width, height) else {
            log::warn!("no {}x{} mode for {:?} output", width, height, category);
            return Err(VideoError::UnsupportedMode);
        };
        let Some((pixel_mode, format)) = depth_layout(bpp) else {
            log::warn!("unsupported depth {} bpp", bpp);
            return Err(VideoError::UnsupportedMode);
        };

        Ok(Self {
            width,
            height,
            timing,
            pixel_mode,
            format,
            pitch: width * pixel_mode.bytes_per_pixel() as u32,
            refresh_60hz: category.is_60hz(),
        })
    }

    /// Bits per pixel after promotion
    pub const fn bpp(&self) -> u8 {
        self.format.bits_per_pixel
    }

    /// Size of one full frame in bytes
    pub const fn frame_bytes(&self) -> usize {
        self.pitch as usize * self.height as usize
    }
}

/// Query the connection and resolve a mode request
pub fn resolve_mode<H: ConsoleHal>(
    hal: &H,
    policy: &RefreshPolicy,
    prompt: &mut dyn RefreshPrompt,
    width: u32,
    height: u32,
    bpp: u8,
) -> VideoResult<DisplayMode> {
    let category = DisplayCategory::detect(hal, policy, prompt);
    DisplayMode::resolve(category, width, height, bpp)
}

/// Pixel mode and masks for a requested depth; 24 is promoted to 32
fn depth_layout(bpp: u8) -> Option<(PixelMode, PixelFormat)> {
    let layout = match bpp {
        15 => (
            PixelMode::Rgb555,
            PixelFormat { bits_per_pixel: 15, r_mask: 0x7c00, g_mask: 0x03e0, b_mask: 0x001f },
        ),
        16 => (PixelMode::Rgb565, PixelFormat::RGB565),
        24 | 32 => (
            PixelMode::Rgb888,
            PixelFormat { bits_per_pixel: 32, r_mask: 0x00ff_0000, g_mask: 0x0000_ff00, b_mask: 0x0000_00ff },
        ),
        _ => return None,
    };
    Some(layout)
}

/// Modes offered for a depth and flag combination
///
/// `None` means no mode is available at that depth.
pub fn list_modes(driver: VideoDriver, bpp: u8, flags: SurfaceFlags) -> Option<&'static [Rect]> {
    if driver == VideoDriver::Textured && !flags.contains(SurfaceFlags::FULLSCREEN) {
        return match bpp {
            16 => Some(&TEXTURE_MODES[..]),
            _ => None,
        };
    }
    match bpp {
        15 | 16 | 32 => Some(&VIDEO_MODES[..]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AcceptDefault;
    use dcvideo_hal::sim::SimConsole;

    const CATEGORIES: [DisplayCategory; 3] =
        [DisplayCategory::Vga, DisplayCategory::Pal, DisplayCategory::Ntsc];

    struct Answer(bool, usize);

    impl RefreshPrompt for Answer {
        fn ask_60hz(&mut self, _default_60hz: bool) -> bool {
            self.1 += 1;
            self.0
        }
    }

    #[test]
    fn test_masks_for_every_supported_mode() {
        for category in CATEGORIES {
            for rect in VIDEO_MODES {
                let (w, h) = (rect.w as u32, rect.h as u32);

                let m15 = DisplayMode::resolve(category, w, h, 15).unwrap();
                assert_eq!((m15.format.r_mask, m15.format.g_mask, m15.format.b_mask), (0x7c00, 0x03e0, 0x001f));
                assert_eq!(m15.pitch, w * 2);

                let m16 = DisplayMode::resolve(category, w, h, 16).unwrap();
                assert_eq!((m16.format.r_mask, m16.format.g_mask, m16.format.b_mask), (0xf800, 0x07e0, 0x001f));
                assert_eq!(m16.pixel_mode, PixelMode::Rgb565);
                assert_eq!(m16.pitch, w * 2);

                let m32 = DisplayMode::resolve(category, w, h, 32).unwrap();
                assert_eq!((m32.format.r_mask, m32.format.g_mask, m32.format.b_mask), (0xff0000, 0x00ff00, 0x0000ff));
                assert_eq!(m32.pitch, w * 4);
            }
        }
    }

    #[test]
    fn test_24_promoted_to_32() {
        let mode = DisplayMode::resolve(DisplayCategory::Ntsc, 640, 480, 24).unwrap();
        assert_eq!(mode.bpp(), 32);
        assert_eq!(mode.pixel_mode, PixelMode::Rgb888);
        assert_eq!(mode.pitch, 2560);
        assert_eq!(mode.frame_bytes(), 2560 * 480);
    }

    #[test]
    fn test_unknown_geometry_rejected_at_every_depth() {
        let sizes = [(800, 600), (640, 400), (320, 200), (512, 512), (0, 0), (480, 640)];
        for category in CATEGORIES {
            for (w, h) in sizes {
                for bpp in [15, 16, 24, 32] {
                    assert_eq!(
                        DisplayMode::resolve(category, w, h, bpp),
                        Err(VideoError::UnsupportedMode)
                    );
                }
            }
        }
    }

    #[test]
    fn test_unknown_depth_rejected() {
        for bpp in [0, 1, 8, 12, 17, 31, 33] {
            assert_eq!(
                DisplayMode::resolve(DisplayCategory::Ntsc, 640, 480, bpp),
                Err(VideoError::UnsupportedMode)
            );
        }
    }

    #[test]
    fn test_timing_tables() {
        assert_eq!(DisplayCategory::Vga.timing(640, 480), Some(TimingMode::Vga640x480));
        assert_eq!(DisplayCategory::Vga.timing(768, 480), Some(TimingMode::PalIl768x480));
        assert_eq!(DisplayCategory::Pal.timing(320, 240), Some(TimingMode::Pal320x240));
        assert_eq!(DisplayCategory::Pal.timing(640, 480), Some(TimingMode::PalIl640x480));
        assert_eq!(DisplayCategory::Ntsc.timing(768, 480), Some(TimingMode::Ntsc768x480));
        assert_eq!(DisplayCategory::Ntsc.timing(768, 576), Some(TimingMode::PalIl768x576));
        assert_eq!(DisplayCategory::Ntsc.timing(256, 256), Some(TimingMode::PalIl256x256));

        for category in CATEGORIES {
            for rect in VIDEO_MODES {
                let timing = category.timing(rect.w as u32, rect.h as u32).unwrap();
                assert_eq!(timing.resolution(), (rect.w as u32, rect.h as u32));
            }
        }
    }

    #[test]
    fn test_detect_vga_skips_region() {
        let sim = SimConsole::new();
        sim.set_cable(CableType::Vga);
        sim.set_region(Region::Europe);
        let mut prompt = Answer(false, 0);

        let category = DisplayCategory::detect(&sim, &RefreshPolicy::default(), &mut prompt);
        assert_eq!(category, DisplayCategory::Vga);
        assert!(category.is_60hz());
        assert_eq!(sim.region_queries(), 0);
        assert_eq!(prompt.1, 0);
    }

    #[test]
    fn test_detect_us_never_prompts() {
        let sim = SimConsole::new();
        let mut prompt = Answer(false, 0);
        let category = DisplayCategory::detect(&sim, &RefreshPolicy::default(), &mut prompt);
        assert_eq!(category, DisplayCategory::Ntsc);
        assert_eq!(prompt.1, 0);
    }

    #[test]
    fn test_detect_europe_follows_prompt() {
        let sim = SimConsole::new();
        sim.set_region(Region::Europe);

        let mut no = Answer(false, 0);
        let pal = DisplayCategory::detect(&sim, &RefreshPolicy::default(), &mut no);
        assert_eq!(pal, DisplayCategory::Pal);
        assert!(!pal.is_60hz());
        assert_eq!(no.1, 1);

        let mut yes = Answer(true, 0);
        assert_eq!(
            DisplayCategory::detect(&sim, &RefreshPolicy::default(), &mut yes),
            DisplayCategory::Ntsc
        );
    }

    #[test]
    fn test_detect_suppressed_prompt_uses_default() {
        let sim = SimConsole::new();
        sim.set_region(Region::Japan);
        let policy = RefreshPolicy { show_prompt: false, default_60hz: true };
        let mut prompt = Answer(false, 0);

        assert_eq!(DisplayCategory::detect(&sim, &policy, &mut prompt), DisplayCategory::Ntsc);
        assert_eq!(prompt.1, 0);
    }

    #[test]
    fn test_resolve_queries_every_time() {
        let sim = SimConsole::new();
        let policy = RefreshPolicy::default();
        resolve_mode(&sim, &policy, &mut AcceptDefault, 640, 480, 16).unwrap();
        sim.set_cable(CableType::Vga);
        let mode = resolve_mode(&sim, &policy, &mut AcceptDefault, 640, 480, 16).unwrap();
        assert_eq!(mode.timing, TimingMode::Vga640x480);
        assert_eq!(sim.cable_queries(), 2);
    }

    #[test]
    fn test_list_modes() {
        let none = SurfaceFlags::empty();
        assert_eq!(list_modes(VideoDriver::Dma, 16, none), Some(&VIDEO_MODES[..]));
        assert_eq!(list_modes(VideoDriver::Dma, 15, none), Some(&VIDEO_MODES[..]));
        assert_eq!(list_modes(VideoDriver::Direct, 32, none), Some(&VIDEO_MODES[..]));
        assert_eq!(list_modes(VideoDriver::Dma, 24, none), None);
        assert_eq!(list_modes(VideoDriver::Dma, 8, none), None);

        assert_eq!(list_modes(VideoDriver::Textured, 16, none), Some(&TEXTURE_MODES[..]));
        assert_eq!(list_modes(VideoDriver::Textured, 32, none), None);
        assert_eq!(
            list_modes(VideoDriver::Textured, 32, SurfaceFlags::FULLSCREEN),
            Some(&VIDEO_MODES[..])
        );
    }

    #[test]
    fn test_texture_mode_table() {
        assert_eq!(TEXTURE_MODES[0], Rect::sized(64, 64));
        assert_eq!(TEXTURE_MODES[4], Rect::sized(64, 1024));
        assert_eq!(TEXTURE_MODES[12], Rect::sized(256, 256));
        assert_eq!(TEXTURE_MODES[24], Rect::sized(1024, 1024));
    }
}
