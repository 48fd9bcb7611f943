//! # Surface Record
//!
//! The generic surface the surrounding framework hands to the driver. The
//! driver fills it in on every mode-set; the framework and application
//! then draw through `pixels` using `pitch`.

use bitflags::bitflags;
use dcvideo_hal::VirtAddr;

bitflags! {
    /// Surface flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SurfaceFlags: u32 {
        /// Surface lives in video memory
        const HWSURFACE = 0x0000_0001;
        /// Flips go through a back buffer
        const DOUBLEBUF = 0x4000_0000;
        /// Surface covers the whole display
        const FULLSCREEN = 0x8000_0000;
    }
}

/// Pixel layout of a surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelFormat {
    /// Bits per pixel
    pub bits_per_pixel: u8,
    /// Red channel mask
    pub r_mask: u32,
    /// Green channel mask
    pub g_mask: u32,
    /// Blue channel mask
    pub b_mask: u32,
}

impl PixelFormat {
    /// 16-bit 5-6-5, the power-on default
    pub const RGB565: Self = Self {
        bits_per_pixel: 16,
        r_mask: 0x0000_f800,
        g_mask: 0x0000_07e0,
        b_mask: 0x0000_001f,
    };

    /// Bytes occupied by one pixel
    pub const fn bytes_per_pixel(&self) -> u8 {
        self.bits_per_pixel.div_ceil(8)
    }
}

impl Default for PixelFormat {
    fn default() -> Self {
        Self::RGB565
    }
}

/// Screen rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    /// Left edge
    pub x: i16,
    /// Top edge
    pub y: i16,
    /// Width
    pub w: u16,
    /// Height
    pub h: u16,
}

impl Rect {
    /// Rectangle anchored at the origin
    pub const fn sized(w: u16, h: u16) -> Self {
        Self { x: 0, y: 0, w, h }
    }
}

/// Palette entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Color {
    #[allow(missing_docs)]
    pub r: u8,
    #[allow(missing_docs)]
    pub g: u8,
    #[allow(missing_docs)]
    pub b: u8,
}

/// Framework surface record
#[derive(Debug, Clone, Default)]
pub struct Surface {
    /// Surface flags
    pub flags: SurfaceFlags,
    /// Pixel layout
    pub format: PixelFormat,
    /// Width in pixels
    pub w: u32,
    /// Height in pixels
    pub h: u32,
    /// Bytes per row
    pub pitch: u32,
    /// First pixel, `None` until a mode is set
    pub pixels: Option<VirtAddr>,
}
