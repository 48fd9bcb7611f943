//! # Video Output Abstraction
//!
//! The video output stage scans video memory out to the connected display.
//! It owns the cable detection pins, the sync generator and the raster
//! timing registers.

use crate::VirtAddr;

/// Uncached mirror of the start of video memory
pub const VRAM_BASE: VirtAddr = VirtAddr::new(0xA500_0000);

/// Video output abstraction trait
pub trait VideoOutput: Send + Sync {
    /// Query the cable currently plugged into the A/V port
    ///
    /// The answer may change between calls; callers must not cache it
    /// across mode-sets.
    fn check_cable(&self) -> CableType;

    /// Program the sync generator and pixel format
    fn set_display_mode(&self, timing: TimingMode, pixel: PixelMode);

    /// Busy-wait until the next vertical blanking interval begins
    fn wait_vblank(&self);

    /// Get the start of scanned-out video memory
    fn vram_base(&self) -> VirtAddr;

    /// Copy `len` bytes into video memory through the store queues
    ///
    /// Synchronous: the copy has completed when this returns.
    ///
    /// # Safety
    /// `src` must be readable for `len` bytes and `dst` must lie inside
    /// video memory with room for `len` bytes. Both must be 32-byte aligned.
    unsafe fn store_queue_copy(&self, dst: VirtAddr, src: VirtAddr, len: usize);
}

/// A/V cable types as reported by the cable detection pins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CableType {
    /// VGA box, progressive 31 kHz output
    Vga,
    /// Nothing connected
    None,
    /// RGB (SCART)
    Rgb,
    /// Composite or S-Video
    Composite,
}

/// Hardware display timing presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimingMode {
    /// 320x240, VGA 60 Hz
    Vga320x240,
    /// 640x480, VGA 60 Hz
    Vga640x480,
    /// 320x240, NTSC 60 Hz
    Ntsc320x240,
    /// 640x480, NTSC 60 Hz interlaced
    Ntsc640x480,
    /// 768x480, NTSC 60 Hz interlaced
    Ntsc768x480,
    /// 320x240, PAL 50 Hz
    Pal320x240,
    /// 640x480, PAL 50 Hz interlaced
    PalIl640x480,
    /// 768x480, PAL 50 Hz interlaced
    PalIl768x480,
    /// 768x576, PAL 50 Hz interlaced
    PalIl768x576,
    /// 256x256, PAL 50 Hz interlaced
    PalIl256x256,
}

impl TimingMode {
    /// Displayed resolution of this preset
    pub const fn resolution(self) -> (u32, u32) {
        match self {
            TimingMode::Vga320x240 | TimingMode::Ntsc320x240 | TimingMode::Pal320x240 => (320, 240),
            TimingMode::Vga640x480 | TimingMode::Ntsc640x480 | TimingMode::PalIl640x480 => (640, 480),
            TimingMode::Ntsc768x480 | TimingMode::PalIl768x480 => (768, 480),
            TimingMode::PalIl768x576 => (768, 576),
            TimingMode::PalIl256x256 => (256, 256),
        }
    }
}

/// Framebuffer pixel layouts understood by the video output stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelMode {
    /// 15-bit, 5-5-5
    Rgb555,
    /// 16-bit, 5-6-5
    Rgb565,
    /// 32-bit, 8-8-8 with an unused top byte
    Rgb888,
}

impl PixelMode {
    /// Bytes occupied by one pixel
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelMode::Rgb555 | PixelMode::Rgb565 => 2,
            PixelMode::Rgb888 => 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timing_resolution() {
        assert_eq!(TimingMode::PalIl256x256.resolution(), (256, 256));
        assert_eq!(TimingMode::Ntsc768x480.resolution(), (768, 480));
        assert_eq!(TimingMode::Vga320x240.resolution(), (320, 240));
    }

    #[test]
    fn test_bytes_per_pixel() {
        assert_eq!(PixelMode::Rgb555.bytes_per_pixel(), 2);
        assert_eq!(PixelMode::Rgb565.bytes_per_pixel(), 2);
        assert_eq!(PixelMode::Rgb888.bytes_per_pixel(), 4);
    }
}
