//! # DMA Engine Abstraction
//!
//! The PowerVR DMA channel moves data from main RAM into video or texture
//! memory without CPU involvement. There is a single channel: a transfer
//! may only be started once the previous one has completed.

use crate::{HalResult, VirtAddr};

/// Required alignment of a DMA source address targeting video memory
pub const VRAM_DMA_ALIGN: usize = 64;

/// Required alignment of a DMA source address targeting texture memory
pub const TEXTURE_DMA_ALIGN: usize = 32;

/// DMA engine abstraction trait
pub trait DmaEngine: Send + Sync {
    /// Initialize the DMA channel
    fn init(&self) -> HalResult<()>;

    /// Check whether the channel is idle and may accept a new transfer
    fn is_ready(&self) -> bool;

    /// Start a transfer of `len` bytes from `src` to `dst`
    ///
    /// With [`TransferMode::Async`] this returns as soon as the transfer is
    /// kicked; completion is observed through [`DmaEngine::is_ready`].
    /// With [`TransferMode::Blocking`] it returns after completion.
    ///
    /// # Safety
    /// - `src` must be readable for `len` bytes, aligned for `target`, and
    ///   flushed from the CPU cache.
    /// - The source range must stay valid and unmodified until the engine
    ///   reports ready again.
    /// - The channel must be ready when this is called.
    unsafe fn transfer(
        &self,
        src: VirtAddr,
        dst: VirtAddr,
        len: usize,
        target: DmaTarget,
        mode: TransferMode,
    ) -> HalResult<()>;
}

/// Destination bus for a DMA transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaTarget {
    /// 32-bit video memory bus (framebuffer)
    Vram32,
    /// 64-bit texture memory bus
    Texture64,
}

impl DmaTarget {
    /// Source alignment required by this target
    pub const fn source_align(self) -> usize {
        match self {
            DmaTarget::Vram32 => VRAM_DMA_ALIGN,
            DmaTarget::Texture64 => TEXTURE_DMA_ALIGN,
        }
    }
}

/// Whether a transfer call waits for completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    /// Return once kicked
    Async,
    /// Return once complete
    Blocking,
}

static_assertions::const_assert!(VRAM_DMA_ALIGN.is_power_of_two());
static_assertions::const_assert!(TEXTURE_DMA_ALIGN.is_power_of_two());
static_assertions::const_assert!(VRAM_DMA_ALIGN % crate::cache::CACHE_LINE_SIZE == 0);
