//! # Framebuffer Allocator
//!
//! Backs a resolved [`DisplayMode`] with memory. Three layouts exist, one
//! per presentation strategy:
//!
//! - **Direct**: the surface is video memory itself. Nothing is allocated.
//! - **Double-buffered**: the application draws into a staging buffer in
//!   main RAM that is copied to video memory on every flip.
//! - **Textured**: the application draws into a power-of-two GPU texture,
//!   optionally through a staging buffer, and the GPU scales it to the
//!   display.
//!
//! Staging buffers are over-allocated and the pixel pointer is rounded up
//! inside them, so the buffer keeps two handles: the owning allocation and
//! the aligned address handed out for I/O.

use crate::mode::DisplayMode;
use crate::{VideoError, VideoResult};
use alloc::vec::Vec;
use dcvideo_hal::dma::{TEXTURE_DMA_ALIGN, VRAM_DMA_ALIGN};
use dcvideo_hal::pvr::{
    Filter, ListType, PolyContext, PolyHeader, PowerVr, TextureFormat, MAX_TEXTURE_DIM,
};
use dcvideo_hal::video::VideoOutput;
use dcvideo_hal::{ConsoleHal, VirtAddr};
use static_assertions::const_assert;

/// Slack added to a staging buffer that feeds video memory
pub const VRAM_STAGING_PAD: usize = 2 * VRAM_DMA_ALIGN;

/// Slack added to a staging buffer that feeds texture memory
pub const TEXTURE_STAGING_PAD: usize = 2 * TEXTURE_DMA_ALIGN;

/// Smallest texture backing dimension
pub const MIN_BACKING_DIM: u32 = 64;

/// Bytes per texel of the backing texture (RGB565)
const TEXEL_BYTES: usize = 2;

const_assert!(VRAM_STAGING_PAD >= 64);
const_assert!(TEXTURE_STAGING_PAD >= 32);

/// How a frame reaches the display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Surface is video memory; present only waits for vertical blank
    Direct,
    /// Staging buffer is copied into video memory on present
    DoubleBufferDma,
    /// Texture is drawn as a full-screen quad on present
    TexturedBlit,
}

/// Engine that copies a staging buffer into video memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyEngine {
    /// Asynchronous DMA
    Dma,
    /// Synchronous store-queue copy
    Cpu,
}

/// Over-allocated, aligned buffer in main RAM
#[derive(Debug)]
pub struct StagingBuffer {
    raw: Vec<u8>,
    aligned: VirtAddr,
    len: usize,
}

impl StagingBuffer {
    /// Allocate `len` zeroed bytes starting on an `align` boundary
    ///
    /// `pad` extra bytes are reserved so the aligned range always fits.
    pub fn allocate(len: usize, align: usize, pad: usize) -> VideoResult<Self> {
        debug_assert!(align.is_power_of_two() && pad >= align);

        let total = len.checked_add(pad).ok_or(VideoError::OutOfMemory)?;
        let mut raw = Vec::new();
        raw.try_reserve_exact(total).map_err(|_| VideoError::OutOfMemory)?;
        raw.resize(total, 0u8);

        let aligned = VirtAddr::from_ptr(raw.as_mut_ptr()).align_up(align as u64);
        log::debug!(
            "staging buffer: {} bytes at {} (raw {} bytes at {:#x})",
            len,
            aligned,
            total,
            raw.as_ptr() as usize
        );

        Ok(Self { raw, aligned, len })
    }

    /// Aligned start of the usable range
    pub fn addr(&self) -> VirtAddr {
        self.aligned
    }

    /// Usable length in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the usable range is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Start of the owning allocation
    pub fn raw_addr(&self) -> VirtAddr {
        VirtAddr::from_ptr(self.raw.as_ptr())
    }

    /// Length of the owning allocation
    pub fn raw_len(&self) -> usize {
        self.raw.len()
    }
}

/// Texture-space rectangle sampled by the full-screen quad
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UvRect {
    /// Left U
    pub u1: f32,
    /// Top V
    pub v1: f32,
    /// Right U
    pub u2: f32,
    /// Bottom V
    pub v2: f32,
}

impl UvRect {
    /// Rectangle covering `logical` texels of a `backing`-sized texture
    ///
    /// Near edges are inset by 0.3 texel and far edges outset by 0.7 texel
    /// so point sampling never bleeds in a neighbouring row or column.
    pub fn for_window(logical: (u32, u32), backing: (u32, u32)) -> Self {
        let (bw, bh) = (backing.0 as f32, backing.1 as f32);
        Self {
            u1: 0.3 / bw,
            v1: 0.3 / bh,
            u2: (logical.0 as f32 + 0.7) / bw,
            v2: (logical.1 as f32 + 0.7) / bh,
        }
    }
}

/// Power-of-two texture holding the window contents
#[derive(Debug)]
pub struct TextureBacking {
    addr: VirtAddr,
    backing: (u32, u32),
    logical: (u32, u32),
    uv: UvRect,
    header: PolyHeader,
}

impl TextureBacking {
    /// Texture memory address
    pub fn addr(&self) -> VirtAddr {
        self.addr
    }

    /// Backing texture dimensions
    pub fn backing_size(&self) -> (u32, u32) {
        self.backing
    }

    /// Logical window dimensions
    pub fn logical_size(&self) -> (u32, u32) {
        self.logical
    }

    /// Sampled rectangle
    pub fn uv(&self) -> UvRect {
        self.uv
    }

    /// Polygon header sampling this texture, compiled at allocation
    pub fn header(&self) -> &PolyHeader {
        &self.header
    }

    /// Size of the texture in bytes
    pub fn bytes(&self) -> usize {
        self.backing.0 as usize * self.backing.1 as usize * TEXEL_BYTES
    }

    /// Change the logical window size and recompute the sampled rectangle
    pub fn set_logical(&mut self, width: u32, height: u32) -> VideoResult<()> {
        if width == 0 || height == 0 || width > self.backing.0 || height > self.backing.1 {
            return Err(VideoError::UnsupportedMode);
        }
        self.logical = (width, height);
        self.uv = UvRect::for_window(self.logical, self.backing);
        Ok(())
    }
}

/// Smallest power-of-two backing dimension, doubling from 64
///
/// Returns `None` when `logical` does not fit a GPU texture.
pub fn backing_dimension(logical: u32) -> Option<u32> {
    if logical > MAX_TEXTURE_DIM {
        return None;
    }
    let mut dim = MIN_BACKING_DIM;
    while dim < logical {
        dim <<= 1;
    }
    Some(dim)
}

/// Textured window request
///
/// The requested surface size is the size the framework displays, so one
/// size serves as both the logical and the displayed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowRequest {
    /// Size the application renders at
    pub logical: (u32, u32),
    /// Requested depth
    pub bpp: u8,
}

impl WindowRequest {
    /// Validate the request and compute the backing texture size
    pub fn backing_size(&self) -> VideoResult<(u32, u32)> {
        let (w, h) = self.logical;
        let backing = match (backing_dimension(w), backing_dimension(h)) {
            (Some(bw), Some(bh)) if self.bpp == 16 && w != 0 && h != 0 => (bw, bh),
            _ => {
                log::warn!("textured window {}x{}@{} rejected", w, h, self.bpp);
                return Err(VideoError::UnsupportedMode);
            }
        };
        Ok(backing)
    }
}

/// Framebuffer allocation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocRequest {
    /// Application draws into a back buffer
    pub double_buffered: bool,
    /// Engine that moves a non-textured back buffer to video memory
    pub engine: CopyEngine,
    /// Present through a GPU texture
    pub window: Option<WindowRequest>,
}

#[derive(Debug)]
pub(crate) enum Memory {
    Direct { vram: VirtAddr },
    Staged { staging: StagingBuffer, vram: VirtAddr, engine: CopyEngine },
    Textured { texture: TextureBacking, staging: Option<StagingBuffer> },
}

/// Memory backing the active surface
///
/// Owned allocations are returned with [`Framebuffer::release`]; dropping
/// a framebuffer that holds texture memory leaks it.
#[derive(Debug)]
pub struct Framebuffer {
    width: u32,
    height: u32,
    pitch: u32,
    pub(crate) memory: Memory,
}

impl Framebuffer {
    /// Presentation strategy fixed at allocation time
    pub fn strategy(&self) -> Strategy {
        match self.memory {
            Memory::Direct { .. } => Strategy::Direct,
            Memory::Staged { .. } => Strategy::DoubleBufferDma,
            Memory::Textured { .. } => Strategy::TexturedBlit,
        }
    }

    /// Where the application draws
    pub fn pixels(&self) -> VirtAddr {
        match &self.memory {
            Memory::Direct { vram } => *vram,
            Memory::Staged { staging, .. } => staging.addr(),
            Memory::Textured { staging: Some(staging), .. } => staging.addr(),
            Memory::Textured { texture, staging: None } => texture.addr(),
        }
    }

    /// Width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes per row
    pub fn pitch(&self) -> u32 {
        self.pitch
    }

    /// Whether the application draws into a back buffer
    pub fn is_double_buffered(&self) -> bool {
        matches!(
            self.memory,
            Memory::Staged { .. } | Memory::Textured { staging: Some(_), .. }
        )
    }

    /// Texture backing, for the textured strategy
    pub fn texture(&self) -> Option<&TextureBacking> {
        match &self.memory {
            Memory::Textured { texture, .. } => Some(texture),
            _ => None,
        }
    }

    /// Mutable texture backing, for the textured strategy
    pub fn texture_mut(&mut self) -> Option<&mut TextureBacking> {
        match &mut self.memory {
            Memory::Textured { texture, .. } => Some(texture),
            _ => None,
        }
    }

    /// Staging buffer, if the application draws into one
    pub fn staging(&self) -> Option<&StagingBuffer> {
        match &self.memory {
            Memory::Staged { staging, .. } => Some(staging),
            Memory::Textured { staging, .. } => staging.as_ref(),
            Memory::Direct { .. } => None,
        }
    }

    /// Copy engine of a double-buffered, non-textured framebuffer
    pub fn copy_engine(&self) -> Option<CopyEngine> {
        match self.memory {
            Memory::Staged { engine, .. } => Some(engine),
            _ => None,
        }
    }

    /// Return every owned allocation
    ///
    /// Texture memory is freed and the texture allocator reset; staging
    /// buffers go back to the heap. Direct framebuffers own nothing.
    pub fn release<H: ConsoleHal>(self, hal: &H) {
        match self.memory {
            Memory::Direct { .. } => {}
            Memory::Staged { staging, .. } => {
                log::debug!("releasing staging buffer at {}", staging.addr());
                drop(staging);
            }
            Memory::Textured { texture, staging } => {
                if let Some(staging) = staging {
                    log::debug!("releasing texture staging buffer at {}", staging.addr());
                    drop(staging);
                }
                log::debug!("releasing texture at {}", texture.addr());
                hal.gpu().mem_free(texture.addr);
                hal.gpu().mem_reset();
            }
        }
    }
}

/// Back `mode` with memory according to `request`
///
/// On failure nothing stays allocated. Texture memory requires an
/// initialized GPU.
pub fn allocate<H: ConsoleHal>(
    hal: &H,
    mode: &DisplayMode,
    request: &AllocRequest,
) -> VideoResult<Framebuffer> {
    if let Some(window) = &request.window {
        return allocate_textured(hal, window, request.double_buffered);
    }

    let vram = hal.video().vram_base();
    let memory = if request.double_buffered {
        let staging = StagingBuffer::allocate(mode.frame_bytes(), VRAM_DMA_ALIGN, VRAM_STAGING_PAD)?;
        Memory::Staged { staging, vram, engine: request.engine }
    } else {
        Memory::Direct { vram }
    };

    Ok(Framebuffer {
        width: mode.width,
        height: mode.height,
        pitch: mode.pitch,
        memory,
    })
}

fn allocate_textured<H: ConsoleHal>(
    hal: &H,
    window: &WindowRequest,
    double_buffered: bool,
) -> VideoResult<Framebuffer> {
    let backing = window.backing_size()?;
    let bytes = backing.0 as usize * backing.1 as usize * TEXEL_BYTES;

    let addr = hal.gpu().mem_malloc(bytes)?;
    let give_back = |err: VideoError| {
        hal.gpu().mem_free(addr);
        hal.gpu().mem_reset();
        err
    };
    log::debug!(
        "texture {}x{} ({} bytes) at {} for {}x{} window",
        backing.0,
        backing.1,
        bytes,
        addr,
        window.logical.0,
        window.logical.1
    );

    let header = PolyContext::textured(
        ListType::OpaquePoly,
        TextureFormat::RGB565 | TextureFormat::NONTWIDDLED,
        backing.0,
        backing.1,
        addr,
        Filter::Nearest,
    )
    .compile()
    .map_err(|err| give_back(err.into()))?;

    let staging = if double_buffered {
        let staging = StagingBuffer::allocate(bytes, TEXTURE_DMA_ALIGN, TEXTURE_STAGING_PAD)
            .map_err(give_back)?;
        Some(staging)
    } else {
        None
    };

    let texture = TextureBacking {
        addr,
        backing,
        logical: window.logical,
        uv: UvRect::for_window(window.logical, backing),
        header,
    };

    Ok(Framebuffer {
        width: window.logical.0,
        height: window.logical.1,
        pitch: backing.0 * TEXEL_BYTES as u32,
        memory: Memory::Textured { texture, staging },
    })
}
