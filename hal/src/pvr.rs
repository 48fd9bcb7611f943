//! # PowerVR GPU Abstraction
//!
//! The PowerVR CLX2 is a tile-based deferred renderer. Geometry is
//! submitted per frame as a scene made of display lists; each list holds
//! polygon headers followed by vertex strips. Finishing a scene renders it
//! into the back buffer and flips on the next vertical blank.
//!
//! Texture memory is a separate 8 MiB region managed by the GPU driver.

use crate::{HalError, HalResult, VirtAddr};
use bitflags::bitflags;
use static_assertions::assert_eq_size;

/// Command word of a polygon header
pub const CMD_POLYHDR: u32 = 0x8000_0000;

/// Command word of a vertex inside a strip
pub const CMD_VERTEX: u32 = 0xE000_0000;

/// Command word of the vertex that ends a strip
pub const CMD_VERTEX_EOL: u32 = 0xF000_0000;

/// Header flag: the polygon samples a texture
const HDR_TEXTURED: u32 = 1 << 3;

/// Smallest texture dimension the GPU accepts
pub const MIN_TEXTURE_DIM: u32 = 8;

/// Largest texture dimension the GPU accepts
pub const MAX_TEXTURE_DIM: u32 = 1024;

/// PowerVR abstraction trait
pub trait PowerVr: Send + Sync {
    /// Bring the GPU up with default list and vertex buffer sizes
    fn init_defaults(&self) -> HalResult<()>;

    /// Stop rendering and return the GPU to idle
    fn shutdown(&self);

    /// Busy-wait until the GPU is ready to accept a new scene
    ///
    /// The GPU becomes ready once the previous frame has been flipped, so
    /// this doubles as a vertical-blank wait.
    fn wait_ready(&self);

    /// Allocate `len` bytes of texture memory
    fn mem_malloc(&self, len: usize) -> HalResult<VirtAddr>;

    /// Free texture memory obtained from [`PowerVr::mem_malloc`]
    fn mem_free(&self, addr: VirtAddr);

    /// Reset the texture memory allocator to empty
    fn mem_reset(&self);

    /// Begin a new scene
    fn scene_begin(&self);

    /// Open a display list in the current scene
    fn list_begin(&self, list: ListType);

    /// Submit a polygon header to the open list
    fn submit_header(&self, header: &PolyHeader);

    /// Submit a vertex to the open list
    fn submit_vertex(&self, vertex: &Vertex);

    /// Close the open display list
    fn list_finish(&self);

    /// Close the scene and hand it to the renderer
    fn scene_finish(&self);
}

/// Display list types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ListType {
    /// Opaque polygons
    OpaquePoly = 0,
}

bitflags! {
    /// Texture format word
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TextureFormat: u32 {
        /// 16-bit 5-6-5 texels
        const RGB565 = 1 << 27;
        /// Texels are stored row-major instead of twiddled
        const NONTWIDDLED = 1 << 26;
    }
}

/// Texture sampling filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Filter {
    /// Point sampling
    Nearest = 0,
}

/// Parameters for a textured polygon header
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolyContext {
    /// List the polygon goes into
    pub list: ListType,
    /// Texel format
    pub format: TextureFormat,
    /// Texture width (power of two)
    pub width: u32,
    /// Texture height (power of two)
    pub height: u32,
    /// Texture memory address
    pub texture: VirtAddr,
    /// Sampling filter
    pub filter: Filter,
}

impl PolyContext {
    /// Create a textured polygon context
    pub const fn textured(
        list: ListType,
        format: TextureFormat,
        width: u32,
        height: u32,
        texture: VirtAddr,
        filter: Filter,
    ) -> Self {
        Self { list, format, width, height, texture, filter }
    }

    /// Compile the context into the header words the GPU consumes
    pub fn compile(&self) -> HalResult<PolyHeader> {
        let u_size = texture_size_code(self.width)?;
        let v_size = texture_size_code(self.height)?;

        Ok(PolyHeader {
            cmd: CMD_POLYHDR | ((self.list as u32) << 24) | HDR_TEXTURED,
            // depth compare: greater-or-equal
            mode1: 6 << 29,
            // src blend ONE, dst ZERO, fog disabled
            mode2: (1 << 29) | (2 << 22) | ((self.filter as u32) << 13) | (u_size << 3) | v_size,
            mode3: self.format.bits() | (((self.texture.as_u64() as u32) & 0x00ff_fff8) >> 3),
            d1: 0,
            d2: 0,
            d3: 0,
            d4: 0,
        })
    }
}

/// Encode a texture dimension as the 3-bit size field
fn texture_size_code(dim: u32) -> HalResult<u32> {
    if !dim.is_power_of_two() || !(MIN_TEXTURE_DIM..=MAX_TEXTURE_DIM).contains(&dim) {
        return Err(HalError::InvalidParameter);
    }
    Ok(dim.trailing_zeros() - 3)
}

/// Compiled polygon header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(C)]
pub struct PolyHeader {
    /// Command and list selection
    pub cmd: u32,
    /// Depth and culling
    pub mode1: u32,
    /// Blending, filtering and texture size
    pub mode2: u32,
    /// Texture format and address
    pub mode3: u32,
    #[allow(missing_docs)]
    pub d1: u32,
    #[allow(missing_docs)]
    pub d2: u32,
    #[allow(missing_docs)]
    pub d3: u32,
    #[allow(missing_docs)]
    pub d4: u32,
}

/// Textured, packed-color vertex
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[repr(C)]
pub struct Vertex {
    /// [`CMD_VERTEX`] or [`CMD_VERTEX_EOL`]
    pub flags: u32,
    /// Screen X
    pub x: f32,
    /// Screen Y
    pub y: f32,
    /// Inverse depth
    pub z: f32,
    /// Texture U
    pub u: f32,
    /// Texture V
    pub v: f32,
    /// Base color
    pub argb: u32,
    /// Offset color
    pub oargb: u32,
}

assert_eq_size!(PolyHeader, [u8; 32]);
assert_eq_size!(Vertex, [u8; 32]);

/// Pack normalized ARGB components into a vertex color word
pub fn pack_color(a: f32, r: f32, g: f32, b: f32) -> u32 {
    let channel = |c: f32| ((c * 255.0) as u32) & 0xff;
    (channel(a) << 24) | (channel(r) << 16) | (channel(g) << 8) | channel(b)
}
