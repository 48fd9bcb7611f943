//! # Simulated Console
//!
//! An in-memory implementation of every HAL trait. Nothing is rendered and
//! no memory behind a [`VirtAddr`] is ever dereferenced; instead each
//! hardware operation is appended to an ordered log, and ordering rules the
//! real hardware depends on are checked as the operations arrive.
//!
//! Broken rules are collected as violations rather than panicking so that
//! tests can assert on the whole sequence.

use crate::cache::CacheControl;
use crate::dma::{DmaEngine, DmaTarget, TransferMode};
use crate::firmware::{Firmware, Region};
use crate::pvr::{ListType, PolyHeader, PowerVr, Vertex};
use crate::video::{CableType, PixelMode, TimingMode, VideoOutput, VRAM_BASE};
use crate::{ConsoleHal, HalError, HalResult, VirtAddr};
use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::Mutex;

/// Uncached mirror of the start of texture memory
pub const TEXTURE_BASE: VirtAddr = VirtAddr::new(0xA400_0000);

/// Texture allocations are rounded to this granularity
const TEXTURE_GRANULE: usize = 32;

/// A recorded hardware operation
#[derive(Debug, Clone, PartialEq)]
pub enum SimOp {
    /// Sync generator programmed
    SetDisplayMode(TimingMode, PixelMode),
    /// Vertical blank wait
    WaitVblank,
    /// Store-queue copy into video memory
    StoreQueueCopy {
        /// Destination
        dst: VirtAddr,
        /// Source
        src: VirtAddr,
        /// Length in bytes
        len: usize,
    },
    /// Operand cache flush
    CacheFlush {
        /// Start of the range
        start: VirtAddr,
        /// Length in bytes
        len: usize,
    },
    /// DMA channel initialized
    DmaInit,
    /// DMA transfer kicked
    DmaTransfer {
        /// Source
        src: VirtAddr,
        /// Destination
        dst: VirtAddr,
        /// Length in bytes
        len: usize,
        /// Destination bus
        target: DmaTarget,
        /// Blocking or not
        mode: TransferMode,
    },
    /// GPU initialized
    GpuInit,
    /// GPU shut down
    GpuShutdown,
    /// GPU ready wait
    GpuWaitReady,
    /// Texture memory allocated
    TextureAlloc {
        /// Address handed out
        addr: VirtAddr,
        /// Requested length
        len: usize,
    },
    /// Texture memory freed
    TextureFree {
        /// Address freed
        addr: VirtAddr,
    },
    /// Texture allocator reset
    TextureReset,
    /// Scene opened
    SceneBegin,
    /// Display list opened
    ListBegin(ListType),
    /// Polygon header submitted
    Header(PolyHeader),
    /// Vertex submitted
    Vertex(Vertex),
    /// Display list closed
    ListFinish,
    /// Scene closed
    SceneFinish,
}

/// Hardware configuration of the simulated console
#[derive(Debug, Clone, Copy)]
pub struct SimConfig {
    /// Cable reported by the A/V port
    pub cable: CableType,
    /// Region recorded in flash ROM
    pub region: Region,
    /// Bytes of texture memory available
    pub texture_capacity: usize,
    /// Number of not-ready polls after an asynchronous DMA kick
    pub dma_latency: u32,
    /// `DmaEngine::init` fails with a hardware error
    pub fail_dma_init: bool,
    /// `PowerVr::init_defaults` fails with a hardware error
    pub fail_gpu_init: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            cable: CableType::Composite,
            region: Region::Us,
            texture_capacity: 8 * 1024 * 1024,
            dma_latency: 3,
            fail_dma_init: false,
            fail_gpu_init: false,
        }
    }
}

#[derive(Debug)]
struct SimState {
    config: SimConfig,
    ops: Vec<SimOp>,
    violations: Vec<&'static str>,
    display: Option<(TimingMode, PixelMode)>,
    dma_initialized: bool,
    dma_busy_polls: u32,
    gpu_initialized: bool,
    in_scene: bool,
    in_list: bool,
    textures: BTreeMap<u64, usize>,
    texture_next: usize,
    cable_queries: usize,
    region_queries: usize,
}

impl SimState {
    fn new(config: SimConfig) -> Self {
        Self {
            config,
            ops: Vec::new(),
            violations: Vec::new(),
            display: None,
            dma_initialized: false,
            dma_busy_polls: 0,
            gpu_initialized: false,
            in_scene: false,
            in_list: false,
            textures: BTreeMap::new(),
            texture_next: 0,
            cable_queries: 0,
            region_queries: 0,
        }
    }

    fn violation(&mut self, what: &'static str) {
        log::warn!("sim: {}", what);
        self.violations.push(what);
    }

    /// A flush covering the range since the last kick from the same source
    fn source_flushed(&self, src: VirtAddr, len: usize) -> bool {
        for op in self.ops.iter().rev() {
            match *op {
                SimOp::CacheFlush { start, len: flushed } if start.covers(flushed, src, len) => {
                    return true;
                }
                SimOp::DmaTransfer { src: prev, .. } if prev == src => return false,
                _ => {}
            }
        }
        false
    }
}

type Shared = Arc<Mutex<SimState>>;

/// Simulated video output stage
#[derive(Debug, Clone)]
pub struct SimVideo {
    state: Shared,
}

impl VideoOutput for SimVideo {
    fn check_cable(&self) -> CableType {
        let mut state = self.state.lock();
        state.cable_queries += 1;
        state.config.cable
    }

    fn set_display_mode(&self, timing: TimingMode, pixel: PixelMode) {
        let mut state = self.state.lock();
        state.display = Some((timing, pixel));
        state.ops.push(SimOp::SetDisplayMode(timing, pixel));
    }

    fn wait_vblank(&self) {
        self.state.lock().ops.push(SimOp::WaitVblank);
    }

    fn vram_base(&self) -> VirtAddr {
        VRAM_BASE
    }

    unsafe fn store_queue_copy(&self, dst: VirtAddr, src: VirtAddr, len: usize) {
        let mut state = self.state.lock();
        if !src.is_aligned(32) || !dst.is_aligned(32) {
            state.violation("store queue copy misaligned");
        }
        state.ops.push(SimOp::StoreQueueCopy { dst, src, len });
    }
}

/// Simulated operand cache
#[derive(Debug, Clone)]
pub struct SimCache {
    state: Shared,
}

impl CacheControl for SimCache {
    fn flush_range(&self, start: VirtAddr, len: usize) {
        self.state.lock().ops.push(SimOp::CacheFlush { start, len });
    }
}

/// Simulated DMA channel
#[derive(Debug, Clone)]
pub struct SimDma {
    state: Shared,
}

impl DmaEngine for SimDma {
    fn init(&self) -> HalResult<()> {
        let mut state = self.state.lock();
        if state.config.fail_dma_init {
            return Err(HalError::HardwareError);
        }
        state.dma_initialized = true;
        state.dma_busy_polls = 0;
        state.ops.push(SimOp::DmaInit);
        Ok(())
    }

    fn is_ready(&self) -> bool {
        let mut state = self.state.lock();
        if state.dma_busy_polls > 0 {
            state.dma_busy_polls -= 1;
            false
        } else {
            true
        }
    }

    unsafe fn transfer(
        &self,
        src: VirtAddr,
        dst: VirtAddr,
        len: usize,
        target: DmaTarget,
        mode: TransferMode,
    ) -> HalResult<()> {
        let mut state = self.state.lock();
        if !state.dma_initialized {
            state.violation("dma used before init");
            return Err(HalError::NotInitialized);
        }
        if state.dma_busy_polls > 0 {
            state.violation("dma kicked while busy");
        }
        if !src.is_aligned(target.source_align() as u64) {
            state.violation("dma source misaligned");
        }
        if !state.source_flushed(src, len) {
            state.violation("dma source not flushed");
        }
        state.ops.push(SimOp::DmaTransfer { src, dst, len, target, mode });
        if mode == TransferMode::Async {
            state.dma_busy_polls = state.config.dma_latency;
        }
        Ok(())
    }
}

/// Simulated PowerVR
#[derive(Debug, Clone)]
pub struct SimGpu {
    state: Shared,
}

impl PowerVr for SimGpu {
    fn init_defaults(&self) -> HalResult<()> {
        let mut state = self.state.lock();
        if state.config.fail_gpu_init {
            return Err(HalError::HardwareError);
        }
        state.gpu_initialized = true;
        state.ops.push(SimOp::GpuInit);
        Ok(())
    }

    fn shutdown(&self) {
        let mut state = self.state.lock();
        if !state.textures.is_empty() {
            state.violation("gpu shut down with live textures");
        }
        state.gpu_initialized = false;
        state.dma_initialized = false;
        state.in_scene = false;
        state.in_list = false;
        state.ops.push(SimOp::GpuShutdown);
    }

    fn wait_ready(&self) {
        self.state.lock().ops.push(SimOp::GpuWaitReady);
    }

    fn mem_malloc(&self, len: usize) -> HalResult<VirtAddr> {
        let mut state = self.state.lock();
        if !state.gpu_initialized {
            state.violation("texture alloc before gpu init");
            return Err(HalError::NotInitialized);
        }
        let rounded = len.div_ceil(TEXTURE_GRANULE) * TEXTURE_GRANULE;
        if state.texture_next + rounded > state.config.texture_capacity {
            return Err(HalError::OutOfMemory);
        }
        let addr = TEXTURE_BASE.add(state.texture_next as u64);
        state.texture_next += rounded;
        state.textures.insert(addr.as_u64(), len);
        state.ops.push(SimOp::TextureAlloc { addr, len });
        Ok(addr)
    }

    fn mem_free(&self, addr: VirtAddr) {
        let mut state = self.state.lock();
        if state.textures.remove(&addr.as_u64()).is_none() {
            state.violation("free of unknown texture memory");
        }
        state.ops.push(SimOp::TextureFree { addr });
    }

    fn mem_reset(&self) {
        let mut state = self.state.lock();
        if !state.textures.is_empty() {
            state.violation("texture memory reset with live allocations");
            state.textures.clear();
        }
        state.texture_next = 0;
        state.ops.push(SimOp::TextureReset);
    }

    fn scene_begin(&self) {
        let mut state = self.state.lock();
        if !state.gpu_initialized {
            state.violation("scene begun before gpu init");
        }
        if state.in_scene {
            state.violation("scene begun twice");
        }
        state.in_scene = true;
        state.ops.push(SimOp::SceneBegin);
    }

    fn list_begin(&self, list: ListType) {
        let mut state = self.state.lock();
        if !state.in_scene {
            state.violation("list begun outside scene");
        }
        state.in_list = true;
        state.ops.push(SimOp::ListBegin(list));
    }

    fn submit_header(&self, header: &PolyHeader) {
        let mut state = self.state.lock();
        if !state.in_list {
            state.violation("primitive outside list");
        }
        state.ops.push(SimOp::Header(*header));
    }

    fn submit_vertex(&self, vertex: &Vertex) {
        let mut state = self.state.lock();
        if !state.in_list {
            state.violation("primitive outside list");
        }
        state.ops.push(SimOp::Vertex(*vertex));
    }

    fn list_finish(&self) {
        let mut state = self.state.lock();
        state.in_list = false;
        state.ops.push(SimOp::ListFinish);
    }

    fn scene_finish(&self) {
        let mut state = self.state.lock();
        if state.in_list {
            state.violation("scene finished with open list");
        }
        state.in_scene = false;
        state.ops.push(SimOp::SceneFinish);
    }
}

/// Simulated flash ROM
#[derive(Debug, Clone)]
pub struct SimFirmware {
    state: Shared,
}

impl Firmware for SimFirmware {
    fn region(&self) -> Region {
        let mut state = self.state.lock();
        state.region_queries += 1;
        state.config.region
    }
}

/// Simulated console
///
/// Clones share the same hardware state, so a test can keep one handle for
/// inspection while the driver owns another.
#[derive(Debug, Clone)]
pub struct SimConsole {
    state: Shared,
    video: SimVideo,
    cache: SimCache,
    dma: SimDma,
    gpu: SimGpu,
    firmware: SimFirmware,
}

impl SimConsole {
    /// Create a console with the default configuration
    pub fn new() -> Self {
        Self::with_config(SimConfig::default())
    }

    /// Create a console with the given configuration
    pub fn with_config(config: SimConfig) -> Self {
        let state: Shared = Arc::new(Mutex::new(SimState::new(config)));
        Self {
            video: SimVideo { state: state.clone() },
            cache: SimCache { state: state.clone() },
            dma: SimDma { state: state.clone() },
            gpu: SimGpu { state: state.clone() },
            firmware: SimFirmware { state: state.clone() },
            state,
        }
    }

    /// Replug the A/V cable
    pub fn set_cable(&self, cable: CableType) {
        self.state.lock().config.cable = cable;
    }

    /// Change the flash ROM region
    pub fn set_region(&self, region: Region) {
        self.state.lock().config.region = region;
    }

    /// Change the amount of texture memory
    pub fn set_texture_capacity(&self, bytes: usize) {
        self.state.lock().config.texture_capacity = bytes;
    }

    /// Make DMA channel initialization fail
    pub fn set_fail_dma_init(&self, fail: bool) {
        self.state.lock().config.fail_dma_init = fail;
    }

    /// Make GPU initialization fail
    pub fn set_fail_gpu_init(&self, fail: bool) {
        self.state.lock().config.fail_gpu_init = fail;
    }

    /// All operations recorded so far
    pub fn ops(&self) -> Vec<SimOp> {
        self.state.lock().ops.clone()
    }

    /// Drain the operation log
    pub fn take_ops(&self) -> Vec<SimOp> {
        core::mem::take(&mut self.state.lock().ops)
    }

    /// Ordering rules broken so far
    pub fn violations(&self) -> Vec<&'static str> {
        self.state.lock().violations.clone()
    }

    /// Number of live texture allocations
    pub fn live_textures(&self) -> usize {
        self.state.lock().textures.len()
    }

    /// Whether the GPU is initialized
    pub fn gpu_initialized(&self) -> bool {
        self.state.lock().gpu_initialized
    }

    /// Whether the DMA channel is initialized
    pub fn dma_initialized(&self) -> bool {
        self.state.lock().dma_initialized
    }

    /// Whether an asynchronous DMA transfer is still in flight
    pub fn dma_busy(&self) -> bool {
        self.state.lock().dma_busy_polls > 0
    }

    /// Last programmed display mode
    pub fn display_mode(&self) -> Option<(TimingMode, PixelMode)> {
        self.state.lock().display
    }

    /// Number of cable queries made
    pub fn cable_queries(&self) -> usize {
        self.state.lock().cable_queries
    }

    /// Number of region queries made
    pub fn region_queries(&self) -> usize {
        self.state.lock().region_queries
    }
}

impl Default for SimConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleHal for SimConsole {
    type Video = SimVideo;
    type Cache = SimCache;
    type Dma = SimDma;
    type Gpu = SimGpu;
    type Firmware = SimFirmware;

    fn video(&self) -> &Self::Video {
        &self.video
    }

    fn cache(&self) -> &Self::Cache {
        &self.cache
    }

    fn dma(&self) -> &Self::Dma {
        &self.dma
    }

    fn gpu(&self) -> &Self::Gpu {
        &self.gpu
    }

    fn firmware(&self) -> &Self::Firmware {
        &self.firmware
    }

    fn platform_name(&self) -> &'static str {
        "dreamcast-sim"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_texture_alloc_free() {
        let sim = SimConsole::new();
        sim.gpu().init_defaults().unwrap();

        let a = sim.gpu().mem_malloc(100).unwrap();
        let b = sim.gpu().mem_malloc(64).unwrap();
        assert_eq!(a, TEXTURE_BASE);
        assert_eq!(b, TEXTURE_BASE.add(128));
        assert_eq!(sim.live_textures(), 2);

        sim.gpu().mem_free(a);
        sim.gpu().mem_free(b);
        sim.gpu().mem_reset();
        assert_eq!(sim.live_textures(), 0);
        assert!(sim.violations().is_empty());
    }

    #[test]
    fn test_texture_capacity() {
        let sim = SimConsole::new();
        sim.set_texture_capacity(1024);
        sim.gpu().init_defaults().unwrap();
        assert_eq!(sim.gpu().mem_malloc(2048), Err(HalError::OutOfMemory));
    }

    #[test]
    fn test_texture_alloc_needs_gpu() {
        let sim = SimConsole::new();
        assert_eq!(sim.gpu().mem_malloc(64), Err(HalError::NotInitialized));
    }

    #[test]
    fn test_double_free_is_flagged() {
        let sim = SimConsole::new();
        sim.gpu().init_defaults().unwrap();
        let a = sim.gpu().mem_malloc(64).unwrap();
        sim.gpu().mem_free(a);
        sim.gpu().mem_free(a);
        assert_eq!(sim.violations(), ["free of unknown texture memory"]);
    }

    #[test]
    fn test_init_faults() {
        let sim = SimConsole::with_config(SimConfig { fail_gpu_init: true, ..SimConfig::default() });
        assert_eq!(sim.gpu().init_defaults(), Err(HalError::HardwareError));
        assert!(!sim.gpu_initialized());

        sim.set_fail_dma_init(true);
        assert_eq!(sim.dma().init(), Err(HalError::HardwareError));
        assert!(!sim.dma_initialized());
        assert!(sim.ops().is_empty());

        sim.set_fail_gpu_init(false);
        sim.set_fail_dma_init(false);
        sim.gpu().init_defaults().unwrap();
        sim.dma().init().unwrap();
        assert_eq!(sim.ops(), vec![SimOp::GpuInit, SimOp::DmaInit]);
    }

    #[test]
    fn test_dma_latency() {
        let sim = SimConsole::with_config(SimConfig { dma_latency: 2, ..SimConfig::default() });
        sim.dma().init().unwrap();
        let src = VirtAddr::new(0x8c10_0000);
        sim.cache().flush_range(src, 256);
        unsafe {
            sim.dma()
                .transfer(src, VRAM_BASE, 256, DmaTarget::Vram32, TransferMode::Async)
                .unwrap();
        }
        assert!(!sim.dma().is_ready());
        assert!(!sim.dma().is_ready());
        assert!(sim.dma().is_ready());
        assert!(sim.violations().is_empty());
    }

    #[test]
    fn test_dma_ordering_violations() {
        let sim = SimConsole::new();
        sim.dma().init().unwrap();
        let src = VirtAddr::new(0x8c10_0020);
        unsafe {
            sim.dma()
                .transfer(src, VRAM_BASE, 256, DmaTarget::Vram32, TransferMode::Async)
                .unwrap();
            sim.dma()
                .transfer(src, VRAM_BASE, 256, DmaTarget::Vram32, TransferMode::Async)
                .unwrap();
        }
        let violations = sim.violations();
        assert!(violations.contains(&"dma source misaligned"));
        assert!(violations.contains(&"dma source not flushed"));
        assert!(violations.contains(&"dma kicked while busy"));
    }

    #[test]
    fn test_flush_is_consumed_by_kick() {
        let sim = SimConsole::with_config(SimConfig { dma_latency: 0, ..SimConfig::default() });
        sim.dma().init().unwrap();
        let src = VirtAddr::new(0x8c10_0000);
        sim.cache().flush_range(src, 64);
        unsafe {
            sim.dma()
                .transfer(src, VRAM_BASE, 64, DmaTarget::Vram32, TransferMode::Async)
                .unwrap();
            sim.dma()
                .transfer(src, VRAM_BASE, 64, DmaTarget::Vram32, TransferMode::Async)
                .unwrap();
        }
        assert_eq!(sim.violations(), ["dma source not flushed"]);
    }

    #[test]
    fn test_cable_queries_counted() {
        let sim = SimConsole::new();
        assert_eq!(sim.video().check_cable(), CableType::Composite);
        sim.set_cable(CableType::Vga);
        assert_eq!(sim.video().check_cable(), CableType::Vga);
        assert_eq!(sim.cable_queries(), 2);
    }
}
