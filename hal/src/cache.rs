//! # Cache Abstraction
//!
//! The SH-4 operand cache is write-back. Anything the CPU wrote that a bus
//! master (DMA engine, GPU) is about to read must be flushed first.

use crate::VirtAddr;

/// Operand cache line size in bytes
pub const CACHE_LINE_SIZE: usize = 32;

/// Cache controller abstraction trait
pub trait CacheControl: Send + Sync {
    /// Write back and invalidate every line overlapping `[start, start + len)`
    fn flush_range(&self, start: VirtAddr, len: usize);
}
