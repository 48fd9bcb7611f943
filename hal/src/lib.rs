//! # dcvideo HAL - Hardware Abstraction Layer
//!
//! This crate defines the traits the display driver uses to reach the
//! console hardware: the video output stage, the SH-4 operand cache, the
//! PowerVR DMA engine, the PowerVR GPU itself and the flash-ROM settings.
//!
//! ## Design Philosophy
//!
//! The HAL is designed to be:
//! - **Complete**: Abstracts every register access the driver needs
//! - **Minimal**: Only exposes what presentation requires
//! - **Explicit**: Asynchronous hardware work is `unsafe` at the call site
//! - **Testable**: A simulated console (`sim` feature) implements every trait

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

pub mod cache;
pub mod dma;
pub mod firmware;
pub mod pvr;
pub mod video;
pub mod wait;

// Simulated console (for host-side tests)
#[cfg(any(test, feature = "sim"))]
pub mod sim;

use core::fmt;

/// Result type for HAL operations
pub type HalResult<T> = Result<T, HalError>;

/// Errors that can occur in HAL operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalError {
    /// Invalid parameter provided
    InvalidParameter,
    /// Hardware reported an error
    HardwareError,
    /// Memory allocation failed
    OutOfMemory,
    /// Subsystem not initialized
    NotInitialized,
}

impl fmt::Display for HalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            HalError::InvalidParameter => "invalid parameter",
            HalError::HardwareError => "hardware error",
            HalError::OutOfMemory => "out of memory",
            HalError::NotInitialized => "subsystem not initialized",
        };
        f.write_str(msg)
    }
}

/// The console HAL
///
/// Aggregates every hardware block the display driver talks to. A driver
/// instance owns exactly one value implementing this trait.
pub trait ConsoleHal: Send + Sync + 'static {
    /// The video output stage
    type Video: video::VideoOutput;

    /// The CPU operand cache
    type Cache: cache::CacheControl;

    /// The PowerVR DMA engine
    type Dma: dma::DmaEngine;

    /// The PowerVR GPU
    type Gpu: pvr::PowerVr;

    /// Flash-ROM settings
    type Firmware: firmware::Firmware;

    /// Get the video output stage
    fn video(&self) -> &Self::Video;

    /// Get the cache controller
    fn cache(&self) -> &Self::Cache;

    /// Get the DMA engine
    fn dma(&self) -> &Self::Dma;

    /// Get the GPU
    fn gpu(&self) -> &Self::Gpu;

    /// Get the firmware interface
    fn firmware(&self) -> &Self::Firmware;

    /// Get the platform name
    fn platform_name(&self) -> &'static str;
}

/// Virtual address type
///
/// Every address the driver hands to hardware is expressed in the CPU's
/// address space; the HAL translates to bus addresses where needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct VirtAddr(u64);

impl VirtAddr {
    /// Create a new virtual address
    #[inline]
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// Create from a raw pointer
    #[inline]
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self(ptr as usize as u64)
    }

    /// Get the raw address value
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Check if the address is aligned to the given alignment
    #[inline]
    pub const fn is_aligned(self, align: u64) -> bool {
        self.0 % align == 0
    }

    /// Align the address up to the given alignment
    #[inline]
    pub const fn align_up(self, align: u64) -> Self {
        Self((self.0 + align - 1) & !(align - 1))
    }

    /// Add an offset to the address
    #[inline]
    pub const fn add(self, offset: u64) -> Self {
        Self(self.0 + offset)
    }

    /// Check whether `[self, self + len)` contains `[other, other + other_len)`
    #[inline]
    pub const fn covers(self, len: usize, other: VirtAddr, other_len: usize) -> bool {
        other.0 >= self.0 && other.0 + other_len as u64 <= self.0 + len as u64
    }

    /// Convert to a raw pointer
    #[inline]
    pub const fn as_ptr<T>(self) -> *const T {
        self.0 as usize as *const T
    }

    /// Convert to a raw mutable pointer
    #[inline]
    pub const fn as_mut_ptr<T>(self) -> *mut T {
        self.0 as usize as *mut T
    }
}

impl fmt::Display for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(VirtAddr::new(0x8c01_0001).align_up(64), VirtAddr::new(0x8c01_0040));
        assert_eq!(VirtAddr::new(0x8c01_0040).align_up(64), VirtAddr::new(0x8c01_0040));
        assert_eq!(VirtAddr::new(0x21).align_up(32), VirtAddr::new(0x40));
        assert!(VirtAddr::new(0x8c01_0040).is_aligned(64));
        assert!(!VirtAddr::new(0x8c01_0020).is_aligned(64));
    }

    #[test]
    fn test_covers() {
        let base = VirtAddr::new(0x1000);
        assert!(base.covers(0x100, VirtAddr::new(0x1000), 0x100));
        assert!(base.covers(0x100, VirtAddr::new(0x1080), 0x10));
        assert!(!base.covers(0x100, VirtAddr::new(0x10f8), 0x10));
        assert!(!base.covers(0x100, VirtAddr::new(0x0ff0), 0x10));
    }

    #[test]
    fn test_error_display() {
        assert_eq!(alloc::format!("{}", HalError::OutOfMemory), "out of memory");
        assert_eq!(alloc::format!("{}", HalError::HardwareError), "hardware error");
    }
}
