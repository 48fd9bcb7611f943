//! # dcvideo - Dreamcast Video Subsystem
//!
//! Binds a generic video-device interface to the Dreamcast video output
//! stage and the PowerVR GPU. The subsystem provides:
//! - Display mode negotiation against cable type and console region
//! - Framebuffer allocation (video memory, DMA staging, GPU texture)
//! - Presentation along one of three strategies
//! - Device lifecycle: init, mode changes, teardown
//!
//! ## Control Flow
//!
//! 1. [`DcVideo::set_mode`] resolves a [`DisplayMode`]
//! 2. The framebuffer allocator backs it with memory
//! 3. [`DcVideo::flip`] presents each frame
//! 4. [`DcVideo::quit`] (or the next `set_mode`) releases everything
//!
//! ## Concurrency
//!
//! The device is driven from a single thread. The DMA engine and GPU run
//! asynchronously once kicked; all waits on them are unbounded busy-polls.
//! Calling `quit` while a `flip` is in progress on another thread is not
//! supported; callers serialize these themselves.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

pub mod config;
pub mod device;
pub mod framebuffer;
pub mod mode;
pub mod present;
pub mod surface;

pub use config::{RefreshPolicy, RefreshPrompt, VideoConfig, VideoDriver};
pub use device::{DcVideo, VideoBootstrap, VideoDevice, DC_BOOTSTRAP};
pub use framebuffer::{Framebuffer, Strategy, UvRect};
pub use mode::{DisplayCategory, DisplayMode};
pub use surface::{Color, PixelFormat, Rect, Surface, SurfaceFlags};

use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use dcvideo_hal::HalError;

/// Video subsystem result type
pub type VideoResult<T> = Result<T, VideoError>;

/// Video subsystem errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoError {
    /// Geometry, depth or window size absent from the supported tables
    UnsupportedMode,
    /// A backing-store allocation failed
    OutOfMemory,
    /// The operation is not provided by this backend
    NotSupported,
    /// No mode has been set
    NotInitialized,
    /// The hardware reported an error
    Hardware(HalError),
}

impl From<HalError> for VideoError {
    fn from(err: HalError) -> Self {
        match err {
            HalError::OutOfMemory => VideoError::OutOfMemory,
            other => VideoError::Hardware(other),
        }
    }
}

impl fmt::Display for VideoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VideoError::UnsupportedMode => f.write_str("couldn't find requested mode in list"),
            VideoError::OutOfMemory => f.write_str("out of memory"),
            VideoError::NotSupported => f.write_str("operation not supported"),
            VideoError::NotInitialized => f.write_str("video mode not set"),
            VideoError::Hardware(err) => write!(f, "hardware error: {}", err),
        }
    }
}

/// Display state published for consumers outside the video subsystem
///
/// The frame pacer reads the refresh flag; the input layer reads the
/// pointer shift to scale mouse coordinates to the surface.
#[derive(Debug)]
pub struct DisplayStatus {
    is_60hz: AtomicBool,
    pointer_shift: AtomicU32,
}

impl DisplayStatus {
    /// Create the status with the power-on defaults
    pub const fn new() -> Self {
        Self {
            is_60hz: AtomicBool::new(false),
            pointer_shift: AtomicU32::new(1),
        }
    }

    /// Whether the active mode refreshes at 60 Hz
    pub fn is_60hz(&self) -> bool {
        self.is_60hz.load(Ordering::Acquire)
    }

    /// Ratio of the 640-pixel pointer space to the surface width
    pub fn pointer_shift(&self) -> u32 {
        self.pointer_shift.load(Ordering::Acquire)
    }

    pub(crate) fn publish_refresh(&self, is_60hz: bool) {
        self.is_60hz.store(is_60hz, Ordering::Release);
    }

    pub(crate) fn publish_pointer_shift(&self, surface_width: u32) {
        let shift = (640 / surface_width.max(1)).max(1);
        self.pointer_shift.store(shift, Ordering::Release);
    }
}

impl Default for DisplayStatus {
    fn default() -> Self {
        Self::new()
    }
}
