//! # Firmware Interface Abstraction
//!
//! Settings stored in the system flash ROM.

/// Firmware interface abstraction
pub trait Firmware: Send + Sync {
    /// Get the region the console was manufactured for
    fn region(&self) -> Region;
}

/// Console region as recorded in flash ROM
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    /// Region could not be read
    Unknown,
    /// Japan
    Japan,
    /// North America
    Us,
    /// Europe
    Europe,
}
