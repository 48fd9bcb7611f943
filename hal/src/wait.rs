//! # Hardware Busy-Waits
//!
//! Hardware-ready flags are polled in a tight loop with no timeout. Every
//! wait assumes the hardware finishes a kicked transfer or scene in bounded
//! time.

/// Spin until `ready` returns `true`
///
/// Returns the number of polls that reported not-ready.
#[inline]
pub fn spin_until<F>(mut ready: F) -> u64
where
    F: FnMut() -> bool,
{
    let mut spins = 0;
    while !ready() {
        spins += 1;
        core::hint::spin_loop();
    }
    spins
}
