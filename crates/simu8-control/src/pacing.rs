//! Real-time delays used by the paced loops.

use std::time::Duration;

/// Source of real-time delays.
///
/// Both the frame scheduler and the peripheral tick driver block only
/// through this trait, which lets tests run frames without sleeping.
pub trait Pacer: Send + Sync {
    /// Blocks the calling thread for roughly `duration`.
    fn pause(&self, duration: Duration);
}

/// Production pacer backed by `spin_sleep` for sub-millisecond accuracy.
#[derive(Debug, Clone, Copy, Default)]
pub struct SleepPacer;

impl Pacer for SleepPacer {
    fn pause(&self, duration: Duration) {
        spin_sleep::sleep(duration);
    }
}

impl<P: Pacer + ?Sized> Pacer for std::sync::Arc<P> {
    fn pause(&self, duration: Duration) {
        (**self).pause(duration);
    }
}
