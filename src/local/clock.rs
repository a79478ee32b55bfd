use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use crate::TAT_EPOCH_UNIX_SECONDS;

/// Source of `now` for in-process stores.
///
/// Returns seconds since [`TAT_EPOCH_UNIX_SECONDS`]. A store reads the clock once
/// per decision, inside its atomic section.
pub trait Clock: Clone + Send + Sync + 'static {
    /// Current time in seconds since the TAT epoch.
    fn now(&self) -> f64;
}

/// Wall clock based on [`SystemTime`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        let since_unix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();

        // Subtract whole seconds first so the fraction keeps full precision.
        since_unix.as_secs().saturating_sub(TAT_EPOCH_UNIX_SECONDS) as f64
            + f64::from(since_unix.subsec_nanos()) / 1e9
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same time, so a test can keep one handle and give another
/// to the store.
///
/// ```
/// use std::time::Duration;
/// use leakygate::local::{Clock, ManualClock};
///
/// let clock = ManualClock::new(10.0);
/// let handle = clock.clone();
///
/// handle.advance(Duration::from_millis(500));
/// assert_eq!(clock.now(), 10.5);
/// ```
#[derive(Debug, Clone)]
pub struct ManualClock {
    now_bits: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a clock stopped at `now` seconds.
    pub fn new(now: f64) -> Self {
        Self {
            now_bits: Arc::new(AtomicU64::new(now.to_bits())),
        }
    }

    /// Jump to `now` seconds.
    pub fn set(&self, now: f64) {
        self.now_bits.store(now.to_bits(), Ordering::SeqCst);
    }

    /// Move forward by `by`.
    pub fn advance(&self, by: Duration) {
        let _ = self
            .now_bits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |bits| {
                Some((f64::from_bits(bits) + by.as_secs_f64()).to_bits())
            });
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(0f64)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.now_bits.load(Ordering::SeqCst))
    }
}
