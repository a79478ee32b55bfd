use std::{
    sync::{
        Arc, Mutex, Weak,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use dashmap::{DashMap, mapref::entry::Entry};

use crate::{
    AdmissionMode, Evaluation, Gcra, LeakygateError, Limit, RateStore,
    common::validate_key,
    local::{Clock, SystemClock},
};

#[derive(Debug, Clone, Copy)]
struct StoredTat {
    tat: f64,
    expires_at: f64,
}

/// Configuration for [`MemoryStore`].
#[derive(Clone, Debug)]
pub struct MemoryStoreOptions {
    /// Interval between sweeps of [`MemoryStore::run_cleanup_loop`].
    pub cleanup_interval: Duration,
}

impl Default for MemoryStoreOptions {
    fn default() -> Self {
        Self {
            cleanup_interval: Duration::from_secs(1),
        }
    }
}

/// In-process TAT store.
///
/// Keeps one TAT per key in a [`DashMap`]. A decision holds the key's entry guard
/// from the read of the TAT to the write of the new one, so concurrent callers of
/// the same key are serialized while different keys proceed in parallel. The store
/// is only shared within the current process.
///
/// Entries carry the same expiry a Redis `SET ... EX` would give them; an expired
/// entry reads as an empty bucket. Expired entries stay in memory until touched
/// again or removed by [`cleanup`](Self::cleanup) /
/// [`run_cleanup_loop`](Self::run_cleanup_loop).
///
/// # Examples
///
/// ```
/// use leakygate::{Limit, RateLimiter};
/// use leakygate::local::{ManualClock, MemoryStore};
///
/// let clock = ManualClock::new(1_000.0);
/// let rl = RateLimiter::new(MemoryStore::with_clock(clock.clone()));
/// let limit = Limit::per_second(2).unwrap();
///
/// let rt = tokio::runtime::Runtime::new().unwrap();
/// rt.block_on(async {
///     assert!(rl.allow("k", &limit).await.unwrap().is_allowed());
///     assert!(rl.allow("k", &limit).await.unwrap().is_allowed());
///
///     let denied = rl.allow("k", &limit).await.unwrap();
///     assert!(!denied.is_allowed());
///
///     clock.advance(denied.retry_after.unwrap());
///     assert!(rl.allow("k", &limit).await.unwrap().is_allowed());
/// });
/// ```
#[derive(Debug)]
pub struct MemoryStore<C: Clock = SystemClock> {
    gcra: Gcra,
    clock: C,
    options: MemoryStoreOptions,
    entries: Arc<DashMap<String, StoredTat>>,
    cleanup_stop: Mutex<Option<Arc<AtomicBool>>>,
}

impl MemoryStore<SystemClock> {
    /// Create a store on the system clock with default options.
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for MemoryStore<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> MemoryStore<C> {
    /// Create a store reading time from `clock`.
    pub fn with_clock(clock: C) -> Self {
        Self::with_options(clock, MemoryStoreOptions::default())
    }

    /// Create a store reading time from `clock` with explicit options.
    pub fn with_options(clock: C, options: MemoryStoreOptions) -> Self {
        Self {
            gcra: Gcra::new(),
            clock,
            options,
            entries: Arc::new(DashMap::new()),
            cleanup_stop: Mutex::new(None),
        }
    }

    /// The clock this store reads `now` from.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Number of keys currently held, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no keys are held.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The stored TAT for `key`, if present and not expired.
    pub fn tat(&self, key: &str) -> Option<f64> {
        let now = self.clock.now();
        self.entries
            .get(key)
            .filter(|stored| stored.expires_at > now)
            .map(|stored| stored.tat)
    }

    fn evaluate_now(
        &self,
        key: &str,
        limit: &Limit,
        cost: u64,
        mode: AdmissionMode,
    ) -> Evaluation {
        // The entry guard keeps the shard locked until the write below is done.
        match self.entries.entry(key.to_owned()) {
            Entry::Occupied(mut occupied) => {
                let now = self.clock.now();
                let stored = occupied.get();
                let stored_tat = (stored.expires_at > now).then_some(stored.tat);

                let outcome = self.gcra.evaluate(mode, stored_tat, now, limit, cost);

                match (outcome.write, stored_tat) {
                    (Some(write), _) => {
                        occupied.insert(StoredTat {
                            tat: write.tat,
                            expires_at: now + write.ttl_seconds as f64,
                        });
                    }
                    (None, None) => {
                        occupied.remove();
                    }
                    (None, Some(_)) => {}
                }

                outcome.evaluation
            }
            Entry::Vacant(vacant) => {
                let now = self.clock.now();
                let outcome = self.gcra.evaluate(mode, None, now, limit, cost);

                if let Some(write) = outcome.write {
                    vacant.insert(StoredTat {
                        tat: write.tat,
                        expires_at: now + write.ttl_seconds as f64,
                    });
                }

                outcome.evaluation
            }
        }
    } // end method evaluate_now

    /// Remove every expired entry. Returns how many were removed.
    pub fn cleanup(&self) -> usize {
        cleanup_entries(&self.entries, self.clock.now())
    }

    /// Start a background thread that calls [`cleanup`](Self::cleanup) every
    /// [`MemoryStoreOptions::cleanup_interval`].
    ///
    /// Does nothing if a loop is already running.
    pub fn run_cleanup_loop(&self) {
        self.run_cleanup_loop_with_config(self.options.cleanup_interval.as_millis() as u64);
    }

    /// Start a background cleanup thread sweeping every `interval_ms` milliseconds.
    ///
    /// The first sweep happens immediately. Does nothing if a loop is already
    /// running; stop it first to change the interval. The thread exits on
    /// [`stop_cleanup_loop`](Self::stop_cleanup_loop) or once the store is dropped.
    pub fn run_cleanup_loop_with_config(&self, interval_ms: u64) {
        let mut cleanup_stop = match self.cleanup_stop.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if cleanup_stop.is_some() {
            return;
        }

        let stop = Arc::new(AtomicBool::new(false));
        *cleanup_stop = Some(stop.clone());

        let entries: Weak<DashMap<String, StoredTat>> = Arc::downgrade(&self.entries);
        let clock = self.clock.clone();
        let interval = Duration::from_millis(interval_ms.max(1));

        thread::spawn(move || {
            loop {
                if stop.load(Ordering::Relaxed) {
                    break;
                }

                let Some(entries) = entries.upgrade() else {
                    break;
                };

                let removed = cleanup_entries(&entries, clock.now());
                if removed > 0 {
                    tracing::debug!(removed, "Removed expired rate limit entries");
                }
                drop(entries);

                thread::sleep(interval);
            }

            tracing::debug!("Memory store cleanup loop stopped");
        });
    } // end method run_cleanup_loop_with_config

    /// Stop the background cleanup thread, if any. Safe to call repeatedly; the
    /// loop can be started again afterwards.
    pub fn stop_cleanup_loop(&self) {
        let mut cleanup_stop = match self.cleanup_stop.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(stop) = cleanup_stop.take() {
            stop.store(true, Ordering::Relaxed);
        }
    }
}

impl<C: Clock> Drop for MemoryStore<C> {
    fn drop(&mut self) {
        self.stop_cleanup_loop();
    }
}

impl<C: Clock> RateStore for MemoryStore<C> {
    async fn evaluate(
        &self,
        key: &str,
        limit: &Limit,
        cost: u64,
        mode: AdmissionMode,
    ) -> Result<Evaluation, LeakygateError> {
        validate_key(key)?;
        Ok(self.evaluate_now(key, limit, cost, mode))
    }

    async fn reset(&self, key: &str) -> Result<(), LeakygateError> {
        validate_key(key)?;
        self.entries.remove(key);
        Ok(())
    }
}

fn cleanup_entries(entries: &DashMap<String, StoredTat>, now: f64) -> usize {
    let mut removed = 0;
    entries.retain(|_, stored| {
        let live = stored.expires_at > now;
        if !live {
            removed += 1;
        }
        live
    });
    removed
}
