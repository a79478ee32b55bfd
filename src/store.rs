use std::future::Future;

use crate::{AdmissionMode, Evaluation, LeakygateError, Limit};

/// A shared state store that can run a GCRA decision atomically per key.
///
/// Implementations own the TAT for every key. `evaluate` must read the stored TAT,
/// run the [`Gcra`](crate::Gcra) engine and persist any resulting write as one
/// indivisible step: concurrent calls for the same key must produce the outcome of
/// *some* serial ordering of those calls. No ordering is required across different
/// keys.
///
/// Stores are responsible for key namespacing, connection management and the clock
/// used for `now`. They perform no retries; a failed call surfaces its error.
///
/// Shipped implementations:
///
/// - [`MemoryStore`](crate::local::MemoryStore): in-process, per-key guard
/// - `RedisStore` (features `redis-tokio` / `redis-smol`): server-side Lua scripting
pub trait RateStore: Send + Sync {
    /// Run one decision for `cost` permits of `key` under `limit`.
    fn evaluate(
        &self,
        key: &str,
        limit: &Limit,
        cost: u64,
        mode: AdmissionMode,
    ) -> impl Future<Output = Result<Evaluation, LeakygateError>> + Send;

    /// Delete the stored TAT for `key`. Succeeds when there is nothing to delete.
    fn reset(&self, key: &str) -> impl Future<Output = Result<(), LeakygateError>> + Send;
}
