//! Top-level entrypoint that drives a [`RateStore`].
//!
//! [`RateLimiter`] is a thin, stateless facade: it validates the request, hands
//! it to the store's atomic `evaluate` and shapes the reply into a
//! [`RateLimitDecision`]. Which store backs it is chosen at construction.

use crate::{
    AdmissionMode, LeakygateError, Limit, RateLimitDecision, RateStore,
    common::{secs_to_duration, validate_key},
};

/// Rate limiter entrypoint.
///
/// # Examples
///
/// ```
/// use leakygate::{Limit, RateLimiter};
/// use leakygate::local::MemoryStore;
///
/// let rl = RateLimiter::new(MemoryStore::new());
/// let limit = Limit::per_second(5).unwrap();
///
/// let rt = tokio::runtime::Runtime::new().unwrap();
/// rt.block_on(async {
///     let decision = rl.allow_at_most("user_123", &limit, 8).await.unwrap();
///     assert_eq!(decision.allowed, 5);
///     assert_eq!(decision.remaining, 0);
///
///     let decision = rl.allow("user_123", &limit).await.unwrap();
///     assert!(!decision.is_allowed());
///     assert!(decision.retry_after.is_some());
/// });
/// ```
#[derive(Debug)]
pub struct RateLimiter<S> {
    store: S,
}

impl<S: RateStore> RateLimiter<S> {
    /// Create a new [`RateLimiter`] over `store`.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Access the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Try to take a single permit for `key`.
    pub async fn allow(
        &self,
        key: &str,
        limit: &Limit,
    ) -> Result<RateLimitDecision, LeakygateError> {
        self.allow_n(key, limit, 1).await
    }

    /// Take exactly `n` permits for `key`, or none.
    ///
    /// `n == 0` is always admitted and leaves the stored state untouched.
    pub async fn allow_n(
        &self,
        key: &str,
        limit: &Limit,
        n: u64,
    ) -> Result<RateLimitDecision, LeakygateError> {
        self.evaluate(key, limit, n, AdmissionMode::Exact).await
    }

    /// Take as many of `n` permits for `key` as are available.
    ///
    /// Check [`RateLimitDecision::allowed`] for how many were granted.
    pub async fn allow_at_most(
        &self,
        key: &str,
        limit: &Limit,
        n: u64,
    ) -> Result<RateLimitDecision, LeakygateError> {
        self.evaluate(key, limit, n, AdmissionMode::AtMost).await
    }

    /// Forget all state for `key`; the next request sees an empty bucket.
    pub async fn reset(&self, key: &str) -> Result<(), LeakygateError> {
        validate_key(key)?;
        self.store.reset(key).await
    }

    async fn evaluate(
        &self,
        key: &str,
        limit: &Limit,
        cost: u64,
        mode: AdmissionMode,
    ) -> Result<RateLimitDecision, LeakygateError> {
        validate_key(key)?;

        let evaluation = match self.store.evaluate(key, limit, cost, mode).await {
            Ok(evaluation) => evaluation,
            Err(err) => {
                tracing::debug!(error = ?err, key, mode = mode.as_str(), "Failed to evaluate rate limit");
                return Err(err);
            }
        };

        tracing::trace!(
            key,
            mode = mode.as_str(),
            cost,
            allowed = evaluation.allowed,
            remaining = evaluation.remaining,
            "rate limit decision"
        );

        Ok(RateLimitDecision {
            limit: *limit,
            allowed: evaluation.allowed,
            remaining: evaluation.remaining,
            retry_after: evaluation.retry_after.map(secs_to_duration),
            reset_after: secs_to_duration(evaluation.reset_after),
        })
    } // end method evaluate
}
