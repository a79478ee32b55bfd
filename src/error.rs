/// Error type for this crate.
///
/// A returned error always means the limit could not be evaluated. A request that
/// was evaluated and denied is reported through
/// [`RateLimitDecision`](crate::RateLimitDecision), never through this type.
#[derive(Debug, thiserror::Error)]
pub enum LeakygateError {
    /// Redis error (connection, timeout, script failure).
    ///
    /// The outcome of the decision is unknown: the script may have committed
    /// server-side before the error reached the caller.
    #[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
    #[cfg_attr(docsrs, doc(cfg(any(feature = "redis-tokio", feature = "redis-smol"))))]
    #[error("redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    /// The limit has a zero rate, burst or period.
    #[error("invalid limit: {0}")]
    InvalidLimit(String),

    /// The logical rate limit key is not usable.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// The key prefix is not usable.
    #[error("invalid key prefix: {0}")]
    InvalidKeyPrefix(String),

    /// The stored theoretical arrival time is not a number.
    #[error("malformed theoretical arrival time for key {key}: {value:?}")]
    MalformedTat {
        /// Fully namespaced store key.
        key: String,
        /// Raw stored value.
        value: String,
    },

    /// The store replied with something the adapter cannot decode.
    #[error("unexpected store reply: {0}")]
    UnexpectedReply(String),

    /// Invalid connection count for a connection pool.
    #[error("invalid connection count: {0}")]
    InvalidConnectionCount(String),
}
