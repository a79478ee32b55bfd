//! Redis-backed state store.
//!
//! Enables rate limiting across multiple processes or machines with Redis as the
//! shared owner of every key's TAT. Decisions run as server-side Lua scripts, so
//! each one is atomic per key without locks or client-side retries.
//!
//! Requires the `redis-tokio` or `redis-smol` feature.

mod common;
pub use common::*;

mod redis_store;
pub use redis_store::*;
