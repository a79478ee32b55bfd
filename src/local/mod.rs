//! In-process state store.
//!
//! [`MemoryStore`] keeps TATs inside the current process using a
//! [`DashMap`](dashmap::DashMap), making the per-key entry guard the atomic section
//! for each decision.
//!
//! # Key Characteristics
//!
//! - **Thread-safe:** Safe for concurrent use across threads and tasks
//! - **Exact:** Same-key decisions are serialized, so bursts are never over-admitted
//! - **Process-scoped:** State is not shared across processes
//! - **Pluggable time:** [`SystemClock`] in production, [`ManualClock`] for tests
//!   and simulations
//!
//! Use it for single-process services, tests, and as a reference for what a shared
//! store adapter has to guarantee. When several instances must share a quota, use
//! the Redis store instead.

mod clock;
pub use clock::*;

mod memory_store;
pub use memory_store::*;
