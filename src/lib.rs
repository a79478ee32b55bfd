#![doc = include_str!("../README.md")]
#![deny(missing_docs)]
#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod rate_limiter;
pub use rate_limiter::*;

mod store;
pub use store::*;

mod gcra;
pub use gcra::*;

pub mod local;

#[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
#[cfg_attr(docsrs, doc(cfg(any(feature = "redis-tokio", feature = "redis-smol"))))]
pub mod redis;

mod error;
pub use error::*;

mod common;
pub use common::{AdmissionMode, Limit, RateLimitDecision, TAT_EPOCH_UNIX_SECONDS};

#[cfg(test)]
mod tests;
