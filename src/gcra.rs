//! Generic Cell Rate Algorithm decision engine.
//!
//! The engine keeps no state. Every decision is a pure function of the stored
//! theoretical arrival time (TAT) for a key, the current time, the [`Limit`] and the
//! requested cost. Stores call it inside whatever atomic section they provide and
//! persist the returned [`TatWrite`], if any.
//!
//! All times are `f64` seconds since [`TAT_EPOCH_UNIX_SECONDS`](crate::TAT_EPOCH_UNIX_SECONDS).

use crate::{AdmissionMode, Limit};

/// Time, in seconds, by which a request may come early and still fit.
///
/// Absorbs the rounding error of repeated `f64` additions of the emission interval
/// to large absolute TATs, so that the tenth permit of a 10/s bucket is not
/// rejected as `-1e-15`. Half the microsecond resolution of Redis `TIME`: a request
/// one microsecond early is always denied. Capped at half an emission interval
/// for limits faster than one permit per microsecond.
pub const TIME_EPSILON: f64 = 5e-7;

/// The early-arrival tolerance for one emission interval.
fn tolerance(emission_interval: f64) -> f64 {
    TIME_EPSILON.min(emission_interval / 2f64)
}

/// Whole permits that fit into `diff` seconds of headroom.
fn whole_permits(diff: f64, emission_interval: f64, tolerance: f64) -> f64 {
    ((diff + tolerance) / emission_interval).floor().max(0f64)
}

/// Result of evaluating one request against a key's TAT.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    /// Permits admitted.
    pub allowed: u64,
    /// Whole permits still available after this decision.
    pub remaining: u64,
    /// Seconds until the same request can succeed. `None` when admitted.
    pub retry_after: Option<f64>,
    /// Seconds until the TAT is at or before `now`.
    pub reset_after: f64,
}

/// A TAT the store must persist for the key, expiring after `ttl_seconds`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TatWrite {
    /// New theoretical arrival time.
    pub tat: f64,
    /// Whole seconds until the stored value may expire (`ceil(reset_after)`).
    pub ttl_seconds: u64,
}

impl TatWrite {
    fn after(tat: f64, reset_after: f64) -> Option<Self> {
        if reset_after > 0f64 {
            Some(Self {
                tat,
                ttl_seconds: (reset_after.ceil() as u64).max(1),
            })
        } else {
            None
        }
    }
}

/// Evaluation plus the state change it requires.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GcraOutcome {
    /// What to report to the caller.
    pub evaluation: Evaluation,
    /// What to write back. `None` means the stored TAT must be left untouched.
    pub write: Option<TatWrite>,
}

/// The GCRA decision engine.
///
/// Zero-sized and `Copy`; each store keeps its own value.
///
/// # Examples
///
/// ```
/// use leakygate::{Gcra, Limit};
///
/// let gcra = Gcra::new();
/// let limit = Limit::per_second(10).unwrap();
///
/// // Fresh key at t = 100s: one permit used, nine left.
/// let outcome = gcra.allow(None, 100.0, &limit);
/// assert_eq!(outcome.evaluation.allowed, 1);
/// assert_eq!(outcome.evaluation.remaining, 9);
///
/// let write = outcome.write.unwrap();
/// assert_eq!(write.ttl_seconds, 1);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Gcra;

impl Gcra {
    /// Create an engine.
    pub fn new() -> Self {
        Self
    }

    /// Evaluate a request for `cost` permits in the given [`AdmissionMode`].
    pub fn evaluate(
        &self,
        mode: AdmissionMode,
        stored_tat: Option<f64>,
        now: f64,
        limit: &Limit,
        cost: u64,
    ) -> GcraOutcome {
        match mode {
            AdmissionMode::Exact => self.allow_n(stored_tat, now, limit, cost),
            AdmissionMode::AtMost => self.allow_at_most(stored_tat, now, limit, cost),
        }
    }

    /// Shorthand for [`allow_n`](Self::allow_n) with a cost of one.
    pub fn allow(&self, stored_tat: Option<f64>, now: f64, limit: &Limit) -> GcraOutcome {
        self.allow_n(stored_tat, now, limit, 1)
    }

    /// Admit exactly `cost` permits or none.
    ///
    /// On denial `retry_after` is the time until all `cost` permits fit; on
    /// admission the TAT moves forward by `cost` emission intervals.
    pub fn allow_n(
        &self,
        stored_tat: Option<f64>,
        now: f64,
        limit: &Limit,
        cost: u64,
    ) -> GcraOutcome {
        let emission_interval = limit.emission_interval();
        let burst_offset = limit.burst_offset();
        let tolerance = tolerance(emission_interval);
        let tat = stored_tat.unwrap_or(now).max(now);
        // tat - now, kept relative so large absolute timestamps do not cancel out
        let debt = tat - now;

        if cost == 0 {
            return Self::admit_nothing(debt, burst_offset, emission_interval, tolerance);
        }

        let increment = emission_interval * cost as f64;
        let new_debt = debt + increment;
        // now - (new_tat - burst_offset)
        let diff = burst_offset - new_debt;

        if diff < -tolerance {
            return GcraOutcome {
                evaluation: Evaluation {
                    allowed: 0,
                    remaining: 0,
                    retry_after: Some(-diff),
                    reset_after: debt,
                },
                write: None,
            };
        }

        let new_tat = tat + increment;
        let reset_after = new_debt;

        GcraOutcome {
            evaluation: Evaluation {
                allowed: cost,
                remaining: whole_permits(diff, emission_interval, tolerance) as u64,
                retry_after: None,
                reset_after,
            },
            write: TatWrite::after(new_tat, reset_after),
        }
    } // end method allow_n

    /// Admit as many of `n` permits as currently fit, possibly none.
    ///
    /// Denies outright only when not even one permit is available, in which case
    /// `retry_after` is the time until one permit fits.
    pub fn allow_at_most(
        &self,
        stored_tat: Option<f64>,
        now: f64,
        limit: &Limit,
        n: u64,
    ) -> GcraOutcome {
        let emission_interval = limit.emission_interval();
        let burst_offset = limit.burst_offset();
        let tolerance = tolerance(emission_interval);
        let tat = stored_tat.unwrap_or(now).max(now);
        let debt = tat - now;

        if n == 0 {
            return Self::admit_nothing(debt, burst_offset, emission_interval, tolerance);
        }

        // now - (tat - burst_offset)
        let diff = burst_offset - debt;

        if diff < emission_interval - tolerance {
            return GcraOutcome {
                evaluation: Evaluation {
                    allowed: 0,
                    remaining: 0,
                    retry_after: Some(emission_interval - diff),
                    reset_after: debt,
                },
                write: None,
            };
        }

        // At least one permit fits past the check above.
        let available = (whole_permits(diff, emission_interval, tolerance) as u64).max(1);
        let cost = n.min(available);
        let increment = emission_interval * cost as f64;
        let new_tat = tat + increment;
        let reset_after = debt + increment;

        GcraOutcome {
            evaluation: Evaluation {
                allowed: cost,
                remaining: available - cost,
                retry_after: None,
                reset_after,
            },
            write: TatWrite::after(new_tat, reset_after),
        }
    } // end method allow_at_most

    fn admit_nothing(
        debt: f64,
        burst_offset: f64,
        emission_interval: f64,
        tolerance: f64,
    ) -> GcraOutcome {
        let remaining = whole_permits(burst_offset - debt, emission_interval, tolerance);

        GcraOutcome {
            evaluation: Evaluation {
                allowed: 0,
                remaining: remaining as u64,
                retry_after: None,
                reset_after: debt,
            },
            write: None,
        }
    }
}
