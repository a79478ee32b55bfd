use std::{fmt, time::Duration};

use crate::LeakygateError;

/// Unix timestamp (seconds) of 2017-01-01T00:00:00Z, the epoch TATs are measured from.
///
/// Keeping stored timestamps small preserves sub-microsecond precision in an `f64`.
pub const TAT_EPOCH_UNIX_SECONDS: u64 = 1_483_228_800;

/// A validated rate limit: `rate` permits per `period`, with up to `burst` permits
/// available at once.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use leakygate::Limit;
///
/// let per_second = Limit::per_second(10).unwrap();
/// assert_eq!(per_second.to_string(), "10 req/s (burst 10)");
///
/// let bursty = Limit::new(100, 20, Duration::from_secs(60)).unwrap();
/// assert_eq!(bursty.emission_interval(), 0.6);
///
/// assert!(Limit::per_minute(0).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Limit {
    rate: u64,
    burst: u64,
    period: Duration,
}

impl Limit {
    /// Create a limit of `rate` permits per `period` with a burst capacity of `burst`.
    ///
    /// All three values must be non-zero.
    pub fn new(rate: u64, burst: u64, period: Duration) -> Result<Self, LeakygateError> {
        if rate == 0 {
            Err(LeakygateError::InvalidLimit(
                "rate must be greater than 0".to_string(),
            ))
        } else if burst == 0 {
            Err(LeakygateError::InvalidLimit(
                "burst must be greater than 0".to_string(),
            ))
        } else if period.is_zero() {
            Err(LeakygateError::InvalidLimit(
                "period must be greater than 0".to_string(),
            ))
        } else {
            Ok(Self {
                rate,
                burst,
                period,
            })
        }
    }

    /// `rate` permits per second, burst equal to `rate`.
    pub fn per_second(rate: u64) -> Result<Self, LeakygateError> {
        Self::new(rate, rate, Duration::from_secs(1))
    }

    /// `rate` permits per minute, burst equal to `rate`.
    pub fn per_minute(rate: u64) -> Result<Self, LeakygateError> {
        Self::new(rate, rate, Duration::from_secs(60))
    }

    /// `rate` permits per hour, burst equal to `rate`.
    pub fn per_hour(rate: u64) -> Result<Self, LeakygateError> {
        Self::new(rate, rate, Duration::from_secs(3600))
    }

    /// Copy of this limit with a different burst capacity.
    pub fn with_burst(self, burst: u64) -> Result<Self, LeakygateError> {
        Self::new(self.rate, burst, self.period)
    }

    /// Permits replenished per period.
    pub fn rate(&self) -> u64 {
        self.rate
    }

    /// Maximum permits available at once.
    pub fn burst(&self) -> u64 {
        self.burst
    }

    /// Replenishment period.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Seconds it takes to replenish one permit (`period / rate`).
    pub fn emission_interval(&self) -> f64 {
        self.period.as_secs_f64() / self.rate as f64
    }

    /// How far, in seconds, the TAT may lead `now` while still admitting.
    pub fn burst_offset(&self) -> f64 {
        self.emission_interval() * self.burst as f64
    }
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let period = match self.period.as_secs() {
            1 if self.period.subsec_nanos() == 0 => "s".to_string(),
            60 if self.period.subsec_nanos() == 0 => "m".to_string(),
            3600 if self.period.subsec_nanos() == 0 => "h".to_string(),
            _ => format!("{:?}", self.period),
        };

        write!(f, "{} req/{} (burst {})", self.rate, period, self.burst)
    }
}

/// How a request for `n` permits is admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdmissionMode {
    /// All-or-nothing: admit exactly `n` permits or none.
    Exact,
    /// Admit as many of the `n` permits as capacity allows, possibly none.
    AtMost,
}

impl AdmissionMode {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            AdmissionMode::Exact => "exact",
            AdmissionMode::AtMost => "at_most",
        }
    }
}

/// Outcome of a rate limit check.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitDecision {
    /// The limit the decision was made against.
    pub limit: Limit,
    /// Permits admitted by this call. Zero when denied.
    pub allowed: u64,
    /// Whole permits still available right after this call.
    pub remaining: u64,
    /// How long to wait before the same request can succeed.
    ///
    /// `None` when the request was admitted.
    pub retry_after: Option<Duration>,
    /// How long until all `burst` permits are available again.
    pub reset_after: Duration,
}

impl RateLimitDecision {
    /// Whether the request was admitted.
    ///
    /// A zero-cost request is admitted even though `allowed` is `0`.
    pub fn is_allowed(&self) -> bool {
        self.retry_after.is_none()
    }
}

/// Convert (possibly slightly negative) seconds into a [`Duration`], clamping at zero.
pub(crate) fn secs_to_duration(secs: f64) -> Duration {
    if secs.is_finite() && secs > 0f64 {
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    } else {
        Duration::ZERO
    }
}

/// Keys name state in a shared store; an empty one would alias the bare prefix.
pub(crate) fn validate_key(key: &str) -> Result<(), LeakygateError> {
    if key.is_empty() {
        Err(LeakygateError::InvalidKey(
            "rate limit key must not be empty".to_string(),
        ))
    } else {
        Ok(())
    }
}
