use std::time::Duration;

use crate::{LeakygateError, Limit, RateLimitDecision, common::secs_to_duration};

#[test]
fn limit_new_validates_positive_fields() {
    let limit = Limit::new(10, 20, Duration::from_secs(1)).unwrap();
    assert_eq!(limit.rate(), 10);
    assert_eq!(limit.burst(), 20);
    assert_eq!(limit.period(), Duration::from_secs(1));

    let err = Limit::new(0, 10, Duration::from_secs(1)).unwrap_err();
    assert!(matches!(err, LeakygateError::InvalidLimit(_)));
    assert_eq!(err.to_string(), "invalid limit: rate must be greater than 0");

    let err = Limit::new(10, 0, Duration::from_secs(1)).unwrap_err();
    assert_eq!(err.to_string(), "invalid limit: burst must be greater than 0");

    let err = Limit::new(10, 10, Duration::ZERO).unwrap_err();
    assert_eq!(err.to_string(), "invalid limit: period must be greater than 0");
}

#[test]
fn limit_helpers_set_burst_to_rate() {
    let s = Limit::per_second(5).unwrap();
    assert_eq!((s.rate(), s.burst(), s.period()), (5, 5, Duration::from_secs(1)));

    let m = Limit::per_minute(100).unwrap();
    assert_eq!((m.rate(), m.burst(), m.period()), (100, 100, Duration::from_secs(60)));

    let h = Limit::per_hour(5000).unwrap();
    assert_eq!((h.rate(), h.burst(), h.period()), (5000, 5000, Duration::from_secs(3600)));

    assert!(Limit::per_second(0).is_err());
    assert!(Limit::per_hour(0).is_err());
}

#[test]
fn with_burst_revalidates() {
    let limit = Limit::per_second(10).unwrap().with_burst(3).unwrap();
    assert_eq!(limit.burst(), 3);
    assert_eq!(limit.rate(), 10);

    assert!(Limit::per_second(10).unwrap().with_burst(0).is_err());
}

#[test]
fn emission_interval_and_burst_offset() {
    let limit = Limit::new(4, 8, Duration::from_secs(2)).unwrap();
    assert_eq!(limit.emission_interval(), 0.5);
    assert_eq!(limit.burst_offset(), 4.0);
}

#[test]
fn limit_display() {
    assert_eq!(Limit::per_second(10).unwrap().to_string(), "10 req/s (burst 10)");
    assert_eq!(Limit::per_minute(60).unwrap().to_string(), "60 req/m (burst 60)");
    assert_eq!(Limit::per_hour(1).unwrap().to_string(), "1 req/h (burst 1)");
    assert_eq!(
        Limit::new(3, 5, Duration::from_millis(1500))
            .unwrap()
            .to_string(),
        "3 req/1.5s (burst 5)"
    );
}

#[test]
fn secs_to_duration_clamps() {
    assert_eq!(secs_to_duration(0.25), Duration::from_millis(250));
    assert_eq!(secs_to_duration(0.0), Duration::ZERO);
    assert_eq!(secs_to_duration(-1e-12), Duration::ZERO);
    assert_eq!(secs_to_duration(f64::NAN), Duration::ZERO);
}

#[test]
fn decision_is_allowed_follows_retry_after() {
    let limit = Limit::per_second(1).unwrap();

    let admitted_nothing = RateLimitDecision {
        limit,
        allowed: 0,
        remaining: 1,
        retry_after: None,
        reset_after: Duration::ZERO,
    };
    assert!(admitted_nothing.is_allowed());

    let denied = RateLimitDecision {
        retry_after: Some(Duration::ZERO),
        ..admitted_nothing
    };
    assert!(!denied.is_allowed());
}

#[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
#[test]
fn key_prefix_try_from_validates() {
    use crate::redis::KeyPrefix;

    let prefix = KeyPrefix::try_from("myapp").unwrap();
    assert_eq!(&*prefix, "myapp");
    assert_eq!(prefix.key("user:1"), "myapp:user:1");

    assert_eq!(KeyPrefix::default().key("k"), "RATE_LIMIT:k");

    assert!(matches!(
        KeyPrefix::try_from(""),
        Err(LeakygateError::InvalidKeyPrefix(_))
    ));
    assert!(matches!(
        KeyPrefix::try_from("a:b"),
        Err(LeakygateError::InvalidKeyPrefix(_))
    ));
    assert!(matches!(
        KeyPrefix::try_from("x".repeat(256)),
        Err(LeakygateError::InvalidKeyPrefix(_))
    ));
    assert!(KeyPrefix::try_from("x".repeat(255)).is_ok());
}
