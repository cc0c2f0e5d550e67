use std::time::Duration;

use token_warden::{Error, RefreshWindow, RetryMode, RetryOptions, RetryPolicy};

#[test]
fn defaults_match_documented_values() {
    let options = RetryOptions::new();
    assert_eq!(options.max_retries(), 3);
    assert_eq!(options.delay(), Duration::from_millis(800));
    assert_eq!(options.max_delay(), Duration::from_secs(60));
    assert_eq!(options.try_timeout(), Duration::from_secs(60));
    assert_eq!(options.mode(), RetryMode::Exponential);
}

#[test]
fn setters_apply_individually() {
    let options = RetryOptions::new()
        .with_max_retries(7)
        .with_delay(Duration::from_millis(250))
        .with_max_delay(Duration::from_secs(30))
        .with_try_timeout(Duration::from_secs(10))
        .with_mode(RetryMode::Fixed);
    assert_eq!(options.max_retries(), 7);
    assert_eq!(options.delay(), Duration::from_millis(250));
    assert_eq!(options.max_delay(), Duration::from_secs(30));
    assert_eq!(options.try_timeout(), Duration::from_secs(10));
    assert_eq!(options.mode(), RetryMode::Fixed);
}

#[test]
fn zero_try_timeout_is_rejected() {
    let err = RetryPolicy::new(RetryOptions::new().with_try_timeout(Duration::ZERO))
        .expect_err("zero try_timeout is invalid");
    assert!(matches!(err, Error::InvalidArgument(_)));
}

#[test]
fn refresh_window_rejects_zero_offset() {
    let err = RefreshWindow::new(Duration::ZERO, Duration::from_secs(30))
        .expect_err("offset must be positive");
    assert!(matches!(err, Error::InvalidArgument(_)));
}

#[test]
fn refresh_window_rejects_zero_cooldown() {
    let err = RefreshWindow::new(Duration::from_secs(300), Duration::ZERO)
        .expect_err("cooldown must be positive");
    assert!(matches!(err, Error::InvalidArgument(_)));
}

#[test]
fn refresh_window_defaults() {
    let window = RefreshWindow::default();
    assert_eq!(window.offset(), Duration::from_secs(300));
    assert_eq!(window.cooldown(), Duration::from_secs(30));
}
