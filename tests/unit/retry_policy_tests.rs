use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;

use token_warden::{Error, RetryMode, RetryOptions, RetryPolicy};

fn transient() -> Error {
    Error::refresh_transient("connection reset")
}

fn policy(options: RetryOptions) -> RetryPolicy {
    RetryPolicy::new(options).expect("policy")
}

#[test]
fn zero_delay_disables_retry() {
    let policy = policy(RetryOptions::new().with_delay(Duration::ZERO));
    let mut rng = StdRng::seed_from_u64(1);
    assert_eq!(policy.calculate_delay(&transient(), 1, &mut rng), None);
}

#[test]
fn zero_max_delay_disables_retry() {
    let policy = policy(RetryOptions::new().with_max_delay(Duration::ZERO));
    let mut rng = StdRng::seed_from_u64(1);
    assert_eq!(policy.calculate_delay(&transient(), 1, &mut rng), None);
}

#[test]
fn exponential_delays_stay_bounded_and_budget_exhausts() {
    // defaults: 3 retries, 800ms base, 60s cap, exponential
    let policy = policy(RetryOptions::new());
    let mut rng = StdRng::seed_from_u64(7);
    for attempt in 1..=3 {
        let delay = policy
            .calculate_delay(&transient(), attempt, &mut rng)
            .expect("attempts within the budget get a delay");
        assert!(
            delay <= Duration::from_secs(60),
            "attempt {attempt} produced {delay:?}"
        );
        assert!(delay >= Duration::from_millis(800));
    }
    assert_eq!(policy.calculate_delay(&transient(), 4, &mut rng), None);
    assert_eq!(policy.calculate_delay(&transient(), 5, &mut rng), None);
}

#[test]
fn exponential_delays_grow_with_attempts() {
    let policy = policy(RetryOptions::new());
    // jitter is at most 64ms here, far below the exponential growth steps
    let mut rng = StdRng::seed_from_u64(3);
    let first = policy.calculate_delay(&transient(), 1, &mut rng).unwrap();
    let second = policy.calculate_delay(&transient(), 2, &mut rng).unwrap();
    let third = policy.calculate_delay(&transient(), 3, &mut rng).unwrap();
    assert!(first < second, "{first:?} !< {second:?}");
    assert!(second < third, "{second:?} !< {third:?}");
}

#[test]
fn fixed_jitter_stays_within_eight_percent() {
    let policy = policy(
        RetryOptions::new()
            .with_mode(RetryMode::Fixed)
            .with_delay(Duration::from_secs(1)),
    );
    let mut rng = StdRng::seed_from_u64(42);
    for attempt in 1..=3 {
        let delay = policy
            .calculate_delay(&transient(), attempt, &mut rng)
            .expect("within budget");
        assert!(delay >= Duration::from_secs(1));
        assert!(delay <= Duration::from_millis(1080), "got {delay:?}");
    }
}

#[test]
fn single_retry_budget_degenerates_to_base_delay() {
    // ln(1) = 0 in the factor denominator; the curve flattens to the base
    let policy = policy(RetryOptions::new().with_max_retries(1));
    let mut rng = StdRng::seed_from_u64(9);
    let delay = policy
        .calculate_delay(&transient(), 1, &mut rng)
        .expect("one retry allowed");
    assert!(delay >= Duration::from_millis(800));
    assert!(delay <= Duration::from_millis(900), "got {delay:?}");
}

#[test]
fn non_retriable_failures_get_no_delay() {
    let policy = policy(RetryOptions::new());
    let mut rng = StdRng::seed_from_u64(5);
    let invalid = Error::InvalidArgument("bad scope".into());
    assert_eq!(policy.calculate_delay(&invalid, 1, &mut rng), None);
    let permanent = Error::refresh_permanent("revoked");
    assert_eq!(policy.calculate_delay(&permanent, 1, &mut rng), None);
}

#[test]
fn timeouts_are_retriable() {
    let policy = policy(RetryOptions::new());
    let mut rng = StdRng::seed_from_u64(11);
    let timeout = Error::Timeout(Duration::from_secs(60));
    assert!(policy.calculate_delay(&timeout, 1, &mut rng).is_some());
}

#[test]
fn policies_compare_by_their_options() {
    let a = policy(RetryOptions::new());
    let b = policy(RetryOptions::new());
    let c = policy(RetryOptions::new().with_max_retries(5));
    assert_eq!(a, b);
    assert_ne!(a, c);

    let mut ha = DefaultHasher::new();
    let mut hb = DefaultHasher::new();
    a.hash(&mut ha);
    b.hash(&mut hb);
    assert_eq!(ha.finish(), hb.finish());
}
