use std::hash::{Hash, Hasher};
use std::time::Duration;

use rand::Rng;

use crate::config::{RetryMode, RetryOptions};
use crate::errors::Error;

/// Fraction of the base delay used as the jitter range.
const JITTER_FACTOR: f64 = 0.08;

/// Maps (last failure, attempt number) to a delay before the next attempt,
/// or `None` when retrying should stop.
///
/// The computation is pure; the caller supplies the rng, so one policy
/// instance can serve any number of concurrent operations.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    options: RetryOptions,
    retry_factor: f64,
}

impl RetryPolicy {
    pub fn new(options: RetryOptions) -> Result<Self, Error> {
        options.validate()?;
        let retry_factor = exponential_factor(&options);
        Ok(Self {
            options,
            retry_factor,
        })
    }

    pub fn options(&self) -> &RetryOptions {
        &self.options
    }

    /// `attempt` counts the attempt just completed, the very first included.
    pub fn calculate_delay(
        &self,
        last_failure: &Error,
        attempt: u32,
        rng: &mut impl Rng,
    ) -> Option<Duration> {
        if self.options.delay().is_zero() || self.options.max_delay().is_zero() {
            return None;
        }
        if attempt > self.options.max_retries() {
            return None;
        }
        if !last_failure.retriable() {
            return None;
        }

        let base = self.options.delay();
        let jitter_secs = base.as_secs_f64() * JITTER_FACTOR;
        let delay = match self.options.mode() {
            RetryMode::Fixed => {
                base + Duration::from_secs_f64(jitter_secs * rng.gen_range(0.0..1.0))
            }
            RetryMode::Exponential => {
                let backoff_secs =
                    jitter_secs * rng.gen_range(0.0..1.0) + self.retry_factor.powi(attempt as i32);
                base + Duration::from_secs_f64(backoff_secs)
            }
        };
        Some(delay.min(self.options.max_delay()))
    }
}

/// Base of the exponential backoff curve, sized so the final permitted
/// attempt lands near `max_delay`. Degenerates to 0 when the spread or the
/// retry budget makes the logarithms non-positive; the clamp in
/// `calculate_delay` keeps the result bounded either way.
fn exponential_factor(options: &RetryOptions) -> f64 {
    let spread = options.max_delay().as_secs_f64() - options.delay().as_secs_f64();
    if spread <= 0.0 {
        return 0.0;
    }
    let numerator = spread.ln();
    let denominator = (options.max_retries() as f64).ln();
    if numerator <= 0.0 || denominator <= 0.0 {
        return 0.0;
    }
    numerator / denominator
}

impl PartialEq for RetryPolicy {
    fn eq(&self, other: &Self) -> bool {
        self.options == other.options
    }
}

impl Eq for RetryPolicy {}

impl Hash for RetryPolicy {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.options.hash(state);
    }
}
