use std::fmt;

use rand::{SeedableRng, rngs::StdRng};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::warn;

use crate::config::SERVER_BUSY_EXTRA_DELAY;
use crate::errors::{Error, FailureClass};

use super::{RetryOutcome, policy::RetryPolicy};

#[derive(Debug, Clone, Copy)]
pub enum OperationKind {
    TokenFetch,
    ProactiveRefresh,
    Operation(&'static str),
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::TokenFetch => write!(f, "token_fetch"),
            OperationKind::ProactiveRefresh => write!(f, "proactive_refresh"),
            OperationKind::Operation(name) => write!(f, "{name}"),
        }
    }
}

/// Drives an operation through the retry policy: each attempt is bounded by
/// `try_timeout`, failures are classified, and server-busy signals extend the
/// computed backoff by a fixed amount.
pub struct RetryCoordinator {
    policy: RetryPolicy,
    rng: Mutex<StdRng>,
}

impl RetryCoordinator {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn execute<F, Fut, T>(
        &self,
        operation: OperationKind,
        mut op: F,
    ) -> Result<(T, RetryOutcome), Error>
    where
        F: FnMut(u32) -> Fut + Send,
        Fut: std::future::Future<Output = Result<T, Error>> + Send,
    {
        let try_timeout = self.policy.options().try_timeout();
        let mut attempt: u32 = 1;
        let start = Instant::now();
        loop {
            let result = match tokio::time::timeout(try_timeout, op(attempt)).await {
                Ok(result) => result,
                Err(_) => Err(Error::Timeout(try_timeout)),
            };
            match result {
                Ok(value) => {
                    let outcome = RetryOutcome {
                        operation,
                        attempts: attempt,
                        success: true,
                        elapsed: start.elapsed(),
                    };
                    outcome.log();
                    return Ok((value, outcome));
                }
                Err(err) => {
                    let delay = {
                        let mut rng = self.rng.lock().await;
                        self.policy.calculate_delay(&err, attempt, &mut *rng)
                    };
                    let Some(mut delay) = delay else {
                        let outcome = RetryOutcome {
                            operation,
                            attempts: attempt,
                            success: false,
                            elapsed: start.elapsed(),
                        };
                        outcome.log();
                        return Err(err);
                    };
                    if matches!(
                        &err,
                        Error::RefreshFailed {
                            class: FailureClass::ServerBusy,
                            ..
                        }
                    ) {
                        delay += SERVER_BUSY_EXTRA_DELAY;
                    }
                    warn!(
                        operation = %operation,
                        attempt,
                        max_retries = self.policy.options().max_retries(),
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retry.scheduling"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
