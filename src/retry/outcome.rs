use std::time::Duration;

use tracing::Level;
use tracing::event;

use super::OperationKind;

/// Terminal record of one retried operation, emitted once per `execute` call.
#[derive(Debug, Clone)]
pub struct RetryOutcome {
    pub operation: OperationKind,
    pub attempts: u32,
    pub success: bool,
    pub elapsed: Duration,
}

impl RetryOutcome {
    pub fn log(&self) {
        if self.success {
            event!(
                Level::INFO,
                operation = %self.operation,
                attempts = self.attempts,
                elapsed_ms = self.elapsed.as_millis() as u64,
                "retry.outcome"
            );
        } else {
            event!(
                Level::WARN,
                operation = %self.operation,
                attempts = self.attempts,
                elapsed_ms = self.elapsed.as_millis() as u64,
                "retry.outcome"
            );
        }
    }
}
