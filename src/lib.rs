mod config;
mod context;
mod credential;
pub mod errors;
pub mod retry;
mod scheduler;
pub mod telemetry;
pub mod token;

pub use config::{CredentialOptions, RefreshWindow, RetryMode, RetryOptions};
pub use context::{AudienceRule, RequestContext};
pub use credential::{
    BlockingTokenCredential, FetchFn, FetchToken, FetchTokenBlocking, RawFetchFn, TokenCredential,
};
pub use errors::{Error, FailureClass};
pub use retry::{OperationKind, RetryCoordinator, RetryOutcome, RetryPolicy};
pub use token::{AccessToken, TokenSnapshot, parse_raw_token};

#[cfg(test)]
mod tests;
