mod blocking;
mod envelope;
mod guard;
mod state;

pub use blocking::BlockingTokenGuard;
pub use envelope::{AccessToken, TokenSnapshot, parse_raw_token};
pub use guard::{TokenGuard, TokenGuardConfig};
pub(crate) use state::{CacheState, RefreshAction, decide};
