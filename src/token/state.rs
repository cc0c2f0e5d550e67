use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::RefreshWindow;
use crate::context::RequestContext;

use super::AccessToken;

/// Immutable cache snapshot. Updates replace the whole snapshot behind an
/// `Arc`; readers never observe a half-written state.
///
/// `next_refresh_at` is meaningful only while a token is cached: a successful
/// refresh pushes it one cooldown into the future, a failed one resets it to
/// the failure instant so the next caller retries without waiting.
#[derive(Clone, Debug)]
pub(crate) struct CacheState {
    pub token: Option<AccessToken>,
    pub next_refresh_at: SystemTime,
    pub context: Option<RequestContext>,
}

impl CacheState {
    pub fn new(token: Option<AccessToken>, context: Option<RequestContext>) -> Self {
        // a seeded token is immediately eligible for refresh
        Self {
            token,
            next_refresh_at: UNIX_EPOCH,
            context,
        }
    }

    pub fn empty() -> Self {
        Self::new(None, None)
    }

    pub fn valid_token(&self, now: SystemTime) -> Option<&AccessToken> {
        self.token.as_ref().filter(|token| !token.is_expired(now))
    }
}

/// What a refresh generation should do, in priority order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RefreshAction {
    /// Caller demanded a token for a new context; fetch, no fallback.
    ForceFetch,
    /// Token is fresh and outside the refresh window; serve it as is.
    ServeCached,
    /// Nothing usable cached; fetch, failures propagate.
    FetchNoFallback,
    /// Inside the window but still cooling down; serve the cached token.
    CooldownFallback,
    /// Inside the window and past the cooldown; fetch, fall back on failure.
    FetchWithFallback,
}

pub(crate) fn decide(
    state: &CacheState,
    window: &RefreshWindow,
    now: SystemTime,
    forced: bool,
) -> RefreshAction {
    if forced {
        return RefreshAction::ForceFetch;
    }
    let Some(token) = &state.token else {
        return RefreshAction::FetchNoFallback;
    };
    if token.is_expired(now) {
        return RefreshAction::FetchNoFallback;
    }
    let refresh_due = token
        .expires_at()
        .checked_sub(window.offset())
        .unwrap_or(UNIX_EPOCH);
    if now < refresh_due {
        return RefreshAction::ServeCached;
    }
    if now < state.next_refresh_at {
        return RefreshAction::CooldownFallback;
    }
    RefreshAction::FetchWithFallback
}
