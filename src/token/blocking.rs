use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use parking_lot::{Mutex, RwLock};
use tracing::warn;

use crate::config::RefreshWindow;
use crate::context::RequestContext;
use crate::credential::FetchTokenBlocking;
use crate::errors::Error;
use crate::telemetry::refresh::RefreshTelemetry;

use super::{AccessToken, CacheState, RefreshAction, decide};

/// Synchronous counterpart of [`TokenGuard`](super::TokenGuard): the same
/// decision table, serialized by a blocking mutex instead of the in-flight
/// marker. Callers that lose the race block until the winner releases the
/// lock, then re-read the updated cache.
pub struct BlockingTokenGuard {
    state: RwLock<Arc<CacheState>>,
    refresh_lock: Mutex<()>,
    window: RefreshWindow,
    try_timeout: Duration,
    fetcher: Arc<dyn FetchTokenBlocking>,
}

impl BlockingTokenGuard {
    pub fn new(
        window: RefreshWindow,
        try_timeout: Duration,
        fetcher: Arc<dyn FetchTokenBlocking>,
        token: Option<AccessToken>,
        context: Option<RequestContext>,
    ) -> Self {
        Self {
            state: RwLock::new(Arc::new(CacheState::new(token, context))),
            refresh_lock: Mutex::new(()),
            window,
            try_timeout,
            fetcher,
        }
    }

    pub fn current_token(&self) -> Option<AccessToken> {
        self.snapshot().token.clone()
    }

    pub(crate) fn clear(&self) {
        *self.state.write() = Arc::new(CacheState::empty());
    }

    pub fn get(
        &self,
        context: Option<&RequestContext>,
        force_check: bool,
    ) -> Result<AccessToken, Error> {
        let snapshot = self.snapshot();
        let effective = match context.or(snapshot.context.as_ref()) {
            Some(ctx) => ctx.clone(),
            None => {
                return Err(Error::InvalidArgument(
                    "a request context is required before any token has been fetched".into(),
                ));
            }
        };
        let forced = force_check
            && (snapshot.context.is_none() || snapshot.context.as_ref() != Some(&effective));
        if forced && effective.scopes().is_empty() {
            return Err(Error::InvalidArgument(
                "scopes must be non-empty for a forced refresh".into(),
            ));
        }

        let now = SystemTime::now();
        if decide(&snapshot, &self.window, now, forced) == RefreshAction::ServeCached
            && let Some(token) = snapshot.valid_token(now)
        {
            return Ok(token.clone());
        }

        let _lock = self.refresh_lock.lock();
        // someone may have refreshed while this caller was blocked
        let now = SystemTime::now();
        let snapshot = self.snapshot();
        match decide(&snapshot, &self.window, now, forced) {
            RefreshAction::ServeCached | RefreshAction::CooldownFallback => {
                match snapshot.valid_token(now) {
                    Some(token) => Ok(token.clone()),
                    None => Err(Error::refresh_transient(
                        "cached token vanished during refresh decision",
                    )),
                }
            }
            RefreshAction::ForceFetch | RefreshAction::FetchNoFallback => {
                let telemetry = RefreshTelemetry::new(effective.label());
                telemetry.emit_start(now);
                match self.fetch_bounded(&effective) {
                    Ok(token) => {
                        self.store_success(token.clone(), effective);
                        telemetry.emit_success(SystemTime::now());
                        Ok(token)
                    }
                    Err(err) => {
                        self.store_failure();
                        telemetry.emit_failure(&err, SystemTime::now());
                        Err(err)
                    }
                }
            }
            RefreshAction::FetchWithFallback => {
                let telemetry = RefreshTelemetry::new(effective.label());
                telemetry.emit_start(now);
                match self.fetch_bounded(&effective) {
                    Ok(token) => {
                        self.store_success(token.clone(), effective);
                        telemetry.emit_success(SystemTime::now());
                        Ok(token)
                    }
                    Err(err) => {
                        self.store_failure();
                        let now = SystemTime::now();
                        match self.snapshot().valid_token(now) {
                            Some(token) => {
                                telemetry.emit_fallback(&err, now);
                                Ok(token.clone())
                            }
                            None => {
                                telemetry.emit_failure(&err, now);
                                Err(err)
                            }
                        }
                    }
                }
            }
        }
    }

    /// A blocking fetch cannot be preempted; an attempt that ran past
    /// `try_timeout` is converted to a timeout for retry accounting.
    fn fetch_bounded(&self, context: &RequestContext) -> Result<AccessToken, Error> {
        let started = Instant::now();
        let result = self.fetcher.fetch(context);
        if started.elapsed() > self.try_timeout {
            warn!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                limit_ms = self.try_timeout.as_millis() as u64,
                "token.refresh.overdue"
            );
            return Err(Error::Timeout(self.try_timeout));
        }
        result
    }

    fn snapshot(&self) -> Arc<CacheState> {
        let guard = self.state.read();
        Arc::clone(&guard)
    }

    fn store_success(&self, token: AccessToken, context: RequestContext) {
        let next_refresh_at = SystemTime::now() + self.window.cooldown();
        *self.state.write() = Arc::new(CacheState {
            token: Some(token),
            next_refresh_at,
            context: Some(context),
        });
    }

    fn store_failure(&self) {
        let previous = self.snapshot();
        *self.state.write() = Arc::new(CacheState {
            token: previous.token.clone(),
            next_refresh_at: SystemTime::now(),
            context: previous.context.clone(),
        });
    }
}
