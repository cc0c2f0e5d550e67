use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tracing::debug;

use crate::config::RefreshWindow;
use crate::context::RequestContext;
use crate::credential::FetchToken;
use crate::errors::Error;
use crate::telemetry::refresh::RefreshTelemetry;

use super::{AccessToken, CacheState, RefreshAction, decide};

/// Result published to every caller that joined one refresh generation.
type GenerationResult = Option<Result<AccessToken, Error>>;

#[derive(Clone, Debug)]
pub struct TokenGuardConfig {
    pub window: RefreshWindow,
    pub try_timeout: Duration,
}

/// Serves tokens to any number of concurrent callers while keeping at most
/// one fetch in flight.
///
/// The in-flight slot doubles as the single-flight marker and the broadcast
/// handle: occupied means a refresh generation is running, and the stored
/// receiver is how late arrivals subscribe to that generation's result. The
/// slot lock is only ever held to install, clone, or clear the marker, never
/// across an await.
pub struct TokenGuard {
    state: RwLock<Arc<CacheState>>,
    in_flight: Mutex<Option<watch::Receiver<GenerationResult>>>,
    window: RefreshWindow,
    try_timeout: Duration,
    fetcher: Arc<dyn FetchToken>,
}

/// Clears the in-flight marker even if the owning refresh is cancelled
/// mid-fetch, so a dropped generation cannot wedge the guard.
struct InFlightReset<'a> {
    slot: &'a Mutex<Option<watch::Receiver<GenerationResult>>>,
}

impl Drop for InFlightReset<'_> {
    fn drop(&mut self) {
        *self.slot.lock() = None;
    }
}

enum Role {
    Winner(watch::Sender<GenerationResult>),
    Waiter(watch::Receiver<GenerationResult>),
}

impl TokenGuard {
    pub fn new(config: TokenGuardConfig, fetcher: Arc<dyn FetchToken>) -> Self {
        Self::with_initial(config, fetcher, None, None)
    }

    pub fn with_initial(
        config: TokenGuardConfig,
        fetcher: Arc<dyn FetchToken>,
        token: Option<AccessToken>,
        context: Option<RequestContext>,
    ) -> Self {
        Self {
            state: RwLock::new(Arc::new(CacheState::new(token, context))),
            in_flight: Mutex::new(None),
            window: config.window,
            try_timeout: config.try_timeout,
            fetcher,
        }
    }

    pub fn window(&self) -> &RefreshWindow {
        &self.window
    }

    /// Current cached token, valid or not.
    pub fn current_token(&self) -> Option<AccessToken> {
        self.snapshot().token.clone()
    }

    pub(crate) fn expires_at(&self) -> Option<SystemTime> {
        self.snapshot().token.as_ref().map(AccessToken::expires_at)
    }

    pub(crate) fn next_refresh_in(&self, now: SystemTime) -> Duration {
        self.snapshot()
            .next_refresh_at
            .duration_since(now)
            .unwrap_or(Duration::ZERO)
    }

    /// Drop the cached snapshot; the zero-on-drop token scrubs its value.
    pub(crate) fn clear(&self) {
        *self.state.write() = Arc::new(CacheState::empty());
    }

    /// Serve a token for `context`, fetching a fresh one when the cache
    /// demands it. `context` may be omitted once a context is on record.
    pub async fn get(
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

        let role = {
            let mut slot = self.in_flight.lock();
            match &*slot {
                Some(rx) => Role::Waiter(rx.clone()),
                None => {
                    let (tx, rx) = watch::channel(None);
                    *slot = Some(rx);
                    Role::Winner(tx)
                }
            }
        };

        match role {
            Role::Winner(tx) => {
                let reset = InFlightReset {
                    slot: &self.in_flight,
                };
                let result = self.refresh_once(effective, forced).await;
                drop(reset);
                let _ = tx.send(Some(result.clone()));
                result
            }
            Role::Waiter(rx) => self.join_generation(rx, force_check).await,
        }
    }

    /// Run the decision table and carry out whichever action it picks.
    async fn refresh_once(
        &self,
        context: RequestContext,
        forced: bool,
    ) -> Result<AccessToken, Error> {
        let now = SystemTime::now();
        let snapshot = self.snapshot();
        match decide(&snapshot, &self.window, now, forced) {
            RefreshAction::ServeCached | RefreshAction::CooldownFallback => {
                match snapshot.valid_token(now) {
                    Some(token) => Ok(token.clone()),
                    // both arms imply a valid token; a racing close emptied it
                    None => Err(Error::refresh_transient(
                        "cached token vanished during refresh decision",
                    )),
                }
            }
            RefreshAction::ForceFetch | RefreshAction::FetchNoFallback => {
                let telemetry = RefreshTelemetry::new(context.label());
                telemetry.emit_start(now);
                match self.fetch_with_timeout(&context).await {
                    Ok(token) => {
                        self.store_success(token.clone(), context);
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
                let telemetry = RefreshTelemetry::new(context.label());
                telemetry.emit_start(now);
                match self.fetch_with_timeout(&context).await {
                    Ok(token) => {
                        self.store_success(token.clone(), context);
                        telemetry.emit_success(SystemTime::now());
                        Ok(token)
                    }
                    Err(err) => {
                        // record the failure so the next call retries sooner
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

    /// Path taken by callers that lost the in-flight race.
    async fn join_generation(
        &self,
        mut rx: watch::Receiver<GenerationResult>,
        force_check: bool,
    ) -> Result<AccessToken, Error> {
        let now = SystemTime::now();
        let snapshot = self.snapshot();
        if !force_check
            && let Some(token) = snapshot.valid_token(now)
        {
            // a usable token outranks waiting on someone else's refresh
            return Ok(token.clone());
        }
        drop(snapshot);
        loop {
            if let Some(result) = rx.borrow_and_update().clone() {
                return result;
            }
            if rx.changed().await.is_err() {
                break;
            }
        }
        // the generation we joined went away without publishing; serve
        // whatever the cache holds now rather than erroring
        debug!("joined refresh generation ended without a result");
        match self.snapshot().token.clone() {
            Some(token) => Ok(token),
            None => Err(Error::refresh_transient(
                "refresh ended without producing a token",
            )),
        }
    }

    async fn fetch_with_timeout(&self, context: &RequestContext) -> Result<AccessToken, Error> {
        match tokio::time::timeout(self.try_timeout, self.fetcher.fetch(context)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(self.try_timeout)),
        }
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
