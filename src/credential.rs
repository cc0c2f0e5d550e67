//! The externally visible credential types: an async facade backed by the
//! single-flight [`TokenGuard`] and a blocking facade backed by
//! [`BlockingTokenGuard`], both wired from the same [`CredentialOptions`].

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::config::CredentialOptions;
use crate::context::RequestContext;
use crate::errors::Error;
use crate::retry::{OperationKind, RetryCoordinator, RetryOutcome, RetryPolicy};
use crate::scheduler::ProactiveScheduler;
use crate::token::{
    AccessToken, BlockingTokenGuard, TokenGuard, TokenGuardConfig, parse_raw_token,
};

/// The capability a credential needs from its owner: produce a fresh token
/// for a context. Implementations must tolerate being retried and must not
/// assume exclusive access to anything beyond what they close over.
#[async_trait]
pub trait FetchToken: Send + Sync {
    async fn fetch(&self, context: &RequestContext) -> Result<AccessToken, Error>;
}

/// Adapter for future-returning closures.
pub struct FetchFn<F>(pub F);

#[async_trait]
impl<F, Fut> FetchToken for FetchFn<F>
where
    F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<AccessToken, Error>> + Send + 'static,
{
    async fn fetch(&self, context: &RequestContext) -> Result<AccessToken, Error> {
        (self.0)(context.clone()).await
    }
}

/// Adapter for suppliers that return a raw bearer string; the embedded
/// expiry claim is parsed to build the access token.
pub struct RawFetchFn<F>(pub F);

#[async_trait]
impl<F, Fut> FetchToken for RawFetchFn<F>
where
    F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<String, Error>> + Send + 'static,
{
    async fn fetch(&self, context: &RequestContext) -> Result<AccessToken, Error> {
        let raw = (self.0)(context.clone()).await?;
        parse_raw_token(&raw)
    }
}

/// Blocking counterpart of [`FetchToken`]; plain closures implement it.
pub trait FetchTokenBlocking: Send + Sync {
    fn fetch(&self, context: &RequestContext) -> Result<AccessToken, Error>;
}

impl<F> FetchTokenBlocking for F
where
    F: Fn(&RequestContext) -> Result<AccessToken, Error> + Send + Sync,
{
    fn fetch(&self, context: &RequestContext) -> Result<AccessToken, Error> {
        self(context)
    }
}

/// Async credential: caches tokens, coalesces concurrent refreshes, and
/// optionally keeps them fresh in the background.
pub struct TokenCredential {
    guard: Arc<TokenGuard>,
    retry: RetryCoordinator,
    policy: RetryPolicy,
    options: CredentialOptions,
    scheduler: Mutex<Option<ProactiveScheduler>>,
    closed: AtomicBool,
}

impl std::fmt::Debug for TokenCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCredential")
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl TokenCredential {
    /// Build the credential. An initial raw token is parsed here, so
    /// malformed input fails construction rather than the first `get_token`.
    ///
    /// With `proactive_refresh` enabled this must run inside a Tokio runtime;
    /// the background task is spawned immediately when an initial context is
    /// on hand, otherwise after the first successful `get_token`.
    pub fn new(
        options: CredentialOptions,
        fetcher: impl FetchToken + 'static,
    ) -> Result<Self, Error> {
        options.validate()?;
        let policy = RetryPolicy::new(options.retry().clone())?;
        let initial = match options.initial_token() {
            Some(raw) => Some(parse_raw_token(raw)?),
            None => None,
        };
        let config = TokenGuardConfig {
            window: options.window().clone(),
            try_timeout: options.retry().try_timeout(),
        };
        let fetcher: Arc<dyn FetchToken> = Arc::new(fetcher);
        let guard = Arc::new(TokenGuard::with_initial(
            config,
            fetcher,
            initial,
            options.initial_context().cloned(),
        ));
        let credential = Self {
            retry: RetryCoordinator::new(policy.clone()),
            policy,
            guard,
            options,
            scheduler: Mutex::new(None),
            closed: AtomicBool::new(false),
        };
        if credential.options.proactive_refresh() && credential.options.initial_context().is_some()
        {
            credential.start_scheduler();
        }
        Ok(credential)
    }

    pub async fn get_token(&self, context: &RequestContext) -> Result<AccessToken, Error> {
        self.get_token_with_force(context, false).await
    }

    /// `force_check` demands a fresh token whenever `context` differs from
    /// the one the cache was populated for.
    pub async fn get_token_with_force(
        &self,
        context: &RequestContext,
        force_check: bool,
    ) -> Result<AccessToken, Error> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::CredentialClosed);
        }
        if let Some(rule) = self.options.audience_rule() {
            rule.check(context)?;
        }
        let token = self.guard.get(Some(context), force_check).await?;
        if self.options.proactive_refresh() {
            self.ensure_scheduler();
        }
        Ok(token)
    }

    /// Run a token-consuming operation under the credential's retry policy.
    pub async fn run_with_retry<F, Fut, T>(
        &self,
        operation: OperationKind,
        op: F,
    ) -> Result<(T, RetryOutcome), Error>
    where
        F: FnMut(u32) -> Fut + Send,
        Fut: Future<Output = Result<T, Error>> + Send,
    {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::CredentialClosed);
        }
        self.retry.execute(operation, op).await
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Whether the background refresher is currently running.
    pub fn is_proactive_refresh_active(&self) -> bool {
        self.scheduler
            .lock()
            .as_ref()
            .map(ProactiveScheduler::is_active)
            .unwrap_or(false)
    }

    /// Stop the background refresher, reject further calls, and drop the
    /// cached token so its value is zeroed. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(scheduler) = self.scheduler.lock().take() {
            scheduler.stop();
        }
        self.guard.clear();
    }

    fn start_scheduler(&self) {
        *self.scheduler.lock() = Some(ProactiveScheduler::start(
            Arc::clone(&self.guard),
            self.policy.clone(),
        ));
    }

    fn ensure_scheduler(&self) {
        let mut slot = self.scheduler.lock();
        if slot.is_none() && !self.closed.load(Ordering::SeqCst) {
            *slot = Some(ProactiveScheduler::start(
                Arc::clone(&self.guard),
                self.policy.clone(),
            ));
        }
    }
}

impl Drop for TokenCredential {
    fn drop(&mut self) {
        if let Some(scheduler) = self.scheduler.lock().take() {
            scheduler.stop();
        }
    }
}

/// Blocking credential for thread-pool callers. Refreshes on demand only;
/// proactive mode needs the async runtime and is rejected here.
pub struct BlockingTokenCredential {
    guard: BlockingTokenGuard,
    options: CredentialOptions,
    closed: AtomicBool,
}

impl std::fmt::Debug for BlockingTokenCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingTokenCredential")
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl BlockingTokenCredential {
    pub fn new(
        options: CredentialOptions,
        fetcher: impl FetchTokenBlocking + 'static,
    ) -> Result<Self, Error> {
        options.validate()?;
        if options.proactive_refresh() {
            return Err(Error::InvalidArgument(
                "proactive refresh requires the async credential".into(),
            ));
        }
        let initial = match options.initial_token() {
            Some(raw) => Some(parse_raw_token(raw)?),
            None => None,
        };
        let fetcher: Arc<dyn FetchTokenBlocking> = Arc::new(fetcher);
        let guard = BlockingTokenGuard::new(
            options.window().clone(),
            options.retry().try_timeout(),
            fetcher,
            initial,
            options.initial_context().cloned(),
        );
        Ok(Self {
            guard,
            options,
            closed: AtomicBool::new(false),
        })
    }

    pub fn get_token(&self, context: &RequestContext) -> Result<AccessToken, Error> {
        self.get_token_with_force(context, false)
    }

    pub fn get_token_with_force(
        &self,
        context: &RequestContext,
        force_check: bool,
    ) -> Result<AccessToken, Error> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::CredentialClosed);
        }
        if let Some(rule) = self.options.audience_rule() {
            rule.check(context)?;
        }
        self.guard.get(Some(context), force_check)
    }

    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.guard.clear();
    }
}
