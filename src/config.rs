//! Construction-time options for retry behaviour, refresh timing, and the
//! credential facades.

use std::time::Duration;

use crate::context::{AudienceRule, RequestContext};
use crate::errors::Error;

/// Extra wait applied on top of the computed backoff when the service
/// signalled that it is busy.
pub(crate) const SERVER_BUSY_EXTRA_DELAY: Duration = Duration::from_secs(4);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RetryMode {
    Fixed,
    Exponential,
}

/// Retry knobs shared by the refresh path and the surrounding operation loop.
///
/// A zero `delay` or `max_delay` is the explicit "do not retry" sentinel; the
/// policy returns no delay for any attempt when either is zero.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RetryOptions {
    max_retries: u32,
    delay: Duration,
    max_delay: Duration,
    try_timeout: Duration,
    mode: RetryMode,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_millis(800),
            max_delay: Duration::from_secs(60),
            try_timeout: Duration::from_secs(60),
            mode: RetryMode::Exponential,
        }
    }
}

impl RetryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_try_timeout(mut self, try_timeout: Duration) -> Self {
        self.try_timeout = try_timeout;
        self
    }

    pub fn with_mode(mut self, mode: RetryMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn try_timeout(&self) -> Duration {
        self.try_timeout
    }

    pub fn mode(&self) -> RetryMode {
        self.mode
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.try_timeout.is_zero() {
            return Err(Error::InvalidArgument(
                "try_timeout must be a positive duration".into(),
            ));
        }
        Ok(())
    }
}

/// Proactive refresh timing: how far ahead of expiry a refresh becomes due,
/// and the minimum interval between refresh attempts once one has succeeded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefreshWindow {
    offset: Duration,
    cooldown: Duration,
}

impl Default for RefreshWindow {
    fn default() -> Self {
        Self {
            offset: Duration::from_secs(300),
            cooldown: Duration::from_secs(30),
        }
    }
}

impl RefreshWindow {
    pub fn new(offset: Duration, cooldown: Duration) -> Result<Self, Error> {
        if offset.is_zero() {
            return Err(Error::InvalidArgument(
                "refresh offset must be > 0".into(),
            ));
        }
        if cooldown.is_zero() {
            return Err(Error::InvalidArgument(
                "refresh cooldown must be > 0".into(),
            ));
        }
        Ok(Self { offset, cooldown })
    }

    pub fn offset(&self) -> Duration {
        self.offset
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }
}

/// Everything a credential facade needs beyond the fetch callback itself.
#[derive(Clone, Debug, Default)]
pub struct CredentialOptions {
    initial_token: Option<String>,
    initial_context: Option<RequestContext>,
    proactive_refresh: bool,
    retry: RetryOptions,
    window: RefreshWindow,
    audiences: Option<AudienceRule>,
}

impl CredentialOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the cache with an already-issued raw token. The embedded expiry
    /// claim is parsed eagerly at construction; malformed input fails there.
    pub fn with_initial_token(mut self, raw: impl Into<String>) -> Self {
        self.initial_token = Some(raw.into());
        self
    }

    pub fn with_initial_context(mut self, context: RequestContext) -> Self {
        self.initial_context = Some(context);
        self
    }

    pub fn with_proactive_refresh(mut self, proactive: bool) -> Self {
        self.proactive_refresh = proactive;
        self
    }

    pub fn with_retry(mut self, retry: RetryOptions) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_window(mut self, window: RefreshWindow) -> Self {
        self.window = window;
        self
    }

    pub fn with_audience_rule(mut self, rule: AudienceRule) -> Self {
        self.audiences = Some(rule);
        self
    }

    pub fn initial_token(&self) -> Option<&str> {
        self.initial_token.as_deref()
    }

    pub fn initial_context(&self) -> Option<&RequestContext> {
        self.initial_context.as_ref()
    }

    pub fn proactive_refresh(&self) -> bool {
        self.proactive_refresh
    }

    pub fn retry(&self) -> &RetryOptions {
        &self.retry
    }

    pub fn window(&self) -> &RefreshWindow {
        &self.window
    }

    pub fn audience_rule(&self) -> Option<&AudienceRule> {
        self.audiences.as_ref()
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        self.retry.validate()?;
        if let (Some(rule), Some(context)) = (&self.audiences, &self.initial_context) {
            rule.check(context)?;
        }
        Ok(())
    }
}
