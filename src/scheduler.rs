//! Background task that refreshes the cache ahead of expiry so foreground
//! callers rarely pay fetch latency.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use rand::{SeedableRng, rngs::StdRng};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::errors::Error;
use crate::retry::RetryPolicy;
use crate::token::TokenGuard;

pub(crate) struct ProactiveScheduler {
    active: Arc<AtomicBool>,
    stop_tx: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ProactiveScheduler {
    /// Spawn the refresh loop. Must be called from within a Tokio runtime.
    pub fn start(guard: Arc<TokenGuard>, policy: RetryPolicy) -> Self {
        let active = Arc::new(AtomicBool::new(true));
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let flag = Arc::clone(&active);
        let handle = tokio::spawn(async move {
            let mut rng = StdRng::from_entropy();
            let mut failures: u32 = 0;
            loop {
                let wait = next_wait(&guard, &policy, failures, &mut rng);
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = tokio::time::sleep(wait) => {}
                }
                if !flag.load(Ordering::SeqCst) {
                    break;
                }
                match guard.get(None, false).await {
                    Ok(_) => failures = 0,
                    Err(err) => {
                        failures += 1;
                        warn!(error = %err, failures, "token.refresh.proactive_error");
                    }
                }
            }
            debug!("proactive refresh loop exited");
        });
        Self {
            active,
            stop_tx,
            handle: Mutex::new(Some(handle)),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Idempotent. The flag flips before the task is aborted, and every tick
    /// rechecks it before fetching, so no refresh starts after this returns.
    /// The task is never joined, which keeps a stop issued from inside a tick
    /// from deadlocking.
    pub fn stop(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            let _ = self.stop_tx.send(true);
        }
        if let Some(handle) = self.handle.lock().take() {
            handle.abort();
        }
    }
}

/// When the next tick should fire.
///
/// Paced by the cooldown, pulled earlier when the token's expiry demands it,
/// and switched to policy-bounded backoff while fetches are failing.
fn next_wait(guard: &TokenGuard, policy: &RetryPolicy, failures: u32, rng: &mut StdRng) -> Duration {
    if failures > 0 {
        let failure = Error::refresh_transient("proactive refresh failed");
        return policy
            .calculate_delay(&failure, failures, rng)
            .unwrap_or_else(|| guard.window().cooldown());
    }
    let now = SystemTime::now();
    let Some(expires_at) = guard.expires_at() else {
        // nothing cached yet; fetch on the first tick
        return Duration::ZERO;
    };
    let refresh_due = expires_at
        .checked_sub(guard.window().offset())
        .unwrap_or(UNIX_EPOCH);
    match refresh_due.duration_since(now) {
        Ok(until_due) => guard.window().cooldown().min(until_due),
        // already inside the window; pace by the cooldown stamp instead
        Err(_) => guard.next_refresh_in(now),
    }
}
