use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

use token_warden::{AccessToken, Error, FetchFn, FetchToken, RequestContext};

/// Unsigned JWT-shaped token expiring the given number of seconds from now
/// (negative values land in the past).
pub fn jwt_expiring_in(secs_from_now: i64) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock after epoch")
        .as_secs() as i64;
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{}}}"#, now + secs_from_now));
    format!("{header}.{payload}.sig")
}

/// Succeeds with `token-N` (N = call ordinal) valid for `ttl`, taking
/// `latency` first so concurrent callers can pile up behind one fetch.
pub fn counting_fetcher(
    ttl: Duration,
    latency: Duration,
    calls: Arc<AtomicUsize>,
) -> impl FetchToken + 'static {
    FetchFn(move |_ctx: RequestContext| {
        let calls = calls.clone();
        async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            let ordinal = calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok::<AccessToken, Error>(AccessToken::new(
                format!("token-{ordinal}"),
                SystemTime::now() + ttl,
            ))
        }
    })
}

/// Fails every call with a transient error after `latency`.
pub fn failing_fetcher(latency: Duration, calls: Arc<AtomicUsize>) -> impl FetchToken + 'static {
    FetchFn(move |_ctx: RequestContext| {
        let calls = calls.clone();
        async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<AccessToken, Error>(Error::refresh_transient("upstream unavailable"))
        }
    })
}
