use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use token_warden::{
    CredentialOptions, Error, RefreshWindow, RequestContext, RetryOptions, TokenCredential,
};

use crate::common::{counting_fetcher, failing_fetcher, jwt_expiring_in};

fn wide_window() -> RefreshWindow {
    // 601s of remaining ttl sits inside a 700s look-ahead window
    RefreshWindow::new(Duration::from_secs(700), Duration::from_secs(30)).expect("window")
}

#[tokio::test(flavor = "current_thread")]
async fn failed_refresh_falls_back_to_valid_cached_token() {
    let calls = Arc::new(AtomicUsize::new(0));
    let raw = jwt_expiring_in(601);
    let credential = TokenCredential::new(
        CredentialOptions::new()
            .with_initial_token(raw.clone())
            .with_initial_context(RequestContext::new(["scope.read"]))
            .with_window(wide_window()),
        failing_fetcher(Duration::ZERO, calls.clone()),
    )
    .expect("credential");

    let token = credential
        .get_token(&RequestContext::new(["scope.read"]))
        .await
        .expect("cached token still valid");
    assert_eq!(token.token(), raw);
    assert_eq!(calls.load(Ordering::SeqCst), 1, "fetch attempted once");
}

#[tokio::test(flavor = "current_thread")]
async fn failed_refresh_leaves_the_next_call_eligible() {
    let calls = Arc::new(AtomicUsize::new(0));
    let credential = TokenCredential::new(
        CredentialOptions::new()
            .with_initial_token(jwt_expiring_in(601))
            .with_initial_context(RequestContext::new(["scope.read"]))
            .with_window(wide_window()),
        failing_fetcher(Duration::ZERO, calls.clone()),
    )
    .expect("credential");

    let context = RequestContext::new(["scope.read"]);
    credential.get_token(&context).await.expect("fallback");
    // the failure reset the cooldown stamp, so this call retries immediately
    credential.get_token(&context).await.expect("fallback again");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "current_thread")]
async fn overlong_fetch_is_cut_off_by_try_timeout() {
    tokio::time::pause();
    let calls = Arc::new(AtomicUsize::new(0));
    let credential = TokenCredential::new(
        CredentialOptions::new()
            .with_retry(RetryOptions::new().with_try_timeout(Duration::from_millis(50))),
        counting_fetcher(Duration::from_secs(3600), Duration::from_secs(10), calls.clone()),
    )
    .expect("credential");

    let err = credential
        .get_token(&RequestContext::new(["scope.read"]))
        .await
        .expect_err("fetch exceeds try_timeout");
    assert!(matches!(err, Error::Timeout(_)));
    // the attempt was cancelled before the fetcher could finish
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "current_thread")]
async fn expired_cache_surfaces_the_fetch_error() {
    let calls = Arc::new(AtomicUsize::new(0));
    let credential = TokenCredential::new(
        CredentialOptions::new()
            .with_initial_token(jwt_expiring_in(-5))
            .with_initial_context(RequestContext::new(["scope.read"])),
        failing_fetcher(Duration::ZERO, calls.clone()),
    )
    .expect("credential");

    let err = credential
        .get_token(&RequestContext::new(["scope.read"]))
        .await
        .expect_err("expired token is no fallback");
    assert!(matches!(err, Error::RefreshFailed { .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
