//! Wires a fake token issuer into the credential, lets the proactive
//! refresher warm the cache, and runs a token-consuming operation under the
//! retry policy.
//!
//! Run with: `cargo run --example proactive_refresh`

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};

use token_warden::{
    AccessToken, CredentialOptions, Error, FetchFn, OperationKind, RequestContext, RetryOptions,
    TokenCredential,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt().init();

    let issued = Arc::new(AtomicUsize::new(0));
    let counter = issued.clone();
    let fetcher = FetchFn(move |ctx: RequestContext| {
        let counter = counter.clone();
        async move {
            // stand-in for a real token endpoint
            tokio::time::sleep(Duration::from_millis(25)).await;
            let ordinal = counter.fetch_add(1, Ordering::SeqCst) + 1;
            println!("issued token #{ordinal} for scopes {:?}", ctx.scopes());
            Ok(AccessToken::new(
                format!("demo-token-{ordinal}"),
                SystemTime::now() + Duration::from_secs(900),
            ))
        }
    });

    let credential = TokenCredential::new(
        CredentialOptions::new()
            .with_proactive_refresh(true)
            .with_initial_context(RequestContext::new(["demo.read"]))
            .with_retry(RetryOptions::new().with_delay(Duration::from_millis(200))),
        fetcher,
    )?;

    // let the background refresher populate the cache
    tokio::time::sleep(Duration::from_millis(100)).await;

    let context = RequestContext::new(["demo.read"]);
    let token = credential.get_token(&context).await?;
    println!("foreground call served instantly: {}", token.token());

    let (body, outcome) = credential
        .run_with_retry(OperationKind::Operation("call_api"), |attempt| async move {
            if attempt == 1 {
                Err(Error::refresh_transient("simulated transient failure"))
            } else {
                Ok("api response".to_string())
            }
        })
        .await?;
    println!("operation returned {body:?} after {} attempts", outcome.attempts);

    credential.close();
    println!("credential closed; fetches issued: {}", issued.load(Ordering::SeqCst));
    Ok(())
}
