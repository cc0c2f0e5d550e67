use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

/// Build an unsigned JWT-shaped token whose payload carries the given
/// epoch-seconds expiry.
pub fn jwt_expiring_at(epoch_secs: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{epoch_secs}}}"#));
    format!("{header}.{payload}.sig")
}
