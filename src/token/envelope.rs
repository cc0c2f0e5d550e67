use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::errors::Error;

/// Serializable snapshot used by contract tests and raw-supplier adapters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenSnapshot {
    pub value: String,
    pub expires_at: u64,
}

/// A bearer token plus the absolute instant it stops being acceptable.
///
/// The token value is zeroed when the last copy is dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AccessToken {
    token: String,
    #[zeroize(skip)]
    expires_at: SystemTime,
}

impl AccessToken {
    pub fn new(token: impl Into<String>, expires_at: SystemTime) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    /// Raw value suitable for Authorization headers.
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn expires_at(&self) -> SystemTime {
        self.expires_at
    }

    pub fn is_expired(&self, now: SystemTime) -> bool {
        now >= self.expires_at
    }

    /// Time until expiry relative to the provided instant, if any is left.
    pub fn remaining(&self, now: SystemTime) -> Option<Duration> {
        self.expires_at.duration_since(now).ok()
    }

    pub fn from_snapshot(snapshot: &TokenSnapshot) -> Result<Self, Error> {
        let secs = i64::try_from(snapshot.expires_at)
            .map_err(|_| Error::InvalidArgument("expiry does not fit a timestamp".into()))?;
        Ok(Self::new(snapshot.value.clone(), timestamp_from_epoch_secs(secs)?))
    }

    pub fn to_snapshot(&self) -> TokenSnapshot {
        TokenSnapshot {
            value: self.token.clone(),
            expires_at: secs_since_epoch(self.expires_at),
        }
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Deserialize)]
struct RawClaims {
    exp: i64,
}

/// Parse a raw JWT-style bearer string, reading the unverified `exp` claim
/// for the expiry. Signature verification is the issuer's business, not ours.
pub fn parse_raw_token(raw: &str) -> Result<AccessToken, Error> {
    let mut parts = raw.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(Error::InvalidArgument(
            "raw token is not a three-part JWT".into(),
        ));
    };
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|err| Error::InvalidArgument(format!("token payload is not base64url: {err}")))?;
    let claims: RawClaims = serde_json::from_slice(&bytes)?;
    Ok(AccessToken::new(
        raw.to_string(),
        timestamp_from_epoch_secs(claims.exp)?,
    ))
}

fn timestamp_from_epoch_secs(secs: i64) -> Result<SystemTime, Error> {
    let timestamp = jiff::Timestamp::from_second(secs)
        .map_err(|err| Error::InvalidArgument(format!("expiry out of range: {err}")))?;
    Ok(SystemTime::from(timestamp))
}

pub(crate) fn secs_since_epoch(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_secs()
}
