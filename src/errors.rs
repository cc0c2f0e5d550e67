use std::fmt;
use std::time::Duration;

/// Classification applied to a failed refresh attempt. `Transient` and
/// `ServerBusy` failures are eligible for retry; `Permanent` failures stop
/// the retry loop regardless of remaining attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    Transient,
    ServerBusy,
    Permanent,
}

#[derive(Debug, Clone)]
pub enum Error {
    InvalidArgument(String),
    RefreshFailed { message: String, class: FailureClass },
    CredentialClosed,
    Timeout(Duration),
}

impl Error {
    pub fn refresh_transient(message: impl Into<String>) -> Self {
        Error::RefreshFailed {
            message: message.into(),
            class: FailureClass::Transient,
        }
    }

    pub fn refresh_permanent(message: impl Into<String>) -> Self {
        Error::RefreshFailed {
            message: message.into(),
            class: FailureClass::Permanent,
        }
    }

    pub fn server_busy(message: impl Into<String>) -> Self {
        Error::RefreshFailed {
            message: message.into(),
            class: FailureClass::ServerBusy,
        }
    }

    /// Whether a retry loop may attempt the operation again.
    pub fn retriable(&self) -> bool {
        matches!(
            self,
            Error::Timeout(_)
                | Error::RefreshFailed {
                    class: FailureClass::Transient | FailureClass::ServerBusy,
                    ..
                }
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArgument(message) => write!(f, "invalid argument: {message}"),
            Error::RefreshFailed { message, class } => {
                write!(f, "token refresh failed ({class:?}): {message}")
            }
            Error::CredentialClosed => write!(f, "credential has been closed"),
            Error::Timeout(limit) => {
                write!(f, "attempt exceeded the configured timeout of {limit:?}")
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidArgument(format!("malformed token payload: {err}"))
    }
}
