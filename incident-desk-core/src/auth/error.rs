//! Authentication error types
//!
//! Every variant means the same thing to a caller: the request is not
//! authenticated. The variants exist so the verifier can log why.

use thiserror::Error;

/// Reasons a signed payload was rejected
#[derive(Error, Debug)]
pub enum AuthError {
    /// The blob could not be parsed as key/value pairs
    #[error("malformed init data: {reason}")]
    Malformed { reason: String },

    /// No `hash` key was present
    #[error("init data carries no hash")]
    MissingHash,

    /// The computed digest did not match the claimed one
    #[error("init data signature mismatch")]
    SignatureMismatch,

    /// The signature matched but there is no `user` key
    #[error("init data carries no user")]
    MissingUser,

    /// The signature matched but `user` is not a usable identity
    #[error("init data user is not valid JSON")]
    InvalidUser {
        #[source]
        source: serde_json::Error,
    },

    /// Freshness is enforced and `auth_date` is absent or unreadable
    #[error("init data carries no usable auth_date")]
    MissingAuthDate,

    /// Freshness is enforced and the payload is too old
    #[error("init data expired ({age_seconds}s old, limit {max_age_seconds}s)")]
    Expired { age_seconds: i64, max_age_seconds: u64 },

    /// Freshness is enforced and `auth_date` lies too far ahead of our clock
    #[error("init data issued {ahead_seconds}s in the future")]
    IssuedInFuture { ahead_seconds: i64 },
}

impl AuthError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        AuthError::Malformed {
            reason: reason.into(),
        }
    }

    /// Log a rejection. Forgeries are loud, sloppy clients are quiet.
    pub fn log_rejection(&self) {
        match self {
            AuthError::SignatureMismatch => {
                tracing::warn!(target: "security", "rejected init data: {}", self);
            }
            _ => {
                tracing::debug!(target: "security", "rejected init data: {}", self);
            }
        }
    }
}
