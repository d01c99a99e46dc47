//! Payload verification - the check in front of every attributed request
//!
//! The verifier holds only the derived signing key. It is pure, cheap to
//! clone, and shared by every request handler without locking.

use std::fmt;
use std::time::Duration;

use crate::auth::error::AuthError;
use crate::auth::hasher::{derive_signing_key, verify_signature, SigningKeyVariant};
use crate::auth::identity::Identity;
use crate::auth::init_data::{InitData, AUTH_DATE_KEY, USER_KEY};
use tracing::trace;

/// Verifies signed `initData` blobs and extracts the caller identity
#[derive(Clone)]
pub struct InitDataVerifier {
    signing_key: [u8; 32],
    variant: SigningKeyVariant,
    max_age: Option<Duration>,
}

impl fmt::Debug for InitDataVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitDataVerifier")
            .field("signing_key", &"[REDACTED]")
            .field("variant", &self.variant)
            .field("max_age", &self.max_age)
            .finish()
    }
}

impl InitDataVerifier {
    /// Create a verifier for the given bot token and key derivation
    pub fn new(secret: &str, variant: SigningKeyVariant) -> Self {
        Self {
            signing_key: derive_signing_key(secret, variant),
            variant,
            max_age: None,
        }
    }

    /// Reject payloads whose `auth_date` is older than `max_age`
    ///
    /// The issuing platform does not require this; without it a captured
    /// blob stays valid forever.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn variant(&self) -> SigningKeyVariant {
        self.variant
    }

    /// Verify a raw blob against the current time
    pub fn verify(&self, raw: &str) -> Result<Identity, AuthError> {
        self.verify_at(raw, chrono::Utc::now().timestamp())
    }

    /// Verify a raw blob as of `now` (Unix seconds)
    pub fn verify_at(&self, raw: &str, now: i64) -> Result<Identity, AuthError> {
        let data = InitData::parse(raw)?;
        let claimed = data.hash().ok_or(AuthError::MissingHash)?;

        let canonical = data.data_check_string();
        if !verify_signature(&canonical, claimed, &self.signing_key) {
            return Err(AuthError::SignatureMismatch);
        }

        if let Some(max_age) = self.max_age {
            check_freshness(&data, now, max_age)?;
        }

        let user = data.get(USER_KEY).ok_or(AuthError::MissingUser)?;
        let identity: Identity =
            serde_json::from_str(user).map_err(|source| AuthError::InvalidUser { source })?;

        trace!(user_id = identity.id, "init data verified");
        Ok(identity)
    }

    /// Verify and collapse every failure into `None`, logging the reason
    pub fn authenticate(&self, raw: &str) -> Option<Identity> {
        match self.verify(raw) {
            Ok(identity) => Some(identity),
            Err(e) => {
                e.log_rejection();
                None
            }
        }
    }
}

/// How far ahead of our clock an `auth_date` may be
pub const CLOCK_SKEW_SECONDS: i64 = 60;

fn check_freshness(data: &InitData, now: i64, max_age: Duration) -> Result<(), AuthError> {
    let issued: i64 = data
        .get(AUTH_DATE_KEY)
        .and_then(|value| value.parse().ok())
        .ok_or(AuthError::MissingAuthDate)?;

    let age_seconds = now.saturating_sub(issued);
    if age_seconds < -CLOCK_SKEW_SECONDS {
        return Err(AuthError::IssuedInFuture {
            ahead_seconds: age_seconds.saturating_neg(),
        });
    }

    let max_age_seconds = max_age.as_secs();
    if age_seconds > i64::try_from(max_age_seconds).unwrap_or(i64::MAX) {
        return Err(AuthError::Expired {
            age_seconds,
            max_age_seconds,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::init_data::sign_init_data;
    use pretty_assertions::assert_eq;

    const SECRET: &str = "TESTSECRET";
    const USER: &str = r#"{"id":42,"first_name":"Ann"}"#;
    const USER_ENCODED: &str = "%7B%22id%22%3A42%2C%22first_name%22%3A%22Ann%22%7D";
    const VARIANT_A_HASH: &str = "c1fb1ce0fd252cf38c3c150066eea910751144c9a128f464f73bc6fe1a3d240c";
    const VARIANT_B_HASH: &str = "fb8ceff1e007808b1fb2c08958b7b56ea2d89fee1e7187c5bcbd04ba09fd80c3";

    fn verifier() -> InitDataVerifier {
        InitDataVerifier::new(SECRET, SigningKeyVariant::WebAppData)
    }

    fn ann() -> Identity {
        Identity {
            first_name: Some("Ann".to_string()),
            ..Identity::new(42)
        }
    }

    #[test]
    fn test_known_vector_variant_a() {
        let raw = format!("id=123&user={USER_ENCODED}&hash={VARIANT_A_HASH}");
        assert_eq!(verifier().verify(&raw).unwrap(), ann());
    }

    #[test]
    fn test_known_vector_variant_b() {
        let raw = format!("id=123&user={USER_ENCODED}&hash={VARIANT_B_HASH}");
        let verifier = InitDataVerifier::new(SECRET, SigningKeyVariant::Sha256);
        assert_eq!(verifier.verify(&raw).unwrap(), ann());

        // Each variant rejects the other's digest
        let raw = format!("id=123&user={USER_ENCODED}&hash={VARIANT_A_HASH}");
        assert!(matches!(
            verifier.verify(&raw),
            Err(AuthError::SignatureMismatch)
        ));
    }

    #[test]
    fn test_flipping_any_hash_character_rejects() {
        for i in 0..VARIANT_A_HASH.len() {
            let mut forged: Vec<char> = VARIANT_A_HASH.chars().collect();
            forged[i] = if forged[i] == '0' { '1' } else { '0' };
            let forged: String = forged.into_iter().collect();

            let raw = format!("id=123&user={USER_ENCODED}&hash={forged}");
            assert!(
                matches!(verifier().verify(&raw), Err(AuthError::SignatureMismatch)),
                "flipped position {i} was accepted"
            );
        }
    }

    #[test]
    fn test_altering_signed_fields_rejects() {
        let tampered = [
            format!("id=124&user={USER_ENCODED}&hash={VARIANT_A_HASH}"),
            format!("id=123&user={}&hash={VARIANT_A_HASH}", USER_ENCODED.replace("42", "43")),
            format!("id=123&user={}&hash={VARIANT_A_HASH}", USER_ENCODED.replace("Ann", "Anne")),
            format!("id=123&user={USER_ENCODED}&extra=1&hash={VARIANT_A_HASH}"),
            format!("user={USER_ENCODED}&hash={VARIANT_A_HASH}"),
        ];

        for raw in tampered {
            assert!(
                matches!(verifier().verify(&raw), Err(AuthError::SignatureMismatch)),
                "tampered payload accepted: {raw}"
            );
        }
    }

    #[test]
    fn test_key_order_does_not_matter() {
        let raw = format!("hash={VARIANT_A_HASH}&user={USER_ENCODED}&id=123");
        assert_eq!(verifier().verify(&raw).unwrap(), ann());
    }

    #[test]
    fn test_missing_hash_rejects() {
        let raw = format!("id=123&user={USER_ENCODED}");
        assert!(matches!(verifier().verify(&raw), Err(AuthError::MissingHash)));
    }

    #[test]
    fn test_wrong_secret_rejects() {
        let raw = format!("id=123&user={USER_ENCODED}&hash={VARIANT_A_HASH}");
        let other = InitDataVerifier::new("OTHERSECRET", SigningKeyVariant::WebAppData);
        assert!(matches!(other.verify(&raw), Err(AuthError::SignatureMismatch)));
    }

    #[test]
    fn test_truncated_user_rejects_despite_valid_signature() {
        // Digest computed over the literal truncated string
        let raw = "id=123&user=%7B%22id%22%3A42%2C%22first_na\
                   &hash=be2fb9e1139ff6660da216d0bf193e29c259daa54c9224a5c958eadf5aa58466";
        assert!(matches!(
            verifier().verify(raw),
            Err(AuthError::InvalidUser { .. })
        ));
    }

    #[test]
    fn test_signed_payload_without_user_rejects() {
        let raw = sign_init_data([("id", "123")], SECRET, SigningKeyVariant::WebAppData);
        assert!(matches!(verifier().verify(&raw), Err(AuthError::MissingUser)));
    }

    #[test]
    fn test_user_without_integer_id_rejects() {
        let raw = sign_init_data(
            [("user", r#"{"first_name":"Ann"}"#)],
            SECRET,
            SigningKeyVariant::WebAppData,
        );
        assert!(matches!(
            verifier().verify(&raw),
            Err(AuthError::InvalidUser { .. })
        ));
    }

    #[test]
    fn test_malformed_blob_rejects() {
        for raw in ["", "garbage", "user=%FF&hash=00", "a=1&a=2&hash=00"] {
            assert!(verifier().verify(raw).is_err(), "accepted {raw:?}");
            assert!(verifier().authenticate(raw).is_none());
        }
    }

    #[test]
    fn test_identity_returned_unchanged() {
        let user = r#"{"id":7,"first_name":" Bo ","last_name":"Lind","username":"bolind"}"#;
        let raw = sign_init_data(
            [("auth_date", "1700000000"), ("query_id", "AAE"), ("user", user)],
            SECRET,
            SigningKeyVariant::WebAppData,
        );

        let identity = verifier().verify(&raw).unwrap();
        assert_eq!(
            identity,
            Identity {
                id: 7,
                first_name: Some(" Bo ".to_string()),
                last_name: Some("Lind".to_string()),
                username: Some("bolind".to_string()),
            }
        );
    }

    #[test]
    fn test_max_age_is_opt_in() {
        let raw = sign_init_data(
            [("auth_date", "1000"), ("user", USER)],
            SECRET,
            SigningKeyVariant::WebAppData,
        );

        assert!(verifier().verify_at(&raw, 1_000_000).is_ok());

        let strict = verifier().with_max_age(Duration::from_secs(60));
        assert!(strict.verify_at(&raw, 1060).is_ok());
        assert!(matches!(
            strict.verify_at(&raw, 1061),
            Err(AuthError::Expired {
                age_seconds: 61,
                max_age_seconds: 60
            })
        ));
    }

    #[test]
    fn test_max_age_extremes_do_not_overflow() {
        let raw = sign_init_data(
            [("auth_date", "1000"), ("user", USER)],
            SECRET,
            SigningKeyVariant::WebAppData,
        );
        let unlimited = verifier().with_max_age(Duration::from_secs(u64::MAX));
        assert!(unlimited.verify_at(&raw, i64::MAX).is_ok());

        let earliest = i64::MIN.to_string();
        let ancient = sign_init_data(
            [("auth_date", earliest.as_str()), ("user", USER)],
            SECRET,
            SigningKeyVariant::WebAppData,
        );
        let strict = verifier().with_max_age(Duration::from_secs(60));
        assert!(matches!(
            strict.verify_at(&ancient, 1000),
            Err(AuthError::Expired {
                age_seconds: i64::MAX,
                ..
            })
        ));
    }

    #[test]
    fn test_future_auth_date_beyond_skew_rejects() {
        let raw = sign_init_data(
            [("auth_date", "2000"), ("user", USER)],
            SECRET,
            SigningKeyVariant::WebAppData,
        );
        let strict = verifier().with_max_age(Duration::from_secs(60));

        assert!(strict.verify_at(&raw, 2000 - CLOCK_SKEW_SECONDS).is_ok());
        assert!(matches!(
            strict.verify_at(&raw, 1000),
            Err(AuthError::IssuedInFuture {
                ahead_seconds: 1000
            })
        ));

        // Without a max age the date is not inspected at all
        assert!(verifier().verify_at(&raw, 1000).is_ok());
    }

    #[test]
    fn test_max_age_requires_auth_date() {
        let raw = sign_init_data([("user", USER)], SECRET, SigningKeyVariant::WebAppData);
        let strict = verifier().with_max_age(Duration::from_secs(60));
        assert!(matches!(
            strict.verify_at(&raw, 0),
            Err(AuthError::MissingAuthDate)
        ));
    }

    #[test]
    fn test_debug_redacts_key() {
        let rendered = format!("{:?}", verifier());
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains(SECRET));
    }
}
