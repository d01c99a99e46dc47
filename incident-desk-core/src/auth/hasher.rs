//! Signing key derivation and HMAC-SHA256 signatures for mini-app payloads
//!
//! The issuing bot platform signs the canonical payload string with a key
//! derived from the bot token. Two derivations have been seen in the wild,
//! so the variant is a configuration choice.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

/// Label used as the HMAC key when deriving the signing key (variant A)
pub const WEB_APP_DATA_LABEL: &[u8] = b"WebAppData";

/// How the signing key is derived from the bot token
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SigningKeyVariant {
    /// HMAC-SHA256 keyed with `"WebAppData"` over the bot token
    #[default]
    WebAppData,
    /// Plain SHA-256 digest of the bot token
    Sha256,
}

impl fmt::Display for SigningKeyVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SigningKeyVariant::WebAppData => f.write_str("web_app_data"),
            SigningKeyVariant::Sha256 => f.write_str("sha256"),
        }
    }
}

fn keyed_mac(key: &[u8]) -> HmacSha256 {
    // HMAC takes keys of any length, only fixed-size MACs reject a slice
    #[allow(clippy::expect_used)]
    HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length")
}

/// Derive the 32-byte signing key from the shared secret
pub fn derive_signing_key(secret: &str, variant: SigningKeyVariant) -> [u8; 32] {
    match variant {
        SigningKeyVariant::WebAppData => {
            let mut mac = keyed_mac(WEB_APP_DATA_LABEL);
            mac.update(secret.as_bytes());
            mac.finalize().into_bytes().into()
        }
        SigningKeyVariant::Sha256 => Sha256::digest(secret.as_bytes()).into(),
    }
}

/// Compute the lowercase hex HMAC-SHA256 of a canonical string
pub fn compute_signature(canonical: &str, signing_key: &[u8; 32]) -> String {
    let mut mac = keyed_mac(signing_key);
    mac.update(canonical.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Check a claimed hex signature against a canonical string
///
/// The comparison runs in constant time. A claim that is not valid hex is
/// simply a mismatch.
pub fn verify_signature(canonical: &str, claimed_hex: &str, signing_key: &[u8; 32]) -> bool {
    let Ok(claimed) = hex::decode(claimed_hex) else {
        return false;
    };

    let mut mac = keyed_mac(signing_key);
    mac.update(canonical.as_bytes());
    mac.verify_slice(&claimed).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CANONICAL: &str = "id=123\nuser={\"id\":42,\"first_name\":\"Ann\"}";

    #[test]
    fn test_variant_a_known_digest() {
        let key = derive_signing_key("TESTSECRET", SigningKeyVariant::WebAppData);
        assert_eq!(
            compute_signature(CANONICAL, &key),
            "c1fb1ce0fd252cf38c3c150066eea910751144c9a128f464f73bc6fe1a3d240c"
        );
    }

    #[test]
    fn test_variant_b_known_digest() {
        let key = derive_signing_key("TESTSECRET", SigningKeyVariant::Sha256);
        assert_eq!(
            compute_signature(CANONICAL, &key),
            "fb8ceff1e007808b1fb2c08958b7b56ea2d89fee1e7187c5bcbd04ba09fd80c3"
        );
    }

    #[test]
    fn test_variants_derive_different_keys() {
        let a = derive_signing_key("TESTSECRET", SigningKeyVariant::WebAppData);
        let b = derive_signing_key("TESTSECRET", SigningKeyVariant::Sha256);
        assert_ne!(a, b);
    }

    #[test]
    fn test_verify_signature() {
        let key = derive_signing_key("TESTSECRET", SigningKeyVariant::WebAppData);
        let signature = compute_signature(CANONICAL, &key);

        assert!(verify_signature(CANONICAL, &signature, &key));
        assert!(verify_signature(CANONICAL, &signature.to_uppercase(), &key));
        assert!(!verify_signature("id=124", &signature, &key));
        assert!(!verify_signature(CANONICAL, "not-hex", &key));
        assert!(!verify_signature(CANONICAL, &signature[..62], &key));
    }

    #[test]
    fn test_variant_serde_names() {
        let parsed: SigningKeyVariant = serde_yaml_ng::from_str("sha256").unwrap();
        assert_eq!(parsed, SigningKeyVariant::Sha256);
        let parsed: SigningKeyVariant = serde_yaml_ng::from_str("web_app_data").unwrap();
        assert_eq!(parsed, SigningKeyVariant::WebAppData);
    }
}
