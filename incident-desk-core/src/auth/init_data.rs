//! Parsing and canonicalisation of signed mini-app payloads (`initData`)
//!
//! The blob is a query string. `hash` carries the claimed signature, every
//! other pair is part of the signed message, rendered as `key=value` lines
//! in byte-wise key order.

use std::borrow::Cow;
use std::collections::BTreeMap;

use crate::auth::error::AuthError;
use crate::auth::hasher::{compute_signature, derive_signing_key, SigningKeyVariant};

/// Reserved key holding the claimed signature
pub const HASH_KEY: &str = "hash";
/// Key holding the JSON-encoded identity
pub const USER_KEY: &str = "user";
/// Key holding the issue time in Unix seconds
pub const AUTH_DATE_KEY: &str = "auth_date";

/// A parsed payload: signed fields plus the claimed signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitData {
    fields: BTreeMap<String, String>,
    hash: Option<String>,
}

impl InitData {
    /// Parse a query-string-encoded blob
    ///
    /// Keys and values are form-decoded (`+` is a space). Empty segments are
    /// skipped; a segment without `=`, an empty key, undecodable text or a
    /// repeated key makes the blob malformed.
    pub fn parse(raw: &str) -> Result<Self, AuthError> {
        let mut fields = BTreeMap::new();
        let mut hash = None;

        for segment in raw.split('&') {
            if segment.is_empty() {
                continue;
            }

            let Some((raw_key, raw_value)) = segment.split_once('=') else {
                return Err(AuthError::malformed("pair without '='"));
            };

            let key = decode_component(raw_key)?;
            let value = decode_component(raw_value)?;

            if key.is_empty() {
                return Err(AuthError::malformed("empty key"));
            }

            if key == HASH_KEY {
                if hash.replace(value).is_some() {
                    return Err(AuthError::malformed("repeated hash"));
                }
                continue;
            }

            if fields.contains_key(&key) {
                return Err(AuthError::malformed(format!("repeated key '{key}'")));
            }
            fields.insert(key, value);
        }

        Ok(Self { fields, hash })
    }

    /// The claimed signature, if present
    pub fn hash(&self) -> Option<&str> {
        self.hash.as_deref()
    }

    /// Look up a signed field
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Signed fields in canonical (byte-wise sorted) order
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Render the signed fields as the newline-joined canonical string
    pub fn data_check_string(&self) -> String {
        canonical_string(self.fields())
    }
}

/// Render pairs as `key=value` lines in byte-wise key order
pub fn canonical_string<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    let mut pairs: Vec<(&str, &str)> = pairs.into_iter().collect();
    pairs.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

    pairs
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Produce a complete signed blob for the given pairs
///
/// This is what the issuing platform does; the server only needs it for
/// tests and local tooling.
pub fn sign_init_data<'a>(
    pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
    secret: &str,
    variant: SigningKeyVariant,
) -> String {
    let pairs: Vec<(&str, &str)> = pairs.into_iter().filter(|(k, _)| *k != HASH_KEY).collect();
    let key = derive_signing_key(secret, variant);
    let signature = compute_signature(&canonical_string(pairs.iter().copied()), &key);

    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .chain(std::iter::once(format!("{HASH_KEY}={signature}")))
        .collect::<Vec<_>>()
        .join("&")
}

fn decode_component(raw: &str) -> Result<String, AuthError> {
    let spaced: Cow<'_, str> = if raw.contains('+') {
        Cow::Owned(raw.replace('+', " "))
    } else {
        Cow::Borrowed(raw)
    };

    urlencoding::decode(&spaced)
        .map(Cow::into_owned)
        .map_err(|_| AuthError::malformed("percent-encoding is not UTF-8"))
}
