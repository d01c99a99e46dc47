//! Inbound request authentication for mini-app payloads
//!
//! Every attributed request carries `initData`, a query string signed by the
//! bot platform with a key derived from the bot token. The verifier checks
//! that signature and yields the caller's [`Identity`]; the [`AdminSet`]
//! then decides whether that caller may use the administrative endpoints.
//!
//! Verification is a pure function of the payload and the shared secret:
//! no sessions, no nonce tracking, no caching between requests.

pub mod admin;
pub mod error;
pub mod hasher;
pub mod identity;
pub mod init_data;
pub mod verifier;

pub use admin::AdminSet;
pub use error::AuthError;
pub use hasher::SigningKeyVariant;
pub use identity::Identity;
pub use init_data::{sign_init_data, InitData};
pub use verifier::InitDataVerifier;
