//! Request authentication
//!
//! Handlers call these before doing anything else, so a rejected request
//! has no side effects.

use axum::extract::rejection::QueryRejection;
use axum::extract::Query;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::error::ApiError;
use super::AppState;
use crate::auth::Identity;

/// Name of the field or query parameter carrying the signed payload
pub const INIT_DATA_FIELD: &str = "initData";

/// `?initData=...`
#[derive(Debug, Default, Deserialize)]
pub struct InitDataQuery {
    #[serde(rename = "initData", default)]
    pub init_data: Option<String>,
}

/// `initData` from the query string; a query that does not parse counts as absent
pub fn query_init_data(query: Result<Query<InitDataQuery>, QueryRejection>) -> Option<String> {
    match query {
        Ok(Query(query)) => query.init_data,
        Err(_) => {
            debug!(target: "security", "query string rejected, ignoring it for authentication");
            None
        }
    }
}

/// Pull `initData` out of a JSON object body
pub fn init_data_from_json(body: &Value) -> Option<String> {
    body.get(INIT_DATA_FIELD)
        .and_then(Value::as_str)
        .map(str::to_string)
}

impl AppState {
    /// Verify the payload and return the identity it carries
    pub fn authenticate(&self, init_data: Option<&str>) -> Result<Identity, ApiError> {
        let Some(raw) = init_data.filter(|raw| !raw.is_empty()) else {
            debug!(target: "security", "request carries no init data");
            return Err(ApiError::Unauthenticated);
        };
        self.verifier
            .authenticate(raw)
            .ok_or(ApiError::Unauthenticated)
    }

    /// Verify the payload and require an administrator
    pub fn authorize_admin(&self, init_data: Option<&str>) -> Result<Identity, ApiError> {
        let identity = self.authenticate(init_data)?;
        if self.admins.is_admin(&identity) {
            Ok(identity)
        } else {
            warn!(target: "security", user_id = identity.id, "admin access denied");
            Err(ApiError::Forbidden)
        }
    }
}
