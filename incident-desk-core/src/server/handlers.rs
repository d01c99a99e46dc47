//! HTTP request handlers

use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::{debug, info};

use super::auth::{init_data_from_json, query_init_data, InitDataQuery, INIT_DATA_FIELD};
use super::error::ApiError;
use super::AppState;
use crate::report::{NewReport, Report, ReportUpdate};
use crate::uploads::PhotoUpload;

/// Multipart field names accepted for photos
const PHOTO_FIELDS: [&str; 2] = ["photos", "photo"];

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn not_found() -> ApiError {
    ApiError::NotFound("not found".to_string())
}

/// A submission, fully buffered before anything is verified
#[derive(Debug, Default)]
struct SubmissionForm {
    init_data: Option<String>,
    report: NewReport,
    photos: Vec<PhotoUpload>,
}

impl SubmissionForm {
    async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = SubmissionForm::default();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                INIT_DATA_FIELD => form.init_data = Some(field.text().await?),
                "category" => form.report.category = field.text().await?,
                "location" => form.report.location = field.text().await?,
                "description" => form.report.description = field.text().await?,
                n if PHOTO_FIELDS.contains(&n) => {
                    let file_name = field.file_name().map(str::to_string);
                    let content_type = field.content_type().map(str::to_string);
                    let bytes = field.bytes().await?;
                    // Browsers send an empty part when no file was picked
                    if bytes.is_empty() && file_name.as_deref().unwrap_or_default().is_empty() {
                        continue;
                    }
                    form.photos.push(PhotoUpload {
                        file_name,
                        content_type,
                        bytes: bytes.to_vec(),
                    });
                }
                other => debug!("Ignoring form field '{}'", other),
            }
        }
        Ok(form)
    }
}

/// `POST /api/reports`
pub async fn create_report(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Report>), ApiError> {
    let form = SubmissionForm::read(multipart).await?;
    let identity = state.authenticate(form.init_data.as_deref())?;

    let input = form.report.validated()?;
    let urls = state.uploads.save_all(&form.photos).await?;

    let report = Report::new(&identity, input, urls);
    let report = match state.store.create(report.clone()).await {
        Ok(stored) => stored,
        Err(e) => {
            state.uploads.remove(&report.photos).await;
            return Err(e.into());
        }
    };
    debug!(report_id = %report.id, photos = report.photos.len(), "Relaying new report");

    let paths: Vec<PathBuf> = report
        .photos
        .iter()
        .filter_map(|url| state.uploads.path_for_url(url))
        .collect();
    state.relay.report_created(&report, &paths).await;

    Ok((StatusCode::CREATED, Json(report)))
}

/// `POST /api/admin/check`
pub async fn admin_check(
    State(state): State<AppState>,
    query: Result<Query<InitDataQuery>, QueryRejection>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let init_data = query_init_data(query)
        .or_else(|| json_body(&body).as_ref().and_then(init_data_from_json));
    let identity = state.authenticate(init_data.as_deref())?;
    let is_admin = state.admins.is_admin(&identity);
    debug!(user_id = identity.id, is_admin, "Admin check");
    Ok(Json(json!({ "is_admin": is_admin })))
}

/// `GET /api/reports`
pub async fn list_reports(
    State(state): State<AppState>,
    query: Result<Query<InitDataQuery>, QueryRejection>,
) -> Result<Json<Vec<Report>>, ApiError> {
    state.authorize_admin(query_init_data(query).as_deref())?;
    Ok(Json(state.store.list().await?))
}

/// `GET /api/reports/{id}`
pub async fn get_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
    query: Result<Query<InitDataQuery>, QueryRejection>,
) -> Result<Json<Report>, ApiError> {
    state.authorize_admin(query_init_data(query).as_deref())?;
    Ok(Json(state.store.get(&id).await?))
}

/// `PATCH /api/reports/{id}`
pub async fn update_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
    query: Result<Query<InitDataQuery>, QueryRejection>,
    body: Bytes,
) -> Result<Json<Report>, ApiError> {
    let body = json_body(&body);
    let init_data =
        query_init_data(query).or_else(|| body.as_ref().and_then(init_data_from_json));
    let admin = state.authorize_admin(init_data.as_deref())?;

    let body = body.ok_or_else(|| ApiError::BadRequest("expected a JSON object body".to_string()))?;
    let update: ReportUpdate = serde_json::from_value(body)
        .map_err(|e| ApiError::BadRequest(format!("invalid update: {e}")))?;
    let update = update.validated()?;

    let report = state.store.update(&id, &update).await?;
    info!(report_id = %report.id, admin_id = admin.id, "Report updated");
    state.relay.report_updated(&report).await;

    Ok(Json(report))
}

/// `DELETE /api/reports/{id}`
pub async fn delete_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
    query: Result<Query<InitDataQuery>, QueryRejection>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let init_data = query_init_data(query)
        .or_else(|| json_body(&body).as_ref().and_then(init_data_from_json));
    let admin = state.authorize_admin(init_data.as_deref())?;

    let report = state.store.delete(&id).await?;
    state.uploads.remove(&report.photos).await;
    info!(report_id = %report.id, admin_id = admin.id, "Report deleted");
    state.relay.report_deleted(&report).await;

    Ok(Json(json!({ "deleted": report.id })))
}

/// Parse a body as a JSON object; anything else counts as absent
fn json_body(body: &Bytes) -> Option<Value> {
    if body.is_empty() {
        return None;
    }
    serde_json::from_slice::<Value>(body)
        .ok()
        .filter(Value::is_object)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_body() {
        assert!(json_body(&Bytes::new()).is_none());
        assert!(json_body(&Bytes::from_static(b"not json")).is_none());
        assert!(json_body(&Bytes::from_static(b"[1,2]")).is_none());
        assert_eq!(
            json_body(&Bytes::from_static(br#"{"initData":"x"}"#)),
            Some(json!({"initData": "x"}))
        );
    }
}
