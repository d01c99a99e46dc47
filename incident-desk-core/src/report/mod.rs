//! Incident reports and their persistence

pub mod error;
pub mod store;

pub use error::{StoreError, ValidationError};
pub use store::{JsonFileStore, ReportStore};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::auth::Identity;

pub const MAX_CATEGORY_CHARS: usize = 100;
pub const MAX_LOCATION_CHARS: usize = 300;
pub const MAX_DESCRIPTION_CHARS: usize = 4000;

/// Review state set by administrators
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    #[default]
    New,
    InProgress,
    Resolved,
    Rejected,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::New => "new",
            ReportStatus::InProgress => "in_progress",
            ReportStatus::Resolved => "resolved",
            ReportStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored incident report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: String,
    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    pub user_id: i64,
    pub user_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    pub category: String,

    #[serde(default)]
    pub location: String,

    pub description: String,

    /// Public URLs of attached photos
    #[serde(default)]
    pub photos: Vec<String>,

    #[serde(default)]
    pub status: ReportStatus,
}

impl Report {
    /// Attribute a validated submission to a verified identity
    pub fn new(identity: &Identity, input: NewReport, photos: Vec<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            updated_at: None,
            user_id: identity.id,
            user_name: identity.display_name(),
            username: identity.username.clone(),
            category: input.category,
            location: input.location,
            description: input.description,
            photos,
            status: ReportStatus::New,
        }
    }
}

/// Text fields of a submission
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewReport {
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub description: String,
}

impl NewReport {
    /// Trim every field and check required fields and lengths
    pub fn validated(self) -> Result<Self, ValidationError> {
        Ok(Self {
            category: required("category", &self.category, MAX_CATEGORY_CHARS)?,
            location: bounded("location", &self.location, MAX_LOCATION_CHARS)?,
            description: required("description", &self.description, MAX_DESCRIPTION_CHARS)?,
        })
    }
}

/// Partial edit applied by an administrator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ReportStatus>,
}

impl ReportUpdate {
    /// Trim and check supplied fields; an update with no fields is rejected
    pub fn validated(self) -> Result<Self, ValidationError> {
        if self.category.is_none()
            && self.location.is_none()
            && self.description.is_none()
            && self.status.is_none()
        {
            return Err(ValidationError::NoChanges);
        }

        Ok(Self {
            category: self
                .category
                .map(|v| required("category", &v, MAX_CATEGORY_CHARS))
                .transpose()?,
            location: self
                .location
                .map(|v| bounded("location", &v, MAX_LOCATION_CHARS))
                .transpose()?,
            description: self
                .description
                .map(|v| required("description", &v, MAX_DESCRIPTION_CHARS))
                .transpose()?,
            status: self.status,
        })
    }

    /// Apply to a report and stamp `updated_at`
    pub fn apply_to(&self, report: &mut Report, now: DateTime<Utc>) {
        if let Some(category) = &self.category {
            report.category = category.clone();
        }
        if let Some(location) = &self.location {
            report.location = location.clone();
        }
        if let Some(description) = &self.description {
            report.description = description.clone();
        }
        if let Some(status) = self.status {
            report.status = status;
        }
        report.updated_at = Some(now);
    }
}

fn bounded(field: &'static str, value: &str, max: usize) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(trimmed.to_string())
}

fn required(field: &'static str, value: &str, max: usize) -> Result<String, ValidationError> {
    let trimmed = bounded(field, value, max)?;
    if trimmed.is_empty() {
        return Err(ValidationError::Required { field });
    }
    Ok(trimmed)
}
