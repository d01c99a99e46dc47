//! Report persistence
//!
//! Reports live in a single JSON array on disk. Every read-modify-write
//! cycle runs under one mutex, and writes go to a sibling temp file that is
//! renamed over the original so a crash never leaves half a file behind.

use async_trait::async_trait;
use chrono::Utc;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::error::StoreError;
use super::{Report, ReportUpdate};

/// Storage backend for reports
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// All reports, newest first
    async fn list(&self) -> Result<Vec<Report>, StoreError>;

    async fn get(&self, id: &str) -> Result<Report, StoreError>;

    async fn create(&self, report: Report) -> Result<Report, StoreError>;

    /// Apply a validated update and return the new state
    async fn update(&self, id: &str, update: &ReportUpdate) -> Result<Report, StoreError>;

    /// Remove a report and return what was removed
    async fn delete(&self, id: &str) -> Result<Report, StoreError>;
}

/// JSON array file store
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    async fn read_all(&self) -> Result<Vec<Report>, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Report file {} does not exist yet", self.path.display());
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    async fn write_all(&self, reports: &[Report]) -> Result<(), StoreError> {
        let json =
            serde_json::to_vec_pretty(reports).map_err(|source| StoreError::Serialize { source })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| self.io_error(parent, source))?;
        }

        let tmp_path = self.tmp_path();
        tokio::fs::write(&tmp_path, &json)
            .await
            .map_err(|source| self.io_error(&tmp_path, source))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|source| self.io_error(&self.path, source))?;

        debug!("Wrote {} reports to {}", reports.len(), self.path.display());
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "reports.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(&self, path: &Path, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[async_trait]
impl ReportStore for JsonFileStore {
    async fn list(&self) -> Result<Vec<Report>, StoreError> {
        let _guard = self.lock.lock().await;
        let mut reports = self.read_all().await?;
        reports.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(reports)
    }

    async fn get(&self, id: &str) -> Result<Report, StoreError> {
        let _guard = self.lock.lock().await;
        self.read_all()
            .await?
            .into_iter()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })
    }

    async fn create(&self, report: Report) -> Result<Report, StoreError> {
        let _guard = self.lock.lock().await;
        let mut reports = self.read_all().await?;
        reports.push(report.clone());
        self.write_all(&reports).await?;

        info!(report_id = %report.id, user_id = report.user_id, "Report stored");
        Ok(report)
    }

    async fn update(&self, id: &str, update: &ReportUpdate) -> Result<Report, StoreError> {
        let _guard = self.lock.lock().await;
        let mut reports = self.read_all().await?;

        let report = reports
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })?;
        update.apply_to(report, Utc::now());
        let updated = report.clone();

        self.write_all(&reports).await?;
        info!(report_id = %id, "Report updated");
        Ok(updated)
    }

    async fn delete(&self, id: &str) -> Result<Report, StoreError> {
        let _guard = self.lock.lock().await;
        let mut reports = self.read_all().await?;

        let index = reports
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })?;
        let removed = reports.remove(index);

        self.write_all(&reports).await?;
        info!(report_id = %id, "Report deleted");
        Ok(removed)
    }
}
