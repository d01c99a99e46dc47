//! Relaying report events to external systems
//!
//! Two sinks exist: a group chat notified through the Telegram Bot API and a
//! spreadsheet log kept through the Google Sheets values API. Each is
//! enabled by its section in the configuration.
//!
//! A report is persisted before any sink hears about it, so sink failures
//! are logged and never fail the request that caused them.

pub mod format;
pub mod sheets;
pub mod telegram;

pub use sheets::SheetsLog;
pub use telegram::TelegramNotifier;

use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::config::DeskConfig;
use crate::report::Report;

/// An external system that hears about report lifecycle events
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// A report was stored; `photos` are the on-disk files of its attachments
    async fn report_created(&self, report: &Report, photos: &[PathBuf]) -> Result<()>;

    async fn report_updated(&self, report: &Report) -> Result<()>;

    async fn report_deleted(&self, report: &Report) -> Result<()>;

    /// Sink identifier for logging
    fn name(&self) -> &'static str;
}

/// Fans events out to every configured sink
pub struct Relay {
    sinks: Vec<Box<dyn ReportSink>>,
}

impl Relay {
    pub fn new(sinks: Vec<Box<dyn ReportSink>>) -> Self {
        Self { sinks }
    }

    /// Build sinks from the enabled configuration sections
    pub fn from_config(config: &DeskConfig) -> Result<Self> {
        let mut sinks: Vec<Box<dyn ReportSink>> = Vec::new();

        if let Some(chat_id) = &config.telegram.chat_id {
            info!("Relaying new reports to Telegram chat {}", chat_id);
            sinks.push(Box::new(TelegramNotifier::new(
                &config.telegram,
                config.bot_token()?.clone(),
                chat_id.clone(),
            )?));
        }

        if let Some(spreadsheet_id) = &config.sheets.spreadsheet_id {
            let token = config.sheets.access_token().cloned().ok_or_else(|| {
                anyhow::anyhow!(
                    "Sheets log requires {} environment variable to be set",
                    config.sheets.access_token_env
                )
            })?;
            info!(
                "Logging reports to spreadsheet {} (tab '{}')",
                spreadsheet_id, config.sheets.sheet_name
            );
            sinks.push(Box::new(SheetsLog::new(
                &config.sheets,
                spreadsheet_id.clone(),
                token,
            )?));
        }

        if sinks.is_empty() {
            debug!("No relay sinks configured");
        }
        Ok(Self { sinks })
    }

    pub fn sink_names(&self) -> Vec<&'static str> {
        self.sinks.iter().map(|s| s.name()).collect()
    }

    pub async fn report_created(&self, report: &Report, photos: &[PathBuf]) {
        for sink in &self.sinks {
            if let Err(e) = sink.report_created(report, photos).await {
                warn!(report_id = %report.id, sink = sink.name(), "Relay failed: {:#}", e);
            }
        }
    }

    pub async fn report_updated(&self, report: &Report) {
        for sink in &self.sinks {
            if let Err(e) = sink.report_updated(report).await {
                warn!(report_id = %report.id, sink = sink.name(), "Relay failed: {:#}", e);
            }
        }
    }

    pub async fn report_deleted(&self, report: &Report) {
        for sink in &self.sinks {
            if let Err(e) = sink.report_deleted(report).await {
                warn!(report_id = %report.id, sink = sink.name(), "Relay failed: {:#}", e);
            }
        }
    }
}

/// Smallest per-request timeout handed to the HTTP clients
pub(crate) const MIN_TIMEOUT_SECONDS: u64 = 1;

pub(crate) fn http_client(timeout_seconds: u64) -> Result<reqwest::Client> {
    use anyhow::Context;

    let timeout_seconds = if timeout_seconds < MIN_TIMEOUT_SECONDS {
        warn!(
            "Configured timeout_seconds={} is too low; using minimum of {} seconds",
            timeout_seconds, MIN_TIMEOUT_SECONDS
        );
        MIN_TIMEOUT_SECONDS
    } else {
        timeout_seconds
    };

    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_seconds))
        .build()
        .context("Failed to create HTTP client")
}
