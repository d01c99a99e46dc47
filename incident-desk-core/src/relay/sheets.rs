//! Spreadsheet log through the Google Sheets values API
//!
//! Every report occupies one row whose column A holds the report id. Rows
//! are appended on create and located by scanning column A for edits and
//! deletions. Deleting a row shifts every row below it, so a lookup and
//! the write that uses its row number happen under one lock. Authentication
//! uses a ready OAuth bearer token.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::format::sheet_row;
use super::{http_client, ReportSink};
use crate::config::{SecretString, SheetsConfig};
use crate::report::Report;

/// Body of a values read or write
#[derive(Debug, Default, Serialize, Deserialize)]
struct ValueRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    values: Option<Vec<Vec<String>>>,
}

/// Appends, rewrites and deletes report rows
pub struct SheetsLog {
    client: reqwest::Client,
    api_base: String,
    spreadsheet_id: String,
    sheet_name: String,
    sheet_gid: i64,
    token: SecretString,
    /// Held from a row lookup until the write that targets it is done
    rows: Mutex<()>,
}

impl SheetsLog {
    pub fn new(config: &SheetsConfig, spreadsheet_id: String, token: SecretString) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout_seconds)?,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            spreadsheet_id,
            sheet_name: config.sheet_name.clone(),
            sheet_gid: config.sheet_gid,
            token,
            rows: Mutex::new(()),
        })
    }

    fn values_url(&self, range: &str) -> String {
        let range = format!("{}!{}", self.sheet_name, range);
        format!(
            "{}/v4/spreadsheets/{}/values/{}",
            self.api_base,
            self.spreadsheet_id,
            urlencoding::encode(&range)
        )
    }

    async fn send(&self, request: reqwest::RequestBuilder, action: &str) -> Result<reqwest::Response> {
        let response = request
            .bearer_auth(self.token.expose_secret())
            .send()
            .await
            .map_err(|e| anyhow!("Sheets {} failed: {}", action, e.without_url()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "Sheets {} returned {}: {}",
                action,
                status,
                body.chars().take(200).collect::<String>()
            ));
        }
        Ok(response)
    }

    /// Append a row for the report
    pub async fn append(&self, report: &Report) -> Result<()> {
        let url = format!("{}:append", self.values_url("A1"));
        let body = ValueRange {
            values: Some(vec![sheet_row(report)]),
        };
        let request = self
            .client
            .post(url)
            .query(&[("valueInputOption", "USER_ENTERED"), ("insertDataOption", "INSERT_ROWS")])
            .json(&body);
        self.send(request, "append").await?;
        Ok(())
    }

    /// 1-based row number holding the report id in column A
    pub async fn find_row(&self, report_id: &str) -> Result<Option<usize>> {
        let request = self.client.get(self.values_url("A:A"));
        let range: ValueRange = self
            .send(request, "read")
            .await?
            .json()
            .await
            .map_err(|e| anyhow!("Sheets read returned an unreadable body: {}", e.without_url()))?;

        Ok(range
            .values
            .unwrap_or_default()
            .iter()
            .position(|row| row.first().map(String::as_str) == Some(report_id))
            .map(|index| index + 1))
    }

    /// Overwrite the given row with the report
    pub async fn update_row(&self, row: usize, report: &Report) -> Result<()> {
        let body = ValueRange {
            values: Some(vec![sheet_row(report)]),
        };
        let request = self
            .client
            .put(self.values_url(&format!("A{row}")))
            .query(&[("valueInputOption", "USER_ENTERED")])
            .json(&body);
        self.send(request, "update").await?;
        Ok(())
    }

    /// Remove the given row, shifting the rows below it up
    pub async fn delete_row(&self, row: usize) -> Result<()> {
        let body = json!({
            "requests": [{
                "deleteDimension": {
                    "range": {
                        "sheetId": self.sheet_gid,
                        "dimension": "ROWS",
                        "startIndex": row - 1,
                        "endIndex": row,
                    }
                }
            }]
        });
        let url = format!(
            "{}/v4/spreadsheets/{}:batchUpdate",
            self.api_base, self.spreadsheet_id
        );
        self.send(self.client.post(url).json(&body), "delete").await?;
        Ok(())
    }
}

#[async_trait]
impl ReportSink for SheetsLog {
    async fn report_created(&self, report: &Report, _photos: &[PathBuf]) -> Result<()> {
        self.append(report).await?;
        info!(report_id = %report.id, "Report logged to spreadsheet");
        Ok(())
    }

    async fn report_updated(&self, report: &Report) -> Result<()> {
        let _rows = self.rows.lock().await;
        match self.find_row(&report.id).await? {
            Some(row) => {
                self.update_row(row, report).await?;
                debug!(report_id = %report.id, row, "Spreadsheet row updated");
            }
            None => warn!(report_id = %report.id, "Report missing from spreadsheet, skipping update"),
        }
        Ok(())
    }

    async fn report_deleted(&self, report: &Report) -> Result<()> {
        let _rows = self.rows.lock().await;
        match self.find_row(&report.id).await? {
            Some(row) => {
                self.delete_row(row).await?;
                debug!(report_id = %report.id, row, "Spreadsheet row deleted");
            }
            None => warn!(report_id = %report.id, "Report missing from spreadsheet, skipping delete"),
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "sheets"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_url_encodes_range() {
        let mut config = SheetsConfig::default();
        config.sheet_name = "Incident Log".to_string();
        config.api_base = "http://localhost:1/".to_string();

        let log = SheetsLog::new(
            &config,
            "sheet-1".to_string(),
            SecretString::new("ya29.token"),
        )
        .unwrap();

        assert_eq!(
            log.values_url("A:A"),
            "http://localhost:1/v4/spreadsheets/sheet-1/values/Incident%20Log%21A%3AA"
        );
    }

    #[test]
    fn test_value_range_tolerates_missing_values() {
        let empty: ValueRange = serde_json::from_str(r#"{"range":"Reports!A1:A1"}"#).unwrap();
        assert!(empty.values.is_none());
    }
}
