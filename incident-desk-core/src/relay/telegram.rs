//! Group chat notifications through the Telegram Bot API
//!
//! New reports are announced as an HTML message. Attached photos follow as
//! an album (`sendMediaGroup`, 2-10 items per call) or a single `sendPhoto`.
//! The announcement rides along as the first caption when it fits.
//!
//! Request URLs embed the bot token, so errors are always logged without
//! their URL.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::format::report_message;
use super::{http_client, ReportSink};
use crate::config::{SecretString, TelegramConfig};
use crate::report::Report;

/// Longest caption the Bot API accepts
pub const CAPTION_LIMIT: usize = 1024;
/// Longest message text the Bot API accepts
pub const MESSAGE_LIMIT: usize = 4096;
/// Most photos one album may hold
pub const MEDIA_GROUP_LIMIT: usize = 10;

/// Bot API response envelope
#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_thread_id: Option<i64>,
}

#[derive(Debug, Serialize)]
struct InputMediaPhoto {
    #[serde(rename = "type")]
    media_type: &'static str,
    media: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    caption: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'static str>,
}

/// Posts report announcements to a group chat
pub struct TelegramNotifier {
    client: reqwest::Client,
    api_base: String,
    token: SecretString,
    chat_id: String,
    message_thread_id: Option<i64>,
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig, token: SecretString, chat_id: String) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout_seconds)?,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token,
            chat_id,
            message_thread_id: config.message_thread_id,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.api_base,
            self.token.expose_secret(),
            method
        )
    }

    /// Send an HTML message, truncated to the Bot API limit
    pub async fn send_message(&self, text: &str) -> Result<()> {
        let text = truncate_chars(text, MESSAGE_LIMIT);
        let body = SendMessage {
            chat_id: &self.chat_id,
            text: &text,
            parse_mode: "HTML",
            message_thread_id: self.message_thread_id,
        };

        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&body)
            .send()
            .await
            .map_err(|e| anyhow!("Telegram sendMessage failed: {}", e.without_url()))?;
        check_response("sendMessage", response).await
    }

    /// Send one photo with an optional HTML caption
    pub async fn send_photo(&self, photo: &Path, caption: Option<&str>) -> Result<()> {
        let mut form = self.base_form().part("photo", file_part(photo).await?);
        if let Some(caption) = caption {
            form = form
                .text("caption", caption.to_string())
                .text("parse_mode", "HTML");
        }

        let response = self
            .client
            .post(self.method_url("sendPhoto"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| anyhow!("Telegram sendPhoto failed: {}", e.without_url()))?;
        check_response("sendPhoto", response).await
    }

    /// Send 2-10 photos as one album, caption on the first
    pub async fn send_media_group(&self, photos: &[PathBuf], caption: Option<&str>) -> Result<()> {
        let media: Vec<InputMediaPhoto> = photos
            .iter()
            .enumerate()
            .map(|(i, _)| InputMediaPhoto {
                media_type: "photo",
                media: format!("attach://photo{i}"),
                caption: caption.filter(|_| i == 0).map(str::to_string),
                parse_mode: caption.filter(|_| i == 0).map(|_| "HTML"),
            })
            .collect();

        let mut form = self
            .base_form()
            .text("media", serde_json::to_string(&media)?);
        for (i, photo) in photos.iter().enumerate() {
            form = form.part(format!("photo{i}"), file_part(photo).await?);
        }

        let response = self
            .client
            .post(self.method_url("sendMediaGroup"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| anyhow!("Telegram sendMediaGroup failed: {}", e.without_url()))?;
        check_response("sendMediaGroup", response).await
    }

    fn base_form(&self) -> Form {
        let form = Form::new().text("chat_id", self.chat_id.clone());
        match self.message_thread_id {
            Some(thread) => form.text("message_thread_id", thread.to_string()),
            None => form,
        }
    }

    /// Announce a report, with its photos when there are any
    pub async fn announce(&self, report: &Report, photos: &[PathBuf]) -> Result<()> {
        let message = report_message(report, MESSAGE_LIMIT);

        if photos.is_empty() {
            return self.send_message(&message).await;
        }

        let mut caption = if message.chars().count() <= CAPTION_LIMIT {
            Some(message.as_str())
        } else {
            self.send_message(&message).await?;
            None
        };

        for chunk in photos.chunks(MEDIA_GROUP_LIMIT) {
            match chunk {
                [single] => self.send_photo(single, caption.take()).await?,
                _ => self.send_media_group(chunk, caption.take()).await?,
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ReportSink for TelegramNotifier {
    async fn report_created(&self, report: &Report, photos: &[PathBuf]) -> Result<()> {
        self.announce(report, photos).await?;
        info!(report_id = %report.id, photos = photos.len(), "Report announced in Telegram");
        Ok(())
    }

    async fn report_updated(&self, report: &Report) -> Result<()> {
        debug!(report_id = %report.id, "Telegram does not announce edits");
        Ok(())
    }

    async fn report_deleted(&self, report: &Report) -> Result<()> {
        debug!(report_id = %report.id, "Telegram does not announce deletions");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "telegram"
    }
}

async fn file_part(path: &Path) -> Result<Part> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read photo for upload: {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "photo.jpg".to_string());
    Ok(Part::bytes(bytes).file_name(name))
}

async fn check_response(method: &str, response: reqwest::Response) -> Result<()> {
    let status = response.status();
    let body: ApiResponse = response.json().await.map_err(|e| {
        anyhow!(
            "Telegram {} returned an unreadable body ({}): {}",
            method,
            status,
            e.without_url()
        )
    })?;

    if !body.ok {
        return Err(anyhow!(
            "Telegram {} rejected the request ({}): {}",
            method,
            status,
            body.description.unwrap_or_else(|| "no description".to_string())
        ));
    }
    debug!("Telegram {} succeeded", method);
    Ok(())
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}
