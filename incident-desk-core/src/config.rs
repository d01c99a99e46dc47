//! Incident Desk configuration
//!
//! ## Configuration Sources (in precedence order)
//!
//! 1. Environment variables (secrets always come from here)
//! 2. YAML file passed with `--config`
//! 3. Built-in defaults
//!
//! ```yaml
//! listen: "0.0.0.0:3000"
//! signing_key: web_app_data   # or sha256
//! admin_ids: ["42"]
//! storage:
//!   reports_file: data/reports.json
//!   uploads_dir: data/uploads
//!   public_dir: public
//! telegram:
//!   chat_id: "-1001234567890"
//! sheets:
//!   spreadsheet_id: "1AbC..."
//!   sheet_name: Reports
//! ```
//!
//! The bot token and the Sheets access token are read from the environment
//! variables named by `bot_token_env` and `sheets.access_token_env`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::auth::{AdminSet, InitDataVerifier, SigningKeyVariant};

pub const ADMIN_IDS_ENV: &str = "ADMIN_IDS";
pub const LISTEN_ENV: &str = "INCIDENT_DESK_LISTEN";
pub const GROUP_CHAT_ID_ENV: &str = "GROUP_CHAT_ID";
pub const SPREADSHEET_ID_ENV: &str = "SPREADSHEET_ID";

/// A secret that never shows up in logs or debug output
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose_secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml_ng::Error,
    },

    #[error("Bot token is not set.\n\nExport it before starting the server:\n  export {env}=<token>")]
    MissingBotToken { env: String },

    #[error("Invalid listen address '{value}'")]
    InvalidListen {
        value: String,
        #[source]
        source: std::net::AddrParseError,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeskConfig {
    /// Socket address the HTTP server binds to
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Environment variable holding the bot token
    #[serde(default = "default_bot_token_env")]
    pub bot_token_env: String,

    /// Signing key derivation used by the bot platform
    #[serde(default)]
    pub signing_key: SigningKeyVariant,

    /// Reject payloads older than this many seconds (off when unset)
    #[serde(default)]
    pub max_auth_age_seconds: Option<u64>,

    /// Administrator ids
    #[serde(default)]
    pub admin_ids: Vec<String>,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub uploads: UploadLimits,

    #[serde(default)]
    pub telegram: TelegramConfig,

    #[serde(default)]
    pub sheets: SheetsConfig,

    #[serde(skip)]
    bot_token: Option<SecretString>,
}

impl Default for DeskConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            bot_token_env: default_bot_token_env(),
            signing_key: SigningKeyVariant::default(),
            max_auth_age_seconds: None,
            admin_ids: Vec::new(),
            storage: StorageConfig::default(),
            uploads: UploadLimits::default(),
            telegram: TelegramConfig::default(),
            sheets: SheetsConfig::default(),
            bot_token: None,
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_bot_token_env() -> String {
    "BOT_TOKEN".to_string()
}

fn default_timeout() -> u64 {
    10
}

/// Where reports, photos and the mini-app live on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_reports_file")]
    pub reports_file: PathBuf,

    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: PathBuf,

    /// Static mini-app files; nothing is served at `/` when unset
    #[serde(default)]
    pub public_dir: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            reports_file: default_reports_file(),
            uploads_dir: default_uploads_dir(),
            public_dir: None,
        }
    }
}

fn default_reports_file() -> PathBuf {
    PathBuf::from("data/reports.json")
}

fn default_uploads_dir() -> PathBuf {
    PathBuf::from("data/uploads")
}

/// Photo upload limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadLimits {
    #[serde(default = "default_max_photos")]
    pub max_photos: usize,

    #[serde(default = "default_max_photo_bytes")]
    pub max_photo_bytes: usize,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_photos: default_max_photos(),
            max_photo_bytes: default_max_photo_bytes(),
        }
    }
}

impl UploadLimits {
    /// Largest request body a submission may need, with room for text fields
    pub fn max_request_bytes(&self) -> usize {
        const FORM_OVERHEAD: usize = 1024 * 1024;
        self.max_photos
            .saturating_mul(self.max_photo_bytes)
            .saturating_add(FORM_OVERHEAD)
    }
}

fn default_max_photos() -> usize {
    10
}

fn default_max_photo_bytes() -> usize {
    10 * 1024 * 1024
}

/// Group chat notifications through the Telegram Bot API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Target chat; notifications are off when unset
    #[serde(default)]
    pub chat_id: Option<String>,

    /// Forum topic inside the chat
    #[serde(default)]
    pub message_thread_id: Option<i64>,

    #[serde(default = "default_telegram_api_base")]
    pub api_base: String,

    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            chat_id: None,
            message_thread_id: None,
            api_base: default_telegram_api_base(),
            timeout_seconds: default_timeout(),
        }
    }
}

fn default_telegram_api_base() -> String {
    "https://api.telegram.org".to_string()
}

/// Spreadsheet log through the Google Sheets values API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetsConfig {
    /// Target spreadsheet; the log is off when unset
    #[serde(default)]
    pub spreadsheet_id: Option<String>,

    /// Tab name used in A1 ranges
    #[serde(default = "default_sheet_name")]
    pub sheet_name: String,

    /// Numeric tab id, needed to delete rows
    #[serde(default)]
    pub sheet_gid: i64,

    /// Environment variable holding an OAuth access token
    #[serde(default = "default_access_token_env")]
    pub access_token_env: String,

    #[serde(default = "default_sheets_api_base")]
    pub api_base: String,

    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    #[serde(skip)]
    access_token: Option<SecretString>,
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            spreadsheet_id: None,
            sheet_name: default_sheet_name(),
            sheet_gid: 0,
            access_token_env: default_access_token_env(),
            api_base: default_sheets_api_base(),
            timeout_seconds: default_timeout(),
            access_token: None,
        }
    }
}

impl SheetsConfig {
    pub fn access_token(&self) -> Option<&SecretString> {
        self.access_token.as_ref()
    }

    pub fn set_access_token(&mut self, token: SecretString) {
        self.access_token = Some(token);
    }
}

fn default_sheet_name() -> String {
    "Reports".to_string()
}

fn default_access_token_env() -> String {
    "SHEETS_ACCESS_TOKEN".to_string()
}

fn default_sheets_api_base() -> String {
    "https://sheets.googleapis.com".to_string()
}

impl DeskConfig {
    /// Load from an optional YAML file, then apply the process environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                debug!("No config file given, using defaults");
                Self::default()
            }
        };
        config.apply_env_with(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse a YAML config file without touching the environment
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config =
            serde_yaml_ng::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Apply environment overrides through a lookup function
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(token) = non_empty(&self.bot_token_env) {
            self.bot_token = Some(SecretString::new(token.trim()));
        }
        if let Some(ids) = non_empty(ADMIN_IDS_ENV) {
            self.admin_ids = ids.split(',').map(String::from).collect();
        }
        if let Some(listen) = non_empty(LISTEN_ENV) {
            self.listen = listen.trim().to_string();
        }
        if let Some(chat_id) = non_empty(GROUP_CHAT_ID_ENV) {
            self.telegram.chat_id = Some(chat_id.trim().to_string());
        }
        if let Some(spreadsheet_id) = non_empty(SPREADSHEET_ID_ENV) {
            self.sheets.spreadsheet_id = Some(spreadsheet_id.trim().to_string());
        }
        if let Some(token) = non_empty(&self.sheets.access_token_env) {
            self.sheets.access_token = Some(SecretString::new(token.trim()));
        }
    }

    pub fn set_bot_token(&mut self, token: SecretString) {
        self.bot_token = Some(token);
    }

    pub fn bot_token(&self) -> Result<&SecretString, ConfigError> {
        self.bot_token.as_ref().ok_or_else(|| ConfigError::MissingBotToken {
            env: self.bot_token_env.clone(),
        })
    }

    /// Administrator set, trimmed at load
    pub fn admin_set(&self) -> AdminSet {
        self.admin_ids.iter().collect()
    }

    /// Build the payload verifier from the bot token and key variant
    pub fn verifier(&self) -> Result<InitDataVerifier, ConfigError> {
        let verifier = InitDataVerifier::new(self.bot_token()?.expose_secret(), self.signing_key);
        Ok(match self.max_auth_age_seconds {
            Some(seconds) => verifier.with_max_age(Duration::from_secs(seconds)),
            None => verifier,
        })
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen
            .parse()
            .map_err(|source| ConfigError::InvalidListen {
                value: self.listen.clone(),
                source,
            })
    }

    /// Check everything the server needs before it starts
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bot_token()?;
        self.listen_addr()?;

        if self.uploads.max_photos == 0 || self.uploads.max_photo_bytes == 0 {
            return Err(ConfigError::Invalid(
                "uploads.max_photos and uploads.max_photo_bytes must be greater than zero"
                    .to_string(),
            ));
        }
        if self.telegram.chat_id.is_some() && self.telegram.api_base.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "telegram.api_base must not be empty".to_string(),
            ));
        }
        if self.sheets.spreadsheet_id.is_some() && self.sheets.access_token.is_none() {
            return Err(ConfigError::Invalid(format!(
                "sheets.spreadsheet_id is set but {} is not",
                self.sheets.access_token_env
            )));
        }
        if self.admin_ids.iter().all(|id| id.trim().is_empty()) {
            tracing::warn!("No administrator ids configured; admin endpoints will deny everyone");
        }
        Ok(())
    }
}
