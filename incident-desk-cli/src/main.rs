//! Incident Desk - report intake backend for a chat-bot mini-app
//!
//! Serves the report API and offers local helpers to sign and verify
//! `initData` payloads with the configured bot token.

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use incident_desk_core::auth::{sign_init_data, Identity};
use incident_desk_core::config::DeskConfig;
use incident_desk_core::server;

/// Log levels
#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Parser, Debug)]
#[clap(
    name = "incident-desk",
    about = "Incident report intake for a chat-bot mini-app",
    version
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,

    /// Set log level (RUST_LOG takes precedence when set)
    #[clap(long, default_value = "info", global = true)]
    log_level: LogLevel,

    /// Emit logs as JSON lines
    #[clap(long, global = true)]
    log_json: bool,

    /// YAML configuration file
    #[clap(long, env = "INCIDENT_DESK_CONFIG", global = true)]
    config: Option<PathBuf>,
}

#[derive(Parser, Debug)]
enum Command {
    /// Run the HTTP server
    Serve,

    /// Print an initData payload signed with the configured bot token
    Sign {
        /// User id to embed
        #[clap(long)]
        user_id: i64,

        #[clap(long)]
        first_name: Option<String>,

        #[clap(long)]
        last_name: Option<String>,

        #[clap(long)]
        username: Option<String>,
    },

    /// Verify an initData payload and print the identity it carries
    Verify {
        /// Raw initData query string
        init_data: String,
    },

    /// Validate the configuration and print a summary
    CheckConfig,
}

fn initialize_tracing(log_level: &LogLevel, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_filter_directive()));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    initialize_tracing(&cli.log_level, cli.log_json);

    let config = DeskConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Command::Serve => server::serve(&config, shutdown_signal()).await,
        Command::Sign {
            user_id,
            first_name,
            last_name,
            username,
        } => {
            let identity = Identity {
                first_name,
                last_name,
                username,
                ..Identity::new(user_id)
            };
            println!("{}", sign_command(&config, &identity)?);
            Ok(())
        }
        Command::Verify { init_data } => verify_command(&config, &init_data),
        Command::CheckConfig => check_config_command(&config),
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }
}

fn sign_command(config: &DeskConfig, identity: &Identity) -> Result<String> {
    let token = config.bot_token()?;
    let user = serde_json::to_string(identity)?;
    let auth_date = chrono::Utc::now().timestamp().to_string();

    Ok(sign_init_data(
        [("auth_date", auth_date.as_str()), ("user", user.as_str())],
        token.expose_secret(),
        config.signing_key,
    ))
}

fn verify_command(config: &DeskConfig, init_data: &str) -> Result<()> {
    let verifier = config.verifier()?;

    match verifier.verify(init_data) {
        Ok(identity) => {
            let admin = config.admin_set().is_admin(&identity);
            println!("{}", serde_json::to_string_pretty(&identity)?);
            println!("display name: {}", identity.display_name());
            println!("administrator: {}", admin);
            Ok(())
        }
        Err(e) => {
            e.log_rejection();
            bail!("not authenticated")
        }
    }
}

fn check_config_command(config: &DeskConfig) -> Result<()> {
    config.validate().context("Configuration is invalid")?;

    let enabled = |on: bool| if on { "enabled" } else { "disabled" };

    println!("Configuration OK");
    println!("  listen:            {}", config.listen);
    println!("  bot token:         {} (from {})", config.bot_token()?, config.bot_token_env);
    println!("  signing key:       {}", config.signing_key);
    match config.max_auth_age_seconds {
        Some(seconds) => println!("  max auth age:      {}s", seconds),
        None => println!("  max auth age:      unlimited"),
    }
    println!("  administrators:    {}", config.admin_set().len());
    println!("  reports file:      {}", config.storage.reports_file.display());
    println!("  uploads dir:       {}", config.storage.uploads_dir.display());
    if let Some(dir) = &config.storage.public_dir {
        println!("  mini-app dir:      {}", dir.display());
    }
    println!(
        "  photo limits:      {} x {} bytes",
        config.uploads.max_photos, config.uploads.max_photo_bytes
    );
    println!(
        "  telegram relay:    {}",
        enabled(config.telegram.chat_id.is_some())
    );
    println!(
        "  sheets log:        {}",
        enabled(config.sheets.spreadsheet_id.is_some())
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use incident_desk_core::config::SecretString;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_sign() {
        let cli = Cli::try_parse_from([
            "incident-desk",
            "sign",
            "--user-id",
            "42",
            "--first-name",
            "Ann",
            "--log-level",
            "debug",
        ])
        .unwrap();

        assert!(matches!(cli.log_level, LogLevel::Debug));
        match cli.command {
            Command::Sign {
                user_id,
                first_name,
                username,
                ..
            } => {
                assert_eq!(user_id, 42);
                assert_eq!(first_name.as_deref(), Some("Ann"));
                assert!(username.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "incident-desk",
            "serve",
            "--log-json",
            "--config",
            "desk.yaml",
        ])
        .unwrap();

        assert!(cli.log_json);
        assert_eq!(cli.config, Some(PathBuf::from("desk.yaml")));
        assert!(matches!(cli.command, Command::Serve));
    }

    #[test]
    fn test_verify_requires_payload() {
        assert!(Cli::try_parse_from(["incident-desk", "verify"]).is_err());
    }

    #[test]
    fn test_signed_payload_verifies() {
        let mut config = DeskConfig::default();
        config.set_bot_token(SecretString::new("123456:TEST"));

        let identity = Identity {
            username: Some("ann".to_string()),
            ..Identity::new(7)
        };
        let init_data = sign_command(&config, &identity).unwrap();

        assert!(init_data.contains("auth_date="));
        assert_eq!(config.verifier().unwrap().verify(&init_data).unwrap(), identity);
        assert!(verify_command(&config, &init_data).is_ok());
        assert!(verify_command(&config, "user=%7B%22id%22%3A7%7D&hash=00").is_err());
    }
}
