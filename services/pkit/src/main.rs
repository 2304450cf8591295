//! pkit: personal Google Drive and Gmail toolkit
//!
//! Each invocation is a fresh process:
//! 1. Parses the command line and loads the TOML config
//! 2. Sets up tracing on stderr
//! 3. Builds an `Authenticator` around the loopback authorization flow
//! 4. Runs one command against the authenticated transport

mod commands;
mod config;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use google_auth::{Authenticator, LocalCallbackFlow};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

#[derive(Debug, Parser)]
#[command(name = "pkit", version, about = "Personal Google Drive and Gmail toolkit")]
struct Cli {
    /// Config file (default: $PKIT_CONFIG, then ./config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Move unread mail from listed spam senders to the trash
    DeleteSpam,

    /// Download a shared Google Drive folder recursively
    DownloadDrive {
        /// Folder link or id
        link: String,

        /// Directory to download into
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// Authorize if needed and write the credentials to a file
    #[command(alias = "create_token")]
    CreateToken {
        filename: PathBuf,
    },

    /// Show the state of the cached token without contacting Google
    TokenStatus,
}

fn init_tracing(debug: bool, json: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_env("LOG_LEVEL")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let fmt = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt.json()).init();
    } else {
        registry.with(fmt).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = Config::resolve_path(cli.config.as_deref());
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    init_tracing(cli.verbose || config.settings.debug, cli.json_logs);
    debug!(path = %config_path.display(), "configuration loaded");

    let http = reqwest::Client::builder()
        .connect_timeout(config.http_timeout())
        .read_timeout(config.http_timeout())
        .build()
        .context("failed to build HTTP client")?;

    let interactive = LocalCallbackFlow::new(http.clone())
        .with_timeout(config.callback_timeout())
        .with_prompt(|url: &str| {
            println!("Visit the following URL to authorize the application:\n{url}");
        });
    let auth = Authenticator::new(config.auth_settings(), http, Box::new(interactive));

    match cli.command {
        Command::DeleteSpam => commands::delete_spam(&config, &auth).await?,
        Command::DownloadDrive { link, output } => {
            commands::download_drive(&auth, &link, &output).await?
        }
        Command::CreateToken { filename } => commands::create_token(&auth, &filename).await?,
        Command::TokenStatus => commands::token_status(&auth).await?,
    }

    info!("done");
    Ok(())
}
