//! Tally CLI - Conversational finance assistant server
//!
//! Usage:
//!   tally serve --port 3000   Start the HTTP transport

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tally_core::reporter::LogReporter;
use tally_core::{AssistantService, Database};
use tally_server::{cascade_from_env, serve, ServerConfig};

/// Tally - Conversational finance assistant
#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Chat-driven expense tracking backend", long_about = None)]
#[command(version)]
struct Cli {
    /// Database path
    #[arg(long, default_value = "tally.db", global = true)]
    db: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set TALLY_DB_KEY environment variable with your passphrase.
    /// Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    no_encrypt: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the web server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    match cli.command {
        Commands::Serve { port, host } => cmd_serve(&cli.db, &host, port, cli.no_encrypt).await,
    }
}

async fn cmd_serve(db_path: &PathBuf, host: &str, port: u16, no_encrypt: bool) -> Result<()> {
    let path = db_path.to_string_lossy();
    let db = if no_encrypt {
        Database::new_unencrypted(&path)
    } else {
        Database::new(&path)
    }
    .with_context(|| format!("Failed to open database at {}", path))?;

    let reporter = Arc::new(LogReporter);
    let Some(cascade) = cascade_from_env(reporter) else {
        bail!(
            "No chat provider configured. Set ANTHROPIC_API_KEY (or CHAT_PROVIDER \
            with its credentials) and optionally CHAT_MODEL."
        );
    };

    let service = Arc::new(AssistantService::new(db, cascade));
    let config = ServerConfig::from_env();

    println!("Starting Tally server");
    println!("   Database: {}", db_path.display());
    println!("   Listening: http://{}:{}", host, port);
    if config.api_keys.is_empty() {
        println!("   API keys: none (open access, bind to localhost only)");
    } else {
        println!("   API keys: {} configured", config.api_keys.len());
    }

    serve(service, host, port, config).await
}
