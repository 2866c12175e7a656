use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shelter::{config::Config, http, storage::Store};
use tokio::fs;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Shelter - secret-gated file hosting with per-upload encryption
#[derive(Parser)]
#[command(name = "shelterd")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.json")]
    config: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a starter configuration with a freshly generated secret
    Init {
        /// Storage root directory
        #[arg(short, long, default_value = "uploads")]
        upload_folder: String,

        /// Listen port
        #[arg(short, long, default_value_t = 8282)]
        port: u16,
    },

    /// Run the HTTP server (default)
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Use RUST_LOG to control log level (e.g. RUST_LOG=info,shelter=debug)
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_thread_ids(false)
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Init {
            upload_folder,
            port,
        } => cmd_init(&cli.config, &upload_folder, port).await,
        Commands::Serve => cmd_serve(&cli.config).await,
    }
}

async fn cmd_init(config_path: &str, upload_folder: &str, port: u16) -> Result<()> {
    if fs::try_exists(config_path).await.unwrap_or(false) {
        anyhow::bail!(
            "Configuration file '{}' already exists. Remove it first or use a different path.",
            config_path
        );
    }

    let cfg = Config {
        port,
        upload_folder: upload_folder.to_string(),
        ..Config::default()
    };

    fs::create_dir_all(upload_folder)
        .await
        .with_context(|| format!("creating storage directory '{}'", upload_folder))?;

    let config_json = serde_json::to_string_pretty(&cfg)?;
    fs::write(config_path, config_json)
        .await
        .with_context(|| format!("writing config to '{}'", config_path))?;

    println!("Initialization complete!");
    println!("Config:  {}", config_path);
    println!("Storage: {}", upload_folder);
    println!("Port:    {}", port);
    println!();
    println!("Upload secret: {}", cfg.secrets[0]);
    println!("Anyone holding this secret can upload files. Keep it private.");

    Ok(())
}

async fn cmd_serve(config_path: &str) -> Result<()> {
    let cfg = Config::load_with_env(Some(config_path))?;
    info!(config = config_path, port = cfg.port, "shelter starting");

    let store = Arc::new(Store::new(&cfg).await?);
    http::serve(&cfg, store).await
}
