//! Monera auth service - CLI server
//!
//! ```sh
//! # Run with default config (~/.config/monera/config.toml)
//! monera
//!
//! # Custom config path
//! monera --config /etc/monera/config.toml
//!
//! # Override the API port
//! monera --api-port 8080
//!
//! # Validate config without starting
//! monera --check
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};

use monera::config::AppConfig;
use monera::server::{init_tracing, ServerHandle, ServerOptions};

/// Monera authentication service.
#[derive(Parser, Debug)]
#[command(
    name = "monera",
    version,
    about = "Authentication and session service for Monera",
    long_about = "Monera auth service: registration, login, JWT sessions, token revocation \
                  and rate limiting over a REST API.\n\n\
                  Default config: ~/.config/monera/config.toml"
)]
struct Cli {
    /// Path to the configuration file (TOML).
    #[arg(short, long, env = "MONERA_CONFIG")]
    config: Option<PathBuf>,

    /// Override the REST API listen port.
    #[arg(long)]
    api_port: Option<u16>,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(short, long)]
    log_level: Option<String>,

    /// Validate the configuration file and exit without starting the server.
    #[arg(long)]
    check: bool,

    /// Skip database migrations on startup.
    #[arg(long)]
    no_migrate: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config_path = cli.config.unwrap_or_else(monera::default_config_path);

    let mut config = match AppConfig::load(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::new("info"))
                .init();
            error!("Invalid configuration in {}: {}", config_path.display(), e);
            if cli.check {
                std::process::exit(1);
            }
            return Err(e.into());
        }
    };

    if let Some(ref level) = cli.log_level {
        config.logging.level = level.clone();
    }
    init_tracing(&config);
    info!("Configuration loaded from {}", config_path.display());

    if let Some(port) = cli.api_port {
        info!("CLI override: api_port = {}", port);
        config.server.api_port = port;
    }

    if cli.check {
        println!("Configuration is valid");
        println!("   Config file : {}", config_path.display());
        println!("   API address : {}", config.api_address());
        println!("   Database    : {}", config.database.url);
        println!("   Cache       : {:?}", config.cache.backend);
        println!("   Log level   : {}", config.logging.level);
        return Ok(());
    }

    let handle = ServerHandle::start(ServerOptions {
        config,
        auto_migrate: !cli.no_migrate,
    })
    .await?;

    handle.install_signal_handler();
    info!("Press Ctrl+C to shutdown gracefully.");

    handle.shutdown_signal().wait().await;
    handle.wait().await;

    Ok(())
}
