//! Clypr bridge binary.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use clypr_bridge::bootstrap::Bridge;
use clypr_bridge::config::Config;

/// Relay Clypr notification jobs to email, Telegram and webhooks.
#[derive(Parser, Debug)]
#[command(name = "clypr-bridge", version, about, long_about = None)]
struct Cli {
    /// YAML config file; a missing file means defaults plus environment.
    #[arg(short, long, default_value = "clypr-bridge.yaml")]
    config: PathBuf,

    /// Listener port, overriding PORT and the config file.
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = load_config(&cli).await;
    let level = config
        .as_ref()
        .map_or("info", |c| c.logging.level.as_str());
    init_tracing(level);

    let result = match config {
        Ok(config) => run(config).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Bridge stopped");
            ExitCode::FAILURE
        }
    }
}

async fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(&cli.config).await?;
    config.apply_process_env()?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    Ok(config)
}

async fn run(config: Config) -> Result<()> {
    Bridge::connect(&config).await?.run().await
}

/// `RUST_LOG` wins over the configured level.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("clypr_bridge={level},{level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
