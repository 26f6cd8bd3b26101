//! CLI Entry Point for coupling_daq
//!
//! Runs the scan loop headless with an operator console on stdin.
//!
//! # Usage
//!
//! Synthetic bench, scan right away from file id 7:
//! ```bash
//! coupling_daq --mock --autostart --file-id 7 --output-dir ./save/test
//! ```
//!
//! Real instruments (needs the `instrument_visa` feature):
//! ```bash
//! coupling_daq --config config/coupling.toml
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use coupling_daq::{
    config::{AppConfig, DEFAULT_CONFIG_PATH},
    console::{run_console, StartDefaults},
    logging::init_tracing,
    scan::ScanController,
};
use std::path::PathBuf;
use tokio::io::BufReader;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "coupling_daq")]
#[command(about = "Piezo-scanned polarized coupling acquisition", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Use synthetic instruments instead of the configured ones
    #[arg(long)]
    mock: bool,

    /// Override the checkpoint directory
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Start scanning immediately
    #[arg(long)]
    autostart: bool,

    /// File id of the first checkpoint
    #[arg(long)]
    file_id: Option<u64>,

    /// Starting piezo position
    #[arg(long, allow_negative_numbers = true)]
    piezo_start: Option<f64>,

    /// Log level (overrides the configuration)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::extract_from(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    if cli.mock {
        config.instruments.force_mock();
    }
    if let Some(dir) = cli.output_dir {
        config.storage.output_dir = dir;
    }
    if let Some(level) = cli.log_level {
        config.application.log_level = level;
    }
    config.validate().context("Invalid configuration")?;

    init_tracing(&config.application.log_level);
    info!("Starting {}", config.application.name);

    let defaults = StartDefaults {
        file_id: cli.file_id.unwrap_or(config.scan.file_id_start),
        piezo_start: cli.piezo_start.unwrap_or(config.scan.piezo_start),
    };

    let controller = ScanController::from_config(&config)
        .await
        .context("Failed to initialise the bench")?;
    let (handle, task) = controller.spawn();

    if cli.autostart {
        handle.start(defaults.file_id, defaults.piezo_start).await?;
    }
    info!("Type 'help' for commands");

    let stdin = BufReader::new(tokio::io::stdin());
    tokio::select! {
        result = run_console(stdin, &handle, defaults) => {
            if let Err(e) = result {
                error!("Console stopped: {e}");
            }
        }
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    if handle.shutdown().await.is_err() {
        info!("Scan loop already stopped");
    }
    task.await.context("Scan task panicked")??;

    let last = handle.latest();
    info!(
        "Finished: piezo {:.2}, next file id {}, {} checkpoints written",
        last.piezo_position, last.file_id, last.checkpoints_written
    );
    Ok(())
}
