//! Native egui/eframe dashboard for coupling_daq.
//!
//! Runs the scan loop on a background Tokio runtime and shows it in a window.
//!
//! Build:
//! ```bash
//! cargo run --features gui --bin coupling_daq_gui -- --mock
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use coupling_daq::{
    config::{AppConfig, DEFAULT_CONFIG_PATH},
    gui::ScanDashboard,
    logging::init_tracing,
    scan::ScanController,
};
use eframe::egui;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "coupling_daq_gui")]
#[command(about = "Live dashboard for the polarized coupling scan", long_about = None)]
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
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::extract_from(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    if cli.mock {
        config.instruments.force_mock();
    }
    if let Some(dir) = cli.output_dir {
        config.storage.output_dir = dir;
    }
    config.validate().context("Invalid configuration")?;

    init_tracing(&config.application.log_level);
    tracing::info!("Starting {} dashboard", config.application.name);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the Tokio runtime")?;

    let (handle, task) = runtime
        .block_on(async {
            let controller = ScanController::from_config(&config).await?;
            Ok::<_, coupling_daq::error::DaqError>(controller.spawn())
        })
        .context("Failed to initialise the bench")?;

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1400.0, 800.0])
            .with_min_inner_size([900.0, 600.0])
            .with_title(config.application.name.as_str()),
        ..Default::default()
    };

    let app_handle = handle.clone();
    let scan = config.scan.clone();
    let display = config.display.clone();
    eframe::run_native(
        "coupling_daq",
        options,
        Box::new(move |cc| Ok(Box::new(ScanDashboard::new(cc, app_handle, &scan, display)))),
    )
    .map_err(|e| anyhow::anyhow!("Dashboard failed: {e}"))?;

    runtime.block_on(async {
        if handle.shutdown().await.is_err() {
            tracing::info!("Scan loop already stopped");
        }
        task.await.context("Scan task panicked")??;
        Ok::<_, anyhow::Error>(())
    })?;
    Ok(())
}
