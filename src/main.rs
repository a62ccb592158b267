use std::process::ExitCode;

use anyhow::{Context, Result};
use idle_blur_overlay::{OverlayConfig, StopReason, config::setup_logging, run_overlay};
use tracing::{error, info};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    setup_logging();

    info!("Starting idle-blur-overlay");

    match run_application().await {
        Ok(reason) => {
            info!("Exited cleanly after {}", reason);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Overlay error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_application() -> Result<StopReason> {
    let config = OverlayConfig::from_env();
    run_overlay(config)
        .await
        .context("Overlay stopped abnormally; resources released")
}
