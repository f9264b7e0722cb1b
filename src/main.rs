//! Bridge process entry point.
//!
//! Thin wrapper around [`Bridge`]: checks and loads the configuration
//! file, initializes logging, runs until interrupted or a fatal
//! condition arrives, and exits non-zero on fatal conditions.

use std::path::Path;
use std::process::ExitCode;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use osc_mqtt_bridge::{Bridge, BridgeConfig};

const CONFIG_PATH: &str = "config/config.yaml";
const CONFIG_EXAMPLE: &str = "config.yaml.example";

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = Path::new(CONFIG_PATH);
    if !config_path.exists() {
        if Path::new(CONFIG_EXAMPLE).exists() {
            if let Err(e) = install_example_config(config_path) {
                error!(error = %e, "could not install example configuration");
                return ExitCode::FAILURE;
            }
            info!("copied {CONFIG_EXAMPLE} to {CONFIG_PATH}; edit it before running the bridge");
        } else {
            error!("missing configuration file {CONFIG_PATH}");
        }
        return ExitCode::FAILURE;
    }

    let config = match BridgeConfig::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let mut bridge = match Bridge::start(&config).await {
        Ok(bridge) => bridge,
        Err(e) => {
            error!(error = %e, "failed to start bridge");
            return ExitCode::FAILURE;
        }
    };

    let exit = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received, shutting down");
            ExitCode::SUCCESS
        }
        fatal = bridge.wait_fatal() => {
            error!(error = %fatal, "fatal bridge error");
            ExitCode::FAILURE
        }
    };

    bridge.stop().await;
    exit
}

fn install_example_config(config_path: &Path) -> std::io::Result<()> {
    if let Some(dir) = config_path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::copy(CONFIG_EXAMPLE, config_path)?;
    Ok(())
}
