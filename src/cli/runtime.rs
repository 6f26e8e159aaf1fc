use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::fs;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::WaypointConfig;

pub const LOCAL_CONFIG_PATH: &str = "waypoint.yaml";

pub fn init_logging(level: &str, debug: bool) -> Result<()> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        level.parse().context("Invalid log level")?
    };

    // Reports go to stdout; keep logs on stderr so they can be piped.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string())),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    Ok(())
}

pub struct LoadedConfig {
    pub config: WaypointConfig,
    pub path: PathBuf,
}

/// Read the config file, apply `WAYPOINT_*` overrides and validate the result.
pub async fn load_config(config_path: Option<&PathBuf>) -> Result<LoadedConfig> {
    let config_path = match config_path {
        Some(path) => path.clone(),
        None => {
            // Priority: ./waypoint.yaml > ~/.config/waypoint/config.yaml
            let local_config = PathBuf::from(LOCAL_CONFIG_PATH);
            if local_config.exists() {
                local_config
            } else {
                let mut path = dirs::config_dir().context("Failed to get config directory")?;
                path.push("waypoint");
                path.push("config.yaml");
                path
            }
        }
    };

    let mut config = if config_path.exists() {
        let content = fs::read_to_string(&config_path)
            .await
            .context("Failed to read config file")?;

        let config: WaypointConfig =
            serde_yaml::from_str(&content).context("Failed to parse config file")?;

        info!("Loaded configuration from: {}", config_path.display());
        config
    } else {
        warn!(
            "Config file not found, using defaults: {}",
            config_path.display()
        );
        WaypointConfig::default()
    };

    config
        .apply_env_overrides()
        .context("Failed to apply environment overrides")?;
    config
        .validate()
        .with_context(|| format!("Invalid configuration in {}", config_path.display()))?;

    Ok(LoadedConfig {
        config,
        path: config_path,
    })
}
