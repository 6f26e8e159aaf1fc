use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cli::output::OutputFormat;
use crate::config::WaypointConfig;

pub struct CliContext {
    config: Arc<WaypointConfig>,
    config_path: PathBuf,
    output: OutputFormat,
}

impl CliContext {
    /// `output` is the `--output` flag; the config file's format applies when it is absent.
    pub fn new(config: WaypointConfig, config_path: PathBuf, output: Option<OutputFormat>) -> Self {
        let output = output.or(config.output).unwrap_or_default();
        Self {
            config: Arc::new(config),
            config_path,
            output,
        }
    }

    pub fn config(&self) -> &WaypointConfig {
        self.config.as_ref()
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn output(&self) -> OutputFormat {
        self.output
    }
}
