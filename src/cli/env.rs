use clap::Parser;
use std::path::PathBuf;

use super::commands::Commands;

/// Waypoint - resilient element location with stability scoring
#[derive(Parser)]
#[command(name = "waypoint", author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct CliArgs {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// Enable debug mode
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Output format (defaults to the configured format, then human)
    #[arg(short, long, global = true)]
    pub output: Option<crate::cli::output::OutputFormat>,

    #[command(subcommand)]
    pub command: Commands,
}
