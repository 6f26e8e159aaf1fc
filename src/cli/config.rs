use anyhow::Result;
use clap::{Args, Subcommand};

use crate::cli::context::CliContext;
use crate::cli::output::{emit, OutputFormat};

#[derive(Args, Clone, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Clone, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration (file plus environment overrides)
    Show,

    /// Validate configuration
    Validate,
}

pub async fn cmd_config(args: ConfigArgs, ctx: &CliContext) -> Result<()> {
    let path = ctx.config_path();
    match args.action {
        ConfigAction::Show => {
            let format = match ctx.output() {
                OutputFormat::Human => OutputFormat::Yaml,
                other => other,
            };
            if ctx.output() == OutputFormat::Human {
                println!("Current configuration ({}):", path.display());
            }
            emit(format, ctx.config(), |_| {})?;
        }
        ConfigAction::Validate => {
            // Loading already validated it; reaching here means it is usable.
            if path.exists() {
                println!("Configuration file {} is valid", path.display());
            } else {
                println!(
                    "No configuration file at {}; defaults are valid",
                    path.display()
                );
            }
        }
    }

    Ok(())
}
