use anyhow::Result;

use super::commands::Commands;
use super::context::CliContext;
use super::env::CliArgs;
use super::{cmd_config, cmd_diagnose, cmd_resolve, cmd_score, cmd_validate};

pub async fn dispatch(cli: &CliArgs, ctx: &CliContext) -> Result<()> {
    match cli.command.clone() {
        Commands::Resolve(args) => cmd_resolve(args, ctx).await,
        Commands::Score(args) => cmd_score(args, ctx).await,
        Commands::Validate(args) => cmd_validate(args, ctx).await,
        Commands::Diagnose(args) => cmd_diagnose(args, ctx).await,
        Commands::Config(args) => cmd_config(args, ctx).await,
    }
}
