use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Args;
use waypoint_locator::{validate_selector_set, ValidationReport};

use super::context::CliContext;
use super::inputs::read_selector_set;
use super::output::emit;

#[derive(Args, Clone, Debug)]
pub struct ValidateArgs {
    /// Selector set to check (YAML or JSON)
    #[arg(long, value_name = "FILE")]
    pub selectors: PathBuf,

    /// Minimum stability score; defaults to the configured threshold
    #[arg(long)]
    pub threshold: Option<f64>,
}

pub async fn cmd_validate(args: ValidateArgs, ctx: &CliContext) -> Result<()> {
    let threshold = args.threshold.unwrap_or(ctx.config().publish_threshold);
    if !(0.0..=1.0).contains(&threshold) {
        bail!("threshold must be within [0, 1], got {}", threshold);
    }

    let set = read_selector_set(&args.selectors).await?;
    let report = validate_selector_set(&set, threshold);
    emit(ctx.output(), &report, print_human)?;

    if !report.publishable {
        bail!(
            "selector set blocked: stability {:.2} is below {:.2}",
            report.score,
            report.threshold
        );
    }
    Ok(())
}

fn print_human(report: &ValidationReport) {
    println!(
        "{}: stability {:.2} ({}), threshold {:.2}",
        if report.publishable { "Publishable" } else { "Blocked" },
        report.score,
        report.tier,
        report.threshold
    );
    for warning in &report.warnings {
        println!("  warning: {}", warning);
    }
}
