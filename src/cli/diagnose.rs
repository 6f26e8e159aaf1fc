use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::Args;
use waypoint_locator::{diagnose, DiagnosticsReport, ElementResolver, LocatorEngine};

use super::context::CliContext;
use super::inputs::{read_fixture, read_steps};
use super::observer::LogObserver;
use super::output::emit;

#[derive(Args, Clone, Debug)]
pub struct DiagnoseArgs {
    /// Document fixture (YAML or JSON), scripted mutations included
    #[arg(long, value_name = "FILE")]
    pub document: PathBuf,

    /// Named selector sets to resolve in order
    #[arg(long, value_name = "FILE")]
    pub steps: PathBuf,
}

pub async fn cmd_diagnose(args: DiagnoseArgs, ctx: &CliContext) -> Result<()> {
    let fixture = read_fixture(&args.document).await?;
    let steps = read_steps(&args.steps).await?;
    if steps.is_empty() {
        bail!("{} contains no steps", args.steps.display());
    }
    let document = fixture.build()?;

    let engine = LocatorEngine::new(document.clone())
        .with_defaults(ctx.config().wait)
        .with_observer(Arc::new(LogObserver));

    let script = fixture.play(document.clone());
    let report = diagnose(&engine, document.as_ref(), &steps).await;
    script.abort();
    engine.destroy();

    emit(ctx.output(), &report, print_human)?;
    if !report.all_passed() {
        bail!("{} of {} steps failed", report.failed, report.steps.len());
    }
    Ok(())
}

fn print_human(report: &DiagnosticsReport) {
    for step in &report.steps {
        println!(
            "[{}] {:<24} {:<14} {:>6}ms  stability {:.2} ({})",
            if step.passed { "PASS" } else { "FAIL" },
            step.name,
            step.strategy.as_deref().unwrap_or("-"),
            step.elapsed_ms,
            step.stability,
            step.tier
        );
        if let Some(error) = &step.error_message {
            println!("       {}", error);
        }
    }
    println!(
        "{} passed, {} failed in {}ms",
        report.passed, report.failed, report.total_elapsed_ms
    );
}
