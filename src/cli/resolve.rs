use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use tracing::debug;
use waypoint_locator::{scope_for, ElementResolver, LocatorEngine, ResolutionResult, WaitConfig};

use super::context::CliContext;
use super::inputs::{read_fixture, read_selector_set};
use super::observer::LogObserver;
use super::output::emit;

#[derive(Args, Clone, Debug)]
pub struct ResolveArgs {
    /// Document fixture (YAML or JSON), scripted mutations included
    #[arg(long, value_name = "FILE")]
    pub document: PathBuf,

    /// Selector set to resolve (YAML or JSON)
    #[arg(long, value_name = "FILE")]
    pub selectors: PathBuf,

    /// CSS selector of the element to search below
    #[arg(long)]
    pub scope: Option<String>,

    /// Insertion-triggered re-attempts before giving up
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Polling interval of the wait phase
    #[arg(long)]
    pub retry_interval_ms: Option<u64>,

    /// How long the wait phase may run
    #[arg(long)]
    pub timeout_ms: Option<u64>,
}

impl ResolveArgs {
    /// Flags win over the configured defaults.
    pub fn wait_config(&self, defaults: WaitConfig) -> WaitConfig {
        let mut config = defaults;
        if let Some(max) = self.max_retries {
            config = config.with_max_retries(max);
        }
        if let Some(ms) = self.retry_interval_ms {
            config = config.with_retry_interval_ms(ms);
        }
        if let Some(ms) = self.timeout_ms {
            config = config.with_mutation_timeout_ms(ms);
        }
        config
    }
}

pub async fn cmd_resolve(args: ResolveArgs, ctx: &CliContext) -> Result<()> {
    let fixture = read_fixture(&args.document).await?;
    let selectors = read_selector_set(&args.selectors).await?;
    let document = fixture.build()?;
    let scope = scope_for(document.as_ref(), args.scope.as_deref()).context("resolving --scope")?;

    let engine = LocatorEngine::new(document.clone())
        .with_defaults(args.wait_config(ctx.config().wait))
        .with_observer(Arc::new(LogObserver));

    let script = fixture.play(document);
    let result = engine.resolve(&selectors, scope, None).await;
    script.abort();
    engine.destroy();
    debug!(scripted = fixture.mutations.len(), "resolution finished");

    emit(ctx.output(), &result, print_human)?;
    if !result.succeeded {
        bail!(
            "{}",
            result
                .error_message
                .as_deref()
                .unwrap_or("element not found")
        );
    }
    Ok(())
}

fn print_human(result: &ResolutionResult) {
    if result.succeeded {
        println!(
            "Found {} via {} in {}ms",
            result
                .element
                .map(|node| node.to_string())
                .unwrap_or_default(),
            result
                .winning_attempt()
                .map(|attempt| attempt.label())
                .unwrap_or_default(),
            result.total_elapsed_ms
        );
        if let Some(selector) = &result.selector_used {
            println!("  selector: {}", selector);
        }
    } else {
        println!(
            "Not found after {}ms{}",
            result.total_elapsed_ms,
            if result.timed_out { " (timed out)" } else { "" }
        );
    }

    println!("Attempts:");
    for attempt in &result.attempts {
        println!(
            "  {:<14} {:<4} {:>6}ms  {}{}",
            attempt.label(),
            if attempt.succeeded { "ok" } else { "miss" },
            attempt.elapsed_ms,
            attempt.target,
            attempt
                .error_message
                .as_deref()
                .map(|err| format!("  ({})", err))
                .unwrap_or_default()
        );
    }
    if let Some(trigger) = result.settled_by {
        println!("Wait phase settled by {} after {} retries", trigger.name(), result.retries);
    }
    if !result.suggestions.is_empty() {
        println!("Suggestions:");
        for suggestion in &result.suggestions {
            println!("  - {}", suggestion);
        }
    }
}
