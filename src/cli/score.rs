use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use waypoint_locator::{score, SelectorSet, SetBreakdown, TEXT_LAYER_SCORE};

use super::context::CliContext;
use super::inputs::read_selector_set;
use super::output::emit;

#[derive(Args, Clone, Debug)]
pub struct ScoreArgs {
    /// Selector set to score (YAML or JSON)
    #[arg(long, value_name = "FILE")]
    pub selectors: PathBuf,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScoreReport {
    layers: Vec<LayerScore>,
    #[serde(flatten)]
    breakdown: SetBreakdown,
}

#[derive(Debug, Serialize)]
struct LayerScore {
    layer: String,
    selector: String,
    score: f64,
}

pub async fn cmd_score(args: ScoreArgs, ctx: &CliContext) -> Result<()> {
    let set = read_selector_set(&args.selectors).await?;
    let report = ScoreReport {
        layers: layers(&set),
        breakdown: SetBreakdown::of(&set),
    };
    emit(ctx.output(), &report, print_human)
}

fn layers(set: &SelectorSet) -> Vec<LayerScore> {
    let mut layers = vec![LayerScore {
        layer: "primary".to_string(),
        selector: set.primary.to_string(),
        score: score(&set.primary),
    }];
    for (index, fallback) in set.fallbacks.iter().enumerate() {
        layers.push(LayerScore {
            layer: format!("fallback[{}]", index),
            selector: fallback.to_string(),
            score: score(fallback),
        });
    }
    if let Some(text) = &set.text_match {
        layers.push(LayerScore {
            layer: "text-match".to_string(),
            selector: text.to_string(),
            score: TEXT_LAYER_SCORE,
        });
    }
    layers
}

fn print_human(report: &ScoreReport) {
    for layer in &report.layers {
        println!("{:<12} {:.2}  {}", layer.layer, layer.score, layer.selector);
    }
    if report.breakdown.has_structural {
        println!("{:<12} present", "structural");
    }
    println!(
        "Stability {:.2} ({})",
        report.breakdown.total, report.breakdown.tier
    );
}
