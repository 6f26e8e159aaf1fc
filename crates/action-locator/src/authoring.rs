//! Authoring-time helpers: publish validation and step diagnostics

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info};
use waypoint_dom::Document;

use crate::resolver::ElementResolver;
use crate::scoring::{has_positional_index, label, score, SetBreakdown, StabilityTier};
use crate::strategies::scope_for;
use crate::types::*;

/// Minimum set score a selector set needs before it can be published.
pub const DEFAULT_PUBLISH_THRESHOLD: f64 = 0.5;

/// Primary descriptors scoring below this are flagged as fragile.
const FRAGILE_PRIMARY_BELOW: f64 = 0.5;

/// Something a recorder should fix or at least look at before publishing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "kebab-case")]
pub enum ValidationWarning {
    NoFallbacks,
    NoTextMatch,
    FragilePrimary { score: f64 },
    PositionalPath { layer: String },
    DuplicateFallback { index: usize },
    MalformedDescriptor { layer: String, reason: String },
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationWarning::NoFallbacks => write!(f, "no fallback descriptors"),
            ValidationWarning::NoTextMatch => write!(f, "no text match layer"),
            ValidationWarning::FragilePrimary { score } => {
                write!(f, "primary descriptor is fragile (score {:.2})", score)
            }
            ValidationWarning::PositionalPath { layer } => {
                write!(f, "{} depends on a positional index", layer)
            }
            ValidationWarning::DuplicateFallback { index } => {
                write!(f, "fallback[{}] duplicates the primary", index)
            }
            ValidationWarning::MalformedDescriptor { layer, reason } => {
                write!(f, "{} is malformed: {}", layer, reason)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub score: f64,
    pub tier: StabilityTier,
    pub threshold: f64,
    pub publishable: bool,
    pub breakdown: SetBreakdown,
    pub warnings: Vec<ValidationWarning>,
}

/// Decide whether a recorded selector set is stable enough to publish.
///
/// Only the score gates publishing; warnings are advisory.
pub fn validate_selector_set(set: &SelectorSet, threshold: f64) -> ValidationReport {
    let breakdown = SetBreakdown::of(set);
    let mut warnings = Vec::new();

    if set.fallbacks.is_empty() {
        warnings.push(ValidationWarning::NoFallbacks);
    }
    if set.text_match.is_none() {
        warnings.push(ValidationWarning::NoTextMatch);
    }
    let primary_score = score(&set.primary);
    if primary_score < FRAGILE_PRIMARY_BELOW {
        warnings.push(ValidationWarning::FragilePrimary {
            score: primary_score,
        });
    }

    let layers = std::iter::once(("primary".to_string(), &set.primary)).chain(
        set.fallbacks
            .iter()
            .enumerate()
            .map(|(index, fallback)| (format!("fallback[{}]", index), fallback)),
    );
    for (layer, descriptor) in layers {
        if let Some(reason) = malformed(descriptor) {
            warnings.push(ValidationWarning::MalformedDescriptor {
                layer: layer.clone(),
                reason,
            });
        }
        if descriptor.is_path() && has_positional_index(descriptor.value()) {
            warnings.push(ValidationWarning::PositionalPath { layer });
        }
    }
    for (index, fallback) in set.fallbacks.iter().enumerate() {
        if *fallback == set.primary {
            warnings.push(ValidationWarning::DuplicateFallback { index });
        }
    }

    let publishable = breakdown.total >= threshold;
    debug!(
        score = breakdown.total,
        threshold,
        publishable,
        warnings = warnings.len(),
        "validated selector set"
    );
    ValidationReport {
        score: breakdown.total,
        tier: breakdown.tier,
        threshold,
        publishable,
        breakdown,
        warnings,
    }
}

/// Problems that make a descriptor unmatchable regardless of the document.
fn malformed(descriptor: &SelectorDescriptor) -> Option<String> {
    match descriptor {
        SelectorDescriptor::Attribute { attribute_name, .. }
        | SelectorDescriptor::CustomAttribute { attribute_name, .. }
            if attribute_name
                .as_deref()
                .map_or(true, |name| name.trim().is_empty()) =>
        {
            Some("missing attributeName".to_string())
        }
        other if other.value().trim().trim_start_matches(['#', '.']).is_empty() => {
            Some("empty value".to_string())
        }
        _ => None,
    }
}

/// One named selector set to exercise against a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticStep {
    pub name: String,
    pub selectors: SelectorSet,
    /// CSS selector for the scope element; the whole document when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait: Option<WaitConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepReport {
    pub name: String,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector_used: Option<String>,
    pub attempts: usize,
    pub elapsed_ms: u64,
    pub stability: f64,
    pub tier: StabilityTier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsReport {
    pub steps: Vec<StepReport>,
    pub passed: usize,
    pub failed: usize,
    pub total_elapsed_ms: u64,
}

impl DiagnosticsReport {
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

/// Resolve each step in order and report how it went.
pub async fn diagnose(
    engine: &dyn ElementResolver,
    document: &dyn Document,
    steps: &[DiagnosticStep],
) -> DiagnosticsReport {
    let started = Instant::now();
    let mut report = DiagnosticsReport::default();

    for step in steps {
        let stability = crate::scoring::score_set(&step.selectors);
        let step_report = match scope_for(document, step.scope.as_deref()) {
            Ok(scope) => {
                let result = engine.resolve(&step.selectors, scope, step.wait).await;
                StepReport {
                    name: step.name.clone(),
                    passed: result.succeeded,
                    strategy: result.winning_attempt().map(Attempt::label),
                    selector_used: result.selector_used.as_ref().map(ToString::to_string),
                    attempts: result.attempts.len(),
                    elapsed_ms: result.total_elapsed_ms,
                    stability,
                    tier: label(stability),
                    error_message: result.error_message,
                }
            }
            Err(err) => StepReport {
                name: step.name.clone(),
                passed: false,
                strategy: None,
                selector_used: None,
                attempts: 0,
                elapsed_ms: 0,
                stability,
                tier: label(stability),
                error_message: Some(err.to_string()),
            },
        };

        debug!(step = %step_report.name, passed = step_report.passed, "diagnosed step");
        if step_report.passed {
            report.passed += 1;
        } else {
            report.failed += 1;
        }
        report.steps.push(step_report);
    }

    report.total_elapsed_ms = started.elapsed().as_millis() as u64;
    info!(
        passed = report.passed,
        failed = report.failed,
        "Diagnostics finished"
    );
    report
}
