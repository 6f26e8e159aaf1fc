//! Stability scoring
//!
//! Estimates how likely a descriptor is to keep matching the same element as
//! the page evolves. Scores are heuristics in `[0, 1]`; nothing here touches a
//! document.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::strategies::class_tokens;
use crate::types::{SelectorDescriptor, SelectorSet};

pub const PRIMARY_WEIGHT: f64 = 0.5;
pub const FALLBACK_WEIGHT: f64 = 0.3;
pub const TEXT_MATCH_WEIGHT: f64 = 0.15;
pub const STRUCTURAL_WEIGHT: f64 = 0.05;

/// Score of a free-text layer when it is reported on its own.
pub const TEXT_LAYER_SCORE: f64 = 0.4;

const PATH_BASE: f64 = 0.8;
const PATH_HOP_PENALTY: f64 = 0.1;
const PATH_POSITIONAL_PENALTY: f64 = 0.2;
const PATH_FLOOR: f64 = 0.05;

static CSS_IN_JS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(css|sc|jsx|emotion|styled|svelte|tw)-[a-z0-9]{4,}$").unwrap()
});

static REACT_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^:r[0-9a-z]+:$").unwrap());

static HEX_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^[0-9a-f]{8,}$").unwrap());

static POSITIONAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i):nth-(last-)?(child|of-type)\(\s*\d+\s*\)|\[\s*\d+\s*\]|position\(\)\s*=\s*\d+")
        .unwrap()
});

const SEMANTIC_FRAGMENTS: &[&str] = &[
    "btn", "button", "nav", "menu", "header", "footer", "title", "primary", "secondary",
    "submit", "save", "cancel", "search", "login", "logout", "signin", "form", "input", "card",
    "modal", "dialog", "list", "item", "link", "active", "selected", "container", "content",
    "sidebar", "toolbar", "tab", "field", "label", "icon", "error", "success", "warning",
    "checkout", "cart", "price", "product", "avatar", "profile",
];

/// Qualitative stability tiers, ordered from worst to best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StabilityTier {
    Fragile,
    Poor,
    Fair,
    Good,
    Excellent,
}

impl StabilityTier {
    pub fn name(&self) -> &'static str {
        match self {
            StabilityTier::Fragile => "fragile",
            StabilityTier::Poor => "poor",
            StabilityTier::Fair => "fair",
            StabilityTier::Good => "good",
            StabilityTier::Excellent => "excellent",
        }
    }
}

impl fmt::Display for StabilityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Map a score onto its tier.
pub fn label(score: f64) -> StabilityTier {
    if score >= 0.9 {
        StabilityTier::Excellent
    } else if score >= 0.75 {
        StabilityTier::Good
    } else if score >= 0.5 {
        StabilityTier::Fair
    } else if score >= 0.3 {
        StabilityTier::Poor
    } else {
        StabilityTier::Fragile
    }
}

/// Stability of a single descriptor.
pub fn score(descriptor: &SelectorDescriptor) -> f64 {
    let raw = match descriptor {
        SelectorDescriptor::TestId { .. } => 1.0,
        SelectorDescriptor::AccessibilityLabel { .. } => 0.95,
        SelectorDescriptor::Identifier { value } => {
            let id = value.trim().trim_start_matches('#');
            if looks_generated(id) {
                0.4
            } else {
                0.95
            }
        }
        SelectorDescriptor::Class { value } => {
            let tokens = class_tokens(value);
            if tokens.iter().any(|token| looks_generated(token)) {
                0.3
            } else if tokens.iter().any(|token| is_semantic(token)) {
                0.8
            } else {
                0.6
            }
        }
        SelectorDescriptor::Attribute { .. } => 0.7,
        SelectorDescriptor::CustomAttribute { attribute_name, .. } => {
            let is_data = attribute_name
                .as_deref()
                .is_some_and(|name| name.trim().to_ascii_lowercase().starts_with("data-"));
            if is_data {
                0.9
            } else {
                0.85
            }
        }
        SelectorDescriptor::PathQuery { value } => path_score(css_hops(value), value),
        SelectorDescriptor::XpathQuery { value } => path_score(xpath_hops(value), value),
    };
    raw.clamp(0.0, 1.0)
}

/// Weighted stability of a whole selector set.
///
/// Absent layers contribute nothing; the weights are never renormalised, so a
/// bare primary scores exactly half its own score.
pub fn score_set(set: &SelectorSet) -> f64 {
    SetBreakdown::of(set).total
}

/// Per-layer view of [`score_set`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakdown {
    pub primary: f64,
    pub fallbacks: Vec<f64>,
    pub fallback_mean: Option<f64>,
    pub has_text_match: bool,
    pub has_structural: bool,
    pub total: f64,
    pub tier: StabilityTier,
}

impl SetBreakdown {
    pub fn of(set: &SelectorSet) -> Self {
        let primary = score(&set.primary);
        let fallbacks: Vec<f64> = set.fallbacks.iter().map(score).collect();
        let fallback_mean = if fallbacks.is_empty() {
            None
        } else {
            Some(fallbacks.iter().sum::<f64>() / fallbacks.len() as f64)
        };

        let mut total = PRIMARY_WEIGHT * primary;
        if let Some(mean) = fallback_mean {
            total += FALLBACK_WEIGHT * mean;
        }
        if set.text_match.is_some() {
            total += TEXT_MATCH_WEIGHT;
        }
        if set.structural.is_some() {
            total += STRUCTURAL_WEIGHT;
        }
        let total = total.clamp(0.0, 1.0);

        Self {
            primary,
            fallbacks,
            fallback_mean,
            has_text_match: set.text_match.is_some(),
            has_structural: set.structural.is_some(),
            total,
            tier: label(total),
        }
    }
}

/// Whether an id or class token looks machine generated.
pub fn looks_generated(token: &str) -> bool {
    let token = token.trim();
    if token.is_empty() {
        return false;
    }
    if CSS_IN_JS.is_match(token) || REACT_ID.is_match(token) || HEX_RUN.is_match(token) {
        return true;
    }
    token
        .split(|c: char| c == '-' || c == '_' || c == ':')
        .any(|segment| {
            let digits = segment.chars().filter(char::is_ascii_digit).count();
            let letters = segment.chars().filter(char::is_ascii_alphabetic).count();
            (segment.len() >= 5 && digits > 0 && letters > 0 && digits * 4 >= segment.len())
                || digits >= 4
        })
}

fn is_semantic(token: &str) -> bool {
    let token = token.to_ascii_lowercase();
    SEMANTIC_FRAGMENTS
        .iter()
        .any(|fragment| token.contains(fragment))
}

/// Whether a path or XPath pins an element by numeric position.
pub fn has_positional_index(value: &str) -> bool {
    POSITIONAL.is_match(&strip_quoted(value))
}

fn path_score(hops: usize, value: &str) -> f64 {
    let mut score = PATH_BASE - PATH_HOP_PENALTY * hops.saturating_sub(1) as f64;
    if has_positional_index(value) {
        score -= PATH_POSITIONAL_PENALTY;
    }
    score.clamp(PATH_FLOOR, 1.0)
}

/// Ancestor hops in a CSS path; the longest alternative of a list counts.
fn css_hops(value: &str) -> usize {
    let stripped = strip_quoted(value);
    stripped
        .split(',')
        .map(|alternative| {
            let spaced = alternative.replace('>', " ");
            spaced.split_whitespace().count().saturating_sub(1)
        })
        .max()
        .unwrap_or(0)
}

fn xpath_hops(value: &str) -> usize {
    let stripped = strip_quoted(value);
    let mut depth = 0usize;
    let mut steps = 0usize;
    let mut in_step = false;
    for c in stripped.chars() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            '/' if depth == 0 => in_step = false,
            c if depth == 0 && !c.is_whitespace() => {
                if !in_step {
                    steps += 1;
                    in_step = true;
                }
            }
            _ => {}
        }
    }
    // A leading `.` context step is not an ancestor.
    if stripped.trim_start().starts_with("./") {
        steps = steps.saturating_sub(1);
    }
    steps.saturating_sub(1)
}

/// Blank out quoted literals so their contents never look like syntax.
fn strip_quoted(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut quote: Option<char> = None;
    for c in value.chars() {
        match quote {
            Some(q) if c == q => {
                quote = None;
                out.push(c);
            }
            Some(_) => {}
            None => {
                if c == '\'' || c == '"' {
                    quote = Some(c);
                }
                out.push(c);
            }
        }
    }
    out
}
