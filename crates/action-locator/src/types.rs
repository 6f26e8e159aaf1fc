//! Core types for the locator

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use waypoint_core_types::{NodeId, ResolutionId};

/// One way of pointing at an element.
///
/// Closed over the kinds the matchers understand; every matcher dispatches on
/// it exhaustively. Serialized with a `kind` tag:
///
/// ```json
/// { "kind": "custom-attribute", "attributeName": "data-row", "value": "7" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SelectorDescriptor {
    /// Element `id`; a leading `#` is ignored
    Identifier { value: String },

    /// Class tokens separated by `.` or whitespace; all must be present
    Class { value: String },

    /// Plain attribute equality
    Attribute {
        #[serde(
            rename = "attributeName",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        attribute_name: Option<String>,
        value: String,
    },

    /// Attribute added for automation (usually `data-*`)
    CustomAttribute {
        #[serde(
            rename = "attributeName",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        attribute_name: Option<String>,
        value: String,
    },

    /// `aria-label` equality
    AccessibilityLabel { value: String },

    /// `data-testid` equality
    TestId { value: String },

    /// CSS-style selector path
    PathQuery { value: String },

    /// XPath expression
    XpathQuery { value: String },
}

impl SelectorDescriptor {
    pub fn identifier(value: impl Into<String>) -> Self {
        SelectorDescriptor::Identifier {
            value: value.into(),
        }
    }

    pub fn class(value: impl Into<String>) -> Self {
        SelectorDescriptor::Class {
            value: value.into(),
        }
    }

    pub fn attribute(name: impl Into<String>, value: impl Into<String>) -> Self {
        SelectorDescriptor::Attribute {
            attribute_name: Some(name.into()),
            value: value.into(),
        }
    }

    pub fn custom_attribute(name: impl Into<String>, value: impl Into<String>) -> Self {
        SelectorDescriptor::CustomAttribute {
            attribute_name: Some(name.into()),
            value: value.into(),
        }
    }

    pub fn accessibility_label(value: impl Into<String>) -> Self {
        SelectorDescriptor::AccessibilityLabel {
            value: value.into(),
        }
    }

    pub fn test_id(value: impl Into<String>) -> Self {
        SelectorDescriptor::TestId {
            value: value.into(),
        }
    }

    pub fn path_query(value: impl Into<String>) -> Self {
        SelectorDescriptor::PathQuery {
            value: value.into(),
        }
    }

    pub fn xpath_query(value: impl Into<String>) -> Self {
        SelectorDescriptor::XpathQuery {
            value: value.into(),
        }
    }

    /// Kind tag as it appears in serialized form
    pub fn kind_name(&self) -> &'static str {
        match self {
            SelectorDescriptor::Identifier { .. } => "identifier",
            SelectorDescriptor::Class { .. } => "class",
            SelectorDescriptor::Attribute { .. } => "attribute",
            SelectorDescriptor::CustomAttribute { .. } => "custom-attribute",
            SelectorDescriptor::AccessibilityLabel { .. } => "accessibility-label",
            SelectorDescriptor::TestId { .. } => "test-id",
            SelectorDescriptor::PathQuery { .. } => "path-query",
            SelectorDescriptor::XpathQuery { .. } => "xpath-query",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            SelectorDescriptor::Identifier { value }
            | SelectorDescriptor::Class { value }
            | SelectorDescriptor::Attribute { value, .. }
            | SelectorDescriptor::CustomAttribute { value, .. }
            | SelectorDescriptor::AccessibilityLabel { value }
            | SelectorDescriptor::TestId { value }
            | SelectorDescriptor::PathQuery { value }
            | SelectorDescriptor::XpathQuery { value } => value,
        }
    }

    /// Whether the descriptor is a path or XPath query
    pub fn is_path(&self) -> bool {
        matches!(
            self,
            SelectorDescriptor::PathQuery { .. } | SelectorDescriptor::XpathQuery { .. }
        )
    }
}

impl fmt::Display for SelectorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectorDescriptor::Attribute {
                attribute_name,
                value,
            }
            | SelectorDescriptor::CustomAttribute {
                attribute_name,
                value,
            } => write!(
                f,
                "{}[{}={:?}]",
                self.kind_name(),
                attribute_name.as_deref().unwrap_or("?"),
                value
            ),
            other => write!(f, "{}:{}", other.kind_name(), other.value()),
        }
    }
}

/// Match by visible text, optionally below a scoping selector.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextMatchSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exact_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope_selector: Option<String>,
}

impl TextMatchSpec {
    pub fn exact(text: impl Into<String>) -> Self {
        Self {
            exact_text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn partial(text: impl Into<String>) -> Self {
        Self {
            partial_text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn within(mut self, selector: impl Into<String>) -> Self {
        self.scope_selector = Some(selector.into());
        self
    }
}

impl fmt::Display for TextMatchSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "text")?;
        if let Some(exact) = &self.exact_text {
            write!(f, " exact={:?}", exact)?;
        }
        if let Some(partial) = &self.partial_text {
            write!(f, " partial={:?}", partial)?;
        }
        if let Some(scope) = &self.scope_selector {
            write!(f, " within {}", scope)?;
        }
        Ok(())
    }
}

/// Match by position among a parent's children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuralSpec {
    pub parent_selector: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_name_filter: Option<String>,
    /// Zero-based, counted after tag filtering
    pub child_index: usize,
}

impl StructuralSpec {
    pub fn new(parent_selector: impl Into<String>, child_index: usize) -> Self {
        Self {
            parent_selector: parent_selector.into(),
            tag_name_filter: None,
            child_index,
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag_name_filter = Some(tag.into());
        self
    }
}

impl fmt::Display for StructuralSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "structural {} > {}[{}]",
            self.parent_selector,
            self.tag_name_filter.as_deref().unwrap_or("*"),
            self.child_index
        )
    }
}

/// Everything known about how to find one element, in priority order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectorSet {
    pub primary: SelectorDescriptor,
    #[serde(default)]
    pub fallbacks: Vec<SelectorDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_match: Option<TextMatchSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structural: Option<StructuralSpec>,
}

impl SelectorSet {
    pub fn new(primary: SelectorDescriptor) -> Self {
        Self {
            primary,
            fallbacks: Vec::new(),
            text_match: None,
            structural: None,
        }
    }

    pub fn with_fallback(mut self, fallback: SelectorDescriptor) -> Self {
        self.fallbacks.push(fallback);
        self
    }

    pub fn with_text_match(mut self, spec: TextMatchSpec) -> Self {
        self.text_match = Some(spec);
        self
    }

    pub fn with_structural(mut self, spec: StructuralSpec) -> Self {
        self.structural = Some(spec);
        self
    }

    /// Primary followed by fallbacks, in the order they are tried
    pub fn descriptors(&self) -> impl Iterator<Item = &SelectorDescriptor> {
        std::iter::once(&self.primary).chain(self.fallbacks.iter())
    }
}

/// Resolution phase, in the fixed order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LocatorStrategy {
    Primary,
    Fallback,
    TextMatch,
    Structural,
    WaitRetry,
}

impl LocatorStrategy {
    /// Get strategy name as string
    pub fn name(&self) -> &'static str {
        match self {
            LocatorStrategy::Primary => "primary",
            LocatorStrategy::Fallback => "fallback",
            LocatorStrategy::TextMatch => "text-match",
            LocatorStrategy::Structural => "structural",
            LocatorStrategy::WaitRetry => "wait-retry",
        }
    }

    /// All phases in resolution order
    pub fn fallback_chain() -> Vec<LocatorStrategy> {
        vec![
            LocatorStrategy::Primary,
            LocatorStrategy::Fallback,
            LocatorStrategy::TextMatch,
            LocatorStrategy::Structural,
            LocatorStrategy::WaitRetry,
        ]
    }
}

/// The descriptor or spec a resolution ended up matching with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "layer", content = "selector", rename_all = "kebab-case")]
pub enum SelectorUsed {
    Descriptor(SelectorDescriptor),
    TextMatch(TextMatchSpec),
    Structural(StructuralSpec),
}

impl fmt::Display for SelectorUsed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectorUsed::Descriptor(descriptor) => descriptor.fmt(f),
            SelectorUsed::TextMatch(spec) => spec.fmt(f),
            SelectorUsed::Structural(spec) => spec.fmt(f),
        }
    }
}

/// One phase as it ran during a single `resolve()` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attempt {
    pub strategy: LocatorStrategy,
    /// Position in `fallbacks` for fallback attempts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_index: Option<usize>,
    /// Rendered descriptor or spec
    pub target: String,
    pub succeeded: bool,
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Attempt {
    /// Label such as `primary` or `fallback[1]`
    pub fn label(&self) -> String {
        match self.fallback_index {
            Some(index) => format!("{}[{}]", self.strategy.name(), index),
            None => self.strategy.name().to_string(),
        }
    }
}

/// What ended the wait/retry race.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SettleTrigger {
    /// The synchronous re-attempt at the start of the race
    Initial,
    /// A node insertion
    Mutation,
    /// The polling interval
    Poll,
    /// The mutation timeout
    Timeout,
    /// Structural re-attempt budget spent
    RetryBudget,
    /// The engine was destroyed
    Aborted,
}

impl SettleTrigger {
    pub fn name(&self) -> &'static str {
        match self {
            SettleTrigger::Initial => "initial",
            SettleTrigger::Mutation => "mutation",
            SettleTrigger::Poll => "poll",
            SettleTrigger::Timeout => "timeout",
            SettleTrigger::RetryBudget => "retry-budget",
            SettleTrigger::Aborted => "aborted",
        }
    }
}

/// Outcome of one `resolve()` call. Always produced, never an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionResult {
    pub resolution_id: ResolutionId,
    pub succeeded: bool,
    pub element: Option<NodeId>,
    pub selector_used: Option<SelectorUsed>,
    pub attempts: Vec<Attempt>,
    pub total_elapsed_ms: u64,
    pub failed_attempt_count: usize,
    pub error_message: Option<String>,
    pub timed_out: bool,
    pub suggestions: Vec<String>,
    /// Set when the wait/retry phase ran
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settled_by: Option<SettleTrigger>,
    /// Re-attempts made by the wait/retry phase
    #[serde(default)]
    pub retries: u32,
}

impl ResolutionResult {
    /// The attempt that produced the match, if any
    pub fn winning_attempt(&self) -> Option<&Attempt> {
        self.attempts.iter().find(|attempt| attempt.succeeded)
    }

    /// Strategy of the winning attempt
    pub fn strategy(&self) -> Option<LocatorStrategy> {
        self.winning_attempt().map(|attempt| attempt.strategy)
    }
}

/// Timing and budget of the wait/retry phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WaitConfig {
    /// Re-attempts triggered by node insertions before giving up
    pub max_retries: u32,
    pub retry_interval_ms: u64,
    pub mutation_timeout_ms: u64,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            max_retries: 10,
            retry_interval_ms: 500,
            mutation_timeout_ms: 5000,
        }
    }
}

impl WaitConfig {
    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    pub fn with_retry_interval_ms(mut self, ms: u64) -> Self {
        self.retry_interval_ms = ms;
        self
    }

    pub fn with_mutation_timeout_ms(mut self, ms: u64) -> Self {
        self.mutation_timeout_ms = ms;
        self
    }

    /// Poll period; a zero interval is treated as one millisecond.
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms.max(1))
    }

    pub fn mutation_timeout(&self) -> Duration {
        Duration::from_millis(self.mutation_timeout_ms)
    }
}
