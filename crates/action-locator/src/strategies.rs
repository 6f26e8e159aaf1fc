//! Element matching strategies
//!
//! One matcher per descriptor kind, plus the text and structural matchers.
//! Every matcher returns the first element in document order that passes the
//! validity filter, `Ok(None)` when nothing qualifies, and an error only for
//! descriptors that can never match as written.

use std::panic::{self, AssertUnwindSafe};

use tracing::trace;
use waypoint_core_types::NodeId;
use waypoint_dom::{Document, Scope};

use crate::errors::LocatorError;
use crate::types::{SelectorDescriptor, StructuralSpec, TextMatchSpec};
use crate::validity::is_valid_target;

/// Attribute consulted by `test-id` descriptors.
pub const TEST_ID_ATTRIBUTE: &str = "data-testid";

/// Attribute consulted by `accessibility-label` descriptors.
pub const ARIA_LABEL_ATTRIBUTE: &str = "aria-label";

/// Which half of a text match succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextMatchMode {
    Exact,
    Partial,
}

/// Resolve one descriptor below `scope`.
pub fn match_descriptor(
    document: &dyn Document,
    scope: Scope,
    descriptor: &SelectorDescriptor,
) -> Result<Option<NodeId>, LocatorError> {
    let candidates = match descriptor {
        SelectorDescriptor::Identifier { value } => {
            let id = required(descriptor, value.trim().trim_start_matches('#'))?;
            by_attribute(document, scope, "id", |v| v == id)?
        }
        SelectorDescriptor::Class { value } => {
            let tokens = class_tokens(value);
            if tokens.is_empty() {
                return Err(empty_value(descriptor));
            }
            by_attribute(document, scope, "class", |v| {
                tokens
                    .iter()
                    .all(|token| v.split_whitespace().any(|class| class == *token))
            })?
        }
        SelectorDescriptor::Attribute {
            attribute_name,
            value,
        }
        | SelectorDescriptor::CustomAttribute {
            attribute_name,
            value,
        } => {
            let name = attribute_name
                .as_deref()
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .ok_or_else(|| {
                    LocatorError::InvalidDescriptor(format!(
                        "{} descriptor is missing attributeName",
                        descriptor.kind_name()
                    ))
                })?;
            let value = required(descriptor, value)?;
            by_attribute(document, scope, name, |v| v == value)?
        }
        SelectorDescriptor::AccessibilityLabel { value } => {
            let label = required(descriptor, value.trim())?;
            by_attribute(document, scope, ARIA_LABEL_ATTRIBUTE, |v| v.trim() == label)?
        }
        SelectorDescriptor::TestId { value } => {
            let test_id = required(descriptor, value.trim())?;
            by_attribute(document, scope, TEST_ID_ATTRIBUTE, |v| v == test_id)?
        }
        SelectorDescriptor::PathQuery { value } => {
            document.query_all(scope, required(descriptor, value.trim())?)?
        }
        SelectorDescriptor::XpathQuery { value } => {
            document.evaluate_xpath(scope, required(descriptor, value.trim())?)?
        }
    };
    trace!(
        descriptor = %descriptor,
        candidates = candidates.len(),
        "descriptor candidates"
    );
    Ok(first_valid(document, candidates))
}

/// Resolve a text match: exact text first, then the partial text.
///
/// Exact comparison is case-sensitive over whitespace-normalised text;
/// partial comparison is a case-insensitive substring test. When several
/// nested elements match, the innermost one wins.
pub fn match_text(
    document: &dyn Document,
    scope: Scope,
    spec: &TextMatchSpec,
) -> Result<Option<(NodeId, TextMatchMode)>, LocatorError> {
    let exact = non_blank(spec.exact_text.as_deref()).map(normalize_whitespace);
    let partial = non_blank(spec.partial_text.as_deref()).map(|text| text.trim().to_lowercase());
    if exact.is_none() && partial.is_none() {
        return Err(LocatorError::InvalidDescriptor(
            "text match needs exactText or partialText".to_string(),
        ));
    }

    let candidates = text_candidates(document, scope, spec.scope_selector.as_deref())?;

    if let Some(exact) = exact {
        let hit = innermost_valid(document, &candidates, |text| {
            normalize_whitespace(text) == exact
        });
        if let Some(node) = hit {
            return Ok(Some((node, TextMatchMode::Exact)));
        }
    }
    if let Some(partial) = partial {
        let hit = innermost_valid(document, &candidates, |text| {
            text.to_lowercase().contains(&partial)
        });
        if let Some(node) = hit {
            return Ok(Some((node, TextMatchMode::Partial)));
        }
    }
    Ok(None)
}

/// Resolve the `child_index`-th child of the parent, after tag filtering.
pub fn match_structural(
    document: &dyn Document,
    scope: Scope,
    spec: &StructuralSpec,
) -> Result<Option<NodeId>, LocatorError> {
    let selector = spec.parent_selector.trim();
    if selector.is_empty() {
        return Err(LocatorError::InvalidDescriptor(
            "structural spec has an empty parentSelector".to_string(),
        ));
    }
    let Some(parent) = document.query_all(scope, selector)?.into_iter().next() else {
        trace!(parent = selector, "structural parent not found");
        return Ok(None);
    };
    let tag_filter = non_blank(spec.tag_name_filter.as_deref()).map(str::trim);
    let child = document
        .children(parent)
        .into_iter()
        .filter(|child| match tag_filter {
            Some(tag) => document
                .tag_name(*child)
                .is_some_and(|name| name.eq_ignore_ascii_case(tag)),
            None => true,
        })
        .nth(spec.child_index);
    Ok(child.filter(|child| is_valid_target(document, *child)))
}

/// Run a matcher, turning a panic inside the document port into an error.
pub(crate) fn guarded<T>(
    label: &str,
    matcher: impl FnOnce() -> Result<T, LocatorError>,
) -> Result<T, LocatorError> {
    match panic::catch_unwind(AssertUnwindSafe(matcher)) {
        Ok(result) => result,
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "matcher panicked".to_string());
            Err(LocatorError::StrategyFailed {
                strategy: label.to_string(),
                reason,
            })
        }
    }
}

fn required<'a>(
    descriptor: &SelectorDescriptor,
    value: &'a str,
) -> Result<&'a str, LocatorError> {
    if value.is_empty() {
        Err(empty_value(descriptor))
    } else {
        Ok(value)
    }
}

fn empty_value(descriptor: &SelectorDescriptor) -> LocatorError {
    LocatorError::InvalidDescriptor(format!(
        "{} descriptor has an empty value",
        descriptor.kind_name()
    ))
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

pub(crate) fn class_tokens(value: &str) -> Vec<&str> {
    value
        .split(|c: char| c == '.' || c.is_whitespace())
        .filter(|token| !token.is_empty())
        .collect()
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn by_attribute(
    document: &dyn Document,
    scope: Scope,
    name: &str,
    accept: impl Fn(&str) -> bool,
) -> Result<Vec<NodeId>, LocatorError> {
    Ok(document
        .descendants(scope)?
        .into_iter()
        .filter(|node| {
            document
                .attribute(*node, name)
                .is_some_and(|value| accept(&value))
        })
        .collect())
}

fn first_valid(document: &dyn Document, candidates: Vec<NodeId>) -> Option<NodeId> {
    candidates
        .into_iter()
        .find(|node| is_valid_target(document, *node))
}

/// Scope rooted at the first element matching `selector`, or the whole
/// document when the selector is absent or blank.
pub fn scope_for(document: &dyn Document, selector: Option<&str>) -> Result<Scope, LocatorError> {
    let Some(selector) = non_blank(selector).map(str::trim) else {
        return Ok(Scope::Document);
    };
    document
        .query_all(Scope::Document, selector)?
        .first()
        .map(|node| Scope::Element(*node))
        .ok_or_else(|| LocatorError::ElementNotFound(format!("scope '{}' matched nothing", selector)))
}

fn text_candidates(
    document: &dyn Document,
    scope: Scope,
    scope_selector: Option<&str>,
) -> Result<Vec<NodeId>, LocatorError> {
    let all = document.descendants(scope)?;
    let Some(selector) = non_blank(scope_selector) else {
        return Ok(all);
    };
    let roots = document.query_all(scope, selector.trim())?;
    if roots.is_empty() {
        return Err(LocatorError::ElementNotFound(format!(
            "text scope '{}' matched nothing",
            selector.trim()
        )));
    }
    Ok(all
        .into_iter()
        .filter(|node| {
            roots
                .iter()
                .any(|root| root == node || document.contains(*root, *node))
        })
        .collect())
}

fn innermost_valid(
    document: &dyn Document,
    candidates: &[NodeId],
    accept: impl Fn(&str) -> bool,
) -> Option<NodeId> {
    let matches: Vec<NodeId> = candidates
        .iter()
        .copied()
        .filter(|node| {
            document
                .text_content(*node)
                .is_some_and(|text| accept(&text))
        })
        .filter(|node| is_valid_target(document, *node))
        .collect();
    matches.iter().copied().find(|node| {
        !matches
            .iter()
            .any(|other| other != node && document.contains(*node, *other))
    })
}
