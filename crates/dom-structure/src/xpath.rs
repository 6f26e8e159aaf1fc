//! XPath subset evaluator.
//!
//! Supported: absolute (`/a/b`), anywhere (`//a`), and context-relative
//! (`./a`, `.//a`) location paths over the child and descendant axes, name
//! tests and `*`, and the predicates `[n]`, `[last()]`, `[@attr]`,
//! `[@attr='v']`, `[text()='v']`, `[contains(text(),'v')]` and
//! `[contains(@attr,'v')]`.

use std::collections::HashSet;

use waypoint_core_types::NodeId;

use crate::errors::QueryError;
use crate::port::Scope;
use crate::tree::{Arena, NodeData};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Origin {
    Document,
    Context,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
}

#[derive(Clone, Debug, PartialEq)]
enum Predicate {
    Position(usize),
    Last,
    HasAttr(String),
    AttrEquals(String, String),
    AttrContains(String, String),
    TextEquals(String),
    TextContains(String),
}

impl Predicate {
    fn matches(&self, data: &NodeData) -> bool {
        match self {
            Predicate::HasAttr(name) => data.attr(name).is_some(),
            Predicate::AttrEquals(name, value) => data.attr(name) == Some(value.as_str()),
            Predicate::AttrContains(name, value) => data
                .attr(name)
                .map(|actual| actual.contains(value.as_str()))
                .unwrap_or(false),
            Predicate::TextEquals(value) => normalize(&data.text) == *value,
            Predicate::TextContains(value) => data.text.contains(value.as_str()),
            Predicate::Position(_) | Predicate::Last => true,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
struct Step {
    axis: Axis,
    name: String,
    predicates: Vec<Predicate>,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct LocationPath {
    origin: Origin,
    steps: Vec<Step>,
}

impl LocationPath {
    pub fn evaluate(&self, arena: &Arena, scope: Scope) -> Result<Vec<NodeId>, QueryError> {
        let allowed: Option<HashSet<NodeId>> = match scope {
            Scope::Document => None,
            Scope::Element(_) => Some(arena.scope_nodes(scope)?.into_iter().collect()),
        };

        // `None` stands for the document node sitting above the root element.
        let mut context: Vec<Option<NodeId>> = match (self.origin, scope) {
            (Origin::Context, Scope::Element(id)) => vec![Some(id)],
            _ => vec![None],
        };

        for step in &self.steps {
            let mut next = Vec::new();
            let mut seen = HashSet::new();
            for ctx in &context {
                for base in expand(arena, *ctx, step.axis) {
                    let candidates: Vec<NodeId> = children_of(arena, base)
                        .into_iter()
                        .filter(|child| {
                            arena
                                .get(*child)
                                .map(|data| step.name == "*" || data.tag == step.name)
                                .unwrap_or(false)
                        })
                        .collect();
                    for node in apply_predicates(arena, candidates, &step.predicates) {
                        if seen.insert(node) {
                            next.push(Some(node));
                        }
                    }
                }
            }
            context = next;
        }

        let order: Vec<NodeId> = arena.scope_nodes(Scope::Document)?;
        let selected: HashSet<NodeId> = context.into_iter().flatten().collect();
        Ok(order
            .into_iter()
            .filter(|node| selected.contains(node))
            .filter(|node| allowed.as_ref().map(|set| set.contains(node)).unwrap_or(true))
            .collect())
    }
}

fn children_of(arena: &Arena, node: Option<NodeId>) -> Vec<NodeId> {
    match node {
        None => vec![arena.root()],
        Some(id) => arena.children(id).to_vec(),
    }
}

/// Context nodes whose children a step inspects.
fn expand(arena: &Arena, ctx: Option<NodeId>, axis: Axis) -> Vec<Option<NodeId>> {
    match axis {
        Axis::Child => vec![ctx],
        Axis::Descendant => {
            let mut out = vec![ctx];
            let below = match ctx {
                None => {
                    let root = arena.root();
                    let mut all = vec![root];
                    all.extend(arena.descendants(root));
                    all
                }
                Some(id) => arena.descendants(id),
            };
            out.extend(below.into_iter().map(Some));
            out
        }
    }
}

fn apply_predicates(arena: &Arena, mut nodes: Vec<NodeId>, predicates: &[Predicate]) -> Vec<NodeId> {
    for predicate in predicates {
        nodes = match predicate {
            Predicate::Position(n) => nodes.get(n - 1).copied().into_iter().collect(),
            Predicate::Last => nodes.last().copied().into_iter().collect(),
            other => nodes
                .into_iter()
                .filter(|node| arena.get(*node).map(|d| other.matches(d)).unwrap_or(false))
                .collect(),
        };
    }
    nodes
}

fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub(crate) fn parse(input: &str) -> Result<LocationPath, QueryError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(QueryError::xpath(input, "empty expression"));
    }

    let (origin, mut rest) = if let Some(rest) = trimmed.strip_prefix('.') {
        if !rest.starts_with('/') {
            return Err(QueryError::xpath(input, "expected '/' after '.'"));
        }
        (Origin::Context, rest)
    } else if trimmed.starts_with('/') {
        (Origin::Document, trimmed)
    } else {
        return Err(QueryError::xpath(
            input,
            "expression must start with '/', '//' or '.'",
        ));
    };

    let mut steps = Vec::new();
    while !rest.is_empty() {
        let (axis, after) = if let Some(after) = rest.strip_prefix("//") {
            (Axis::Descendant, after)
        } else if let Some(after) = rest.strip_prefix('/') {
            (Axis::Child, after)
        } else {
            return Err(QueryError::xpath(input, format!("unexpected '{}'", rest)));
        };
        let end = step_end(after).ok_or_else(|| QueryError::xpath(input, "unbalanced '['"))?;
        let raw = &after[..end];
        steps.push(parse_step(input, raw, axis)?);
        rest = &after[end..];
    }

    Ok(LocationPath { origin, steps })
}

/// Byte offset where the step starting at `text` ends, respecting brackets and quotes.
fn step_end(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (idx, c) in text.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '[') => depth += 1,
            (None, ']') => depth = depth.checked_sub(1)?,
            (None, '/') if depth == 0 => return Some(idx),
            _ => {}
        }
    }
    if depth == 0 && quote.is_none() {
        Some(text.len())
    } else {
        None
    }
}

fn parse_step(input: &str, raw: &str, axis: Axis) -> Result<Step, QueryError> {
    let (name, mut preds) = match raw.find('[') {
        Some(idx) => (&raw[..idx], &raw[idx..]),
        None => (raw, ""),
    };
    let name = name.trim();
    if name.is_empty() {
        return Err(QueryError::xpath(input, "empty location step"));
    }
    if name.starts_with('@') || name.contains("::") || name.contains('(') || name == ".." {
        return Err(QueryError::Unsupported {
            language: "xpath",
            input: input.to_string(),
            construct: name.to_string(),
        });
    }
    if !name
        .chars()
        .all(|c| c == '*' || c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(QueryError::xpath(input, format!("invalid name test '{}'", name)));
    }

    let mut predicates = Vec::new();
    while !preds.is_empty() {
        if !preds.starts_with('[') {
            return Err(QueryError::xpath(input, format!("unexpected '{}'", preds)));
        }
        let close = bracket_end(preds).ok_or_else(|| QueryError::xpath(input, "unbalanced '['"))?;
        predicates.push(parse_predicate(input, preds[1..close].trim())?);
        preds = &preds[close + 1..];
    }

    Ok(Step {
        axis,
        name: name.to_ascii_lowercase(),
        predicates,
    })
}

fn bracket_end(text: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (idx, c) in text.char_indices().skip(1) {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, ']') => return Some(idx),
            _ => {}
        }
    }
    None
}

fn parse_predicate(input: &str, body: &str) -> Result<Predicate, QueryError> {
    if body.is_empty() {
        return Err(QueryError::xpath(input, "empty predicate"));
    }
    if body.chars().all(|c| c.is_ascii_digit()) {
        return match body.parse::<usize>() {
            Ok(n) if n > 0 => Ok(Predicate::Position(n)),
            _ => Err(QueryError::xpath(input, "positions start at 1")),
        };
    }
    if body == "last()" {
        return Ok(Predicate::Last);
    }
    if has_boolean_operator(body) {
        return Err(QueryError::Unsupported {
            language: "xpath",
            input: input.to_string(),
            construct: format!("[{}]", body),
        });
    }
    if let Some(args) = body
        .strip_prefix("contains(")
        .and_then(|rest| rest.strip_suffix(')'))
    {
        let (target, literal) = args
            .split_once(',')
            .ok_or_else(|| QueryError::xpath(input, "contains() takes two arguments"))?;
        let value = literal_value(input, literal.trim())?;
        let target = target.trim();
        if target == "text()" || target == "." {
            return Ok(Predicate::TextContains(value));
        }
        if let Some(attr) = target.strip_prefix('@') {
            return Ok(Predicate::AttrContains(attr.to_string(), value));
        }
        return Err(QueryError::xpath(input, format!("cannot apply contains() to '{}'", target)));
    }
    if let Some((lhs, rhs)) = body.split_once('=') {
        let lhs = lhs.trim();
        let value = literal_value(input, rhs.trim())?;
        if lhs == "text()" || lhs == "." {
            return Ok(Predicate::TextEquals(value));
        }
        if let Some(attr) = lhs.strip_prefix('@') {
            return Ok(Predicate::AttrEquals(attr.to_string(), value));
        }
        return Err(QueryError::xpath(input, format!("cannot compare '{}'", lhs)));
    }
    if let Some(attr) = body.strip_prefix('@') {
        if !attr.is_empty() && attr.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_') {
            return Ok(Predicate::HasAttr(attr.to_string()));
        }
    }
    Err(QueryError::Unsupported {
        language: "xpath",
        input: input.to_string(),
        construct: format!("[{}]", body),
    })
}

/// `and`/`or` outside string literals.
fn has_boolean_operator(body: &str) -> bool {
    let mut quote: Option<char> = None;
    let mut bare = String::with_capacity(body.len());
    for c in body.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => {
                quote = Some(c);
                bare.push(' ');
            }
            (None, c) => bare.push(c),
        }
    }
    bare.split(|c: char| c.is_whitespace() || c == '(' || c == ')')
        .any(|word| word == "and" || word == "or")
}

fn literal_value(input: &str, raw: &str) -> Result<String, QueryError> {
    let mut chars = raw.chars();
    match (chars.next(), raw.chars().last()) {
        (Some(open @ ('\'' | '"')), Some(close)) if open == close && raw.len() >= 2 => {
            let inner = &raw[1..raw.len() - 1];
            if inner.contains(open) {
                return Err(QueryError::Unsupported {
                    language: "xpath",
                    input: input.to_string(),
                    construct: raw.to_string(),
                });
            }
            Ok(inner.to_string())
        }
        _ => Err(QueryError::xpath(input, format!("expected a quoted literal, found '{}'", raw))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_absolute_and_anywhere_paths() {
        let path = parse("/html/body//button[@type='submit'][2]").unwrap();
        assert_eq!(path.origin, Origin::Document);
        assert_eq!(path.steps.len(), 3);
        assert_eq!(path.steps[2].axis, Axis::Descendant);
        assert_eq!(
            path.steps[2].predicates,
            vec![
                Predicate::AttrEquals("type".into(), "submit".into()),
                Predicate::Position(2)
            ]
        );
    }

    #[test]
    fn keeps_slashes_inside_literals() {
        let path = parse("//a[@href='/docs/start']").unwrap();
        assert_eq!(path.steps.len(), 1);
        assert_eq!(
            path.steps[0].predicates[0],
            Predicate::AttrEquals("href".into(), "/docs/start".into())
        );
    }

    #[test]
    fn parses_text_predicates() {
        let path = parse(".//span[contains(text(), 'Save')]").unwrap();
        assert_eq!(path.origin, Origin::Context);
        assert_eq!(
            path.steps[0].predicates[0],
            Predicate::TextContains("Save".into())
        );
    }

    #[test]
    fn compound_predicates_are_unsupported() {
        for bad in [
            "//button[@type='submit' and @data-testid='save']",
            "//a[text()='Docs' or text()='Pricing']",
            "//a[contains(@href, 'docs') and @class]",
            "//a[@title='it's']",
        ] {
            let err = parse(bad).unwrap_err();
            assert!(
                matches!(err, QueryError::Unsupported { .. }),
                "{bad:?} should be unsupported, got {err:?}"
            );
        }
        // Operator words inside literals are plain text.
        let path = parse("//a[text()='this and that']").unwrap();
        assert_eq!(
            path.steps[0].predicates[0],
            Predicate::TextEquals("this and that".into())
        );
    }

    #[test]
    fn rejects_malformed_expressions() {
        for bad in ["", "button", "//div[", "//div[@id=unquoted]", "/html//", "//div[0]", "//div[]"] {
            let err = parse(bad).unwrap_err();
            assert!(err.is_syntax(), "{bad:?} should be rejected, got {err:?}");
        }
    }

    #[test]
    fn reports_unsupported_axes() {
        assert!(matches!(
            parse("//div/following-sibling::span").unwrap_err(),
            QueryError::Unsupported { .. }
        ));
    }
}
