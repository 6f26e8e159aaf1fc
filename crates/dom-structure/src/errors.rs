//! Error types for document queries and fixtures

use thiserror::Error;
use waypoint_core_types::NodeId;

/// Errors raised while querying a document.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum QueryError {
    /// The query text could not be parsed
    #[error("invalid {language} '{input}': {reason}")]
    Syntax {
        language: &'static str,
        input: String,
        reason: String,
    },

    /// The query parsed but uses a construct this engine does not evaluate
    #[error("unsupported {language} construct in '{input}': {construct}")]
    Unsupported {
        language: &'static str,
        input: String,
        construct: String,
    },

    /// The node is not (or no longer) part of the document
    #[error("unknown node: {0}")]
    UnknownNode(NodeId),
}

impl QueryError {
    pub(crate) fn css(input: &str, reason: impl Into<String>) -> Self {
        QueryError::Syntax {
            language: "selector",
            input: input.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn xpath(input: &str, reason: impl Into<String>) -> Self {
        QueryError::Syntax {
            language: "xpath",
            input: input.to_string(),
            reason: reason.into(),
        }
    }

    /// Syntax problems are the author's fault and never fix themselves.
    pub fn is_syntax(&self) -> bool {
        matches!(
            self,
            QueryError::Syntax { .. } | QueryError::Unsupported { .. }
        )
    }
}

/// Errors raised while loading or applying a document fixture.
#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("failed to parse fixture: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("fixture target '{selector}' matched nothing")]
    TargetNotFound { selector: String },

    #[error(transparent)]
    Query(#[from] QueryError),
}
