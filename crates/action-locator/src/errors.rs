//! Error types for the locator

use thiserror::Error;
use waypoint_dom::QueryError;

/// Locator error enumeration
///
/// None of these escape `resolve()`; each one ends up as the message of a
/// failed attempt or of the final result.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LocatorError {
    /// Descriptor is malformed (bad query syntax, empty value, missing attribute name)
    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(String),

    /// Descriptor is well formed but matched no valid element
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// The scope element is no longer part of the document
    #[error("Stale scope: {0}")]
    StaleScope(String),

    /// A matcher failed for a reason other than the above
    #[error("Strategy '{strategy}' failed: {reason}")]
    StrategyFailed { strategy: String, reason: String },

    /// Mutation timeout reached before any strategy matched
    #[error("Resolution timeout: {0}")]
    Timeout(String),

    /// Structural re-attempt budget spent before any strategy matched
    #[error("Retry budget exhausted: {0}")]
    RetryBudgetExhausted(String),

    /// The engine was destroyed while (or before) resolving
    #[error("Resolution aborted: {0}")]
    Aborted(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LocatorError {
    /// Check if error is retryable
    ///
    /// Syntax problems never fix themselves; the wait phase stops re-running
    /// a descriptor once it fails this way.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LocatorError::ElementNotFound(_)
                | LocatorError::StaleScope(_)
                | LocatorError::StrategyFailed { .. }
        )
    }
}

impl From<QueryError> for LocatorError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::UnknownNode(node) => {
                LocatorError::StaleScope(format!("{} is not attached", node))
            }
            other => LocatorError::InvalidDescriptor(other.to_string()),
        }
    }
}
