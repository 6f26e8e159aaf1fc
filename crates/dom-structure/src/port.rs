//! The document port the locator queries through.

use tokio::sync::broadcast;
use waypoint_core_types::{ElementLayout, MutationEvent, NodeId, Viewport};

use crate::errors::QueryError;

/// Search root for a query: the whole document or the subtree below one element.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Scope {
    #[default]
    Document,
    Element(NodeId),
}

/// Read-only view over a live, mutating document.
///
/// Implementations must be cheap to call repeatedly; the locator re-runs
/// queries on every retry tick. Every list returned is in document order.
///
/// [`Scope::Document`] covers the whole tree, root element included;
/// [`Scope::Element`] covers only the elements strictly below that element.
pub trait Document: Send + Sync {
    /// Root element of the document.
    fn root(&self) -> NodeId;

    /// All elements in `scope` matching a CSS selector.
    fn query_all(&self, scope: Scope, selector: &str) -> Result<Vec<NodeId>, QueryError>;

    /// All elements in `scope` selected by an XPath expression.
    fn evaluate_xpath(&self, scope: Scope, expression: &str) -> Result<Vec<NodeId>, QueryError>;

    /// Every element in `scope`, in document order.
    fn descendants(&self, scope: Scope) -> Result<Vec<NodeId>, QueryError>;

    /// Direct element children of `node`.
    fn children(&self, node: NodeId) -> Vec<NodeId>;

    /// Lower-cased tag name.
    fn tag_name(&self, node: NodeId) -> Option<String>;

    fn attribute(&self, node: NodeId, name: &str) -> Option<String>;

    /// Concatenated text of the node and its descendants.
    fn text_content(&self, node: NodeId) -> Option<String>;

    /// Rendered box and style; `None` when the node is not attached.
    fn layout(&self, node: NodeId) -> Option<ElementLayout>;

    fn viewport(&self) -> Viewport;

    /// Whether `node` is a strict descendant of `ancestor`.
    fn contains(&self, ancestor: NodeId, node: NodeId) -> bool;

    /// Subscribe to structural change notifications.
    fn subscribe(&self) -> broadcast::Receiver<MutationEvent>;
}
