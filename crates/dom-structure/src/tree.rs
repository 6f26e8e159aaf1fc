//! Arena-backed in-memory document with mutation notifications.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use waypoint_core_types::{
    ComputedStyle, Display, ElementLayout, MutationEvent, NodeId, Rect, Viewport, Visibility,
};
use waypoint_event_bus::{EventBus, InMemoryBus};

use crate::errors::QueryError;
use crate::port::{Document, Scope};
use crate::{css, xpath};

const MUTATION_BUS_CAPACITY: usize = 256;

/// Box given to elements created without explicit geometry.
pub const DEFAULT_RECT: Rect = Rect {
    x: 0.0,
    y: 0.0,
    width: 100.0,
    height: 24.0,
};

/// Description of an element (and its subtree) to insert.
#[derive(Clone, Debug)]
pub struct ElementSpec {
    pub tag: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub rect: Rect,
    pub style: ComputedStyle,
    pub children: Vec<ElementSpec>,
}

impl ElementSpec {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            attributes: Vec::new(),
            text: String::new(),
            rect: DEFAULT_RECT,
            style: ComputedStyle::default(),
            children: Vec::new(),
        }
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        if let Some(slot) = self.attributes.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.attributes.push((name, value));
        }
        self
    }

    pub fn id(self, id: impl Into<String>) -> Self {
        self.attr("id", id)
    }

    pub fn class(self, class: impl Into<String>) -> Self {
        self.attr("class", class)
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn rect(mut self, rect: Rect) -> Self {
        self.rect = rect;
        self
    }

    pub fn style(mut self, style: ComputedStyle) -> Self {
        self.style = style;
        self
    }

    pub fn child(mut self, child: ElementSpec) -> Self {
        self.children.push(child);
        self
    }
}

pub(crate) struct NodeData {
    pub tag: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub rect: Rect,
    pub style: ComputedStyle,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

impl NodeData {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .map(|value| value.split_whitespace().any(|token| token == class))
            .unwrap_or(false)
    }
}

pub(crate) struct Arena {
    nodes: HashMap<NodeId, NodeData>,
    root: NodeId,
    next_id: u64,
}

impl Arena {
    fn new() -> Self {
        let root = NodeId(0);
        let mut nodes = HashMap::new();
        nodes.insert(
            root,
            NodeData {
                tag: "html".to_string(),
                attributes: Vec::new(),
                text: String::new(),
                rect: Rect::ZERO,
                style: ComputedStyle::default(),
                parent: None,
                children: Vec::new(),
            },
        );
        Self {
            nodes,
            root,
            next_id: 1,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn get(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes.get(&id)
    }

    fn get_mut(&mut self, id: NodeId) -> Option<&mut NodeData> {
        self.nodes.get_mut(&id)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(|node| node.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.get(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Attached nodes are reachable from the root.
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == self.root {
                return true;
            }
            current = self.parent(node);
        }
        false
    }

    pub fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = self.parent(node);
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.parent(parent);
        }
        false
    }

    /// Pre-order descendants, excluding `id` itself.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(self.children(node).iter().rev().copied());
        }
        out
    }

    /// Nodes a query in `scope` may return.
    pub fn scope_nodes(&self, scope: Scope) -> Result<Vec<NodeId>, QueryError> {
        match scope {
            Scope::Document => {
                let mut nodes = vec![self.root];
                nodes.extend(self.descendants(self.root));
                Ok(nodes)
            }
            Scope::Element(id) => {
                if !self.is_attached(id) {
                    return Err(QueryError::UnknownNode(id));
                }
                Ok(self.descendants(id))
            }
        }
    }

    /// Position of `id` among its siblings, 1-based.
    pub fn sibling_position(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent)
            .iter()
            .position(|child| *child == id)
            .map(|idx| idx + 1)
    }

    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        if let Some(node) = self.get(id) {
            out.push_str(&node.text);
        }
        for node in self.descendants(id) {
            if let Some(data) = self.get(node) {
                if !data.text.is_empty() {
                    if !out.is_empty() {
                        out.push(' ');
                    }
                    out.push_str(&data.text);
                }
            }
        }
        out
    }

    fn layout(&self, id: NodeId) -> Option<ElementLayout> {
        if !self.is_attached(id) {
            return None;
        }
        let node = self.get(id)?;
        let mut style = node.style;
        let mut rect = node.rect;
        let mut current = node.parent;
        while let Some(parent_id) = current {
            let Some(parent) = self.get(parent_id) else {
                break;
            };
            if parent.style.display == Display::None {
                rect = Rect::ZERO;
            }
            if parent.style.visibility != Visibility::Visible
                && style.visibility == Visibility::Visible
            {
                style.visibility = parent.style.visibility;
            }
            style.opacity *= parent.style.opacity;
            current = parent.parent;
        }
        if style.display == Display::None {
            rect = Rect::ZERO;
        }
        Some(ElementLayout { rect, style })
    }

    fn insert(&mut self, spec: ElementSpec, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        let ElementSpec {
            tag,
            attributes,
            text,
            rect,
            style,
            children,
        } = spec;
        self.nodes.insert(
            id,
            NodeData {
                tag: tag.to_ascii_lowercase(),
                attributes,
                text,
                rect,
                style,
                parent,
                children: Vec::new(),
            },
        );
        if let Some(parent) = parent {
            if let Some(parent_node) = self.get_mut(parent) {
                parent_node.children.push(id);
            }
        }
        for child in children {
            self.insert(child, Some(id));
        }
        id
    }

    fn detach(&mut self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        if let Some(parent_node) = self.get_mut(parent) {
            parent_node.children.retain(|child| *child != id);
        }
        if let Some(node) = self.get_mut(id) {
            node.parent = None;
        }
        Some(parent)
    }

    fn drop_subtree(&mut self, id: NodeId) {
        for node in self.descendants(id) {
            self.nodes.remove(&node);
        }
        self.nodes.remove(&id);
    }
}

/// In-memory document that publishes [`MutationEvent`]s as it changes.
///
/// Mutations on detached subtrees are silent, the way a mutation observer on
/// the document never sees them; attaching the subtree later emits a single
/// `NodesAdded` for its top node.
pub struct InMemoryDocument {
    arena: RwLock<Arena>,
    viewport: RwLock<Viewport>,
    bus: Arc<InMemoryBus<MutationEvent>>,
}

impl InMemoryDocument {
    pub fn new(viewport: Viewport) -> Arc<Self> {
        Arc::new(Self {
            arena: RwLock::new(Arena::new()),
            viewport: RwLock::new(viewport),
            bus: InMemoryBus::new(MUTATION_BUS_CAPACITY),
        })
    }

    /// Append a new subtree under `parent`.
    pub fn append_child(&self, parent: NodeId, spec: ElementSpec) -> Result<NodeId, QueryError> {
        let (id, attached) = {
            let mut arena = self.arena.write();
            if arena.get(parent).is_none() {
                return Err(QueryError::UnknownNode(parent));
            }
            let id = arena.insert(spec, Some(parent));
            (id, arena.is_attached(parent))
        };
        if attached {
            self.emit(MutationEvent::NodesAdded {
                parent,
                nodes: vec![id],
            });
        }
        Ok(id)
    }

    /// Build a subtree that is not yet part of the document.
    pub fn create_detached(&self, spec: ElementSpec) -> NodeId {
        self.arena.write().insert(spec, None)
    }

    /// Move a detached subtree under `parent`.
    pub fn attach(&self, parent: NodeId, node: NodeId) -> Result<(), QueryError> {
        let attached = {
            let mut arena = self.arena.write();
            if arena.get(parent).is_none() {
                return Err(QueryError::UnknownNode(parent));
            }
            if arena.get(node).is_none() {
                return Err(QueryError::UnknownNode(node));
            }
            if node == parent || arena.is_ancestor(node, parent) {
                return Err(QueryError::UnknownNode(node));
            }
            arena.detach(node);
            if let Some(node_data) = arena.get_mut(node) {
                node_data.parent = Some(parent);
            }
            if let Some(parent_data) = arena.get_mut(parent) {
                parent_data.children.push(node);
            }
            arena.is_attached(parent)
        };
        if attached {
            self.emit(MutationEvent::NodesAdded {
                parent,
                nodes: vec![node],
            });
        }
        Ok(())
    }

    /// Remove a node and its subtree from the document.
    pub fn remove_node(&self, node: NodeId) -> Result<(), QueryError> {
        let removed = {
            let mut arena = self.arena.write();
            if node == arena.root() || arena.get(node).is_none() {
                return Err(QueryError::UnknownNode(node));
            }
            let was_attached = arena.is_attached(node);
            let parent = arena.detach(node);
            arena.drop_subtree(node);
            parent.filter(|_| was_attached)
        };
        if let Some(parent) = removed {
            self.emit(MutationEvent::NodesRemoved {
                parent,
                nodes: vec![node],
            });
        }
        Ok(())
    }

    pub fn set_attribute(
        &self,
        node: NodeId,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), QueryError> {
        let name = name.into();
        let value = value.into();
        let attached = self.update(node, |data| {
            if let Some(slot) = data.attributes.iter_mut().find(|(n, _)| *n == name) {
                slot.1 = value.clone();
            } else {
                data.attributes.push((name.clone(), value.clone()));
            }
        })?;
        if attached {
            self.emit(MutationEvent::AttributeChanged { node, name });
        }
        Ok(())
    }

    pub fn remove_attribute(&self, node: NodeId, name: &str) -> Result<(), QueryError> {
        let attached = self.update(node, |data| data.attributes.retain(|(n, _)| n != name))?;
        if attached {
            self.emit(MutationEvent::AttributeChanged {
                node,
                name: name.to_string(),
            });
        }
        Ok(())
    }

    pub fn set_style(&self, node: NodeId, style: ComputedStyle) -> Result<(), QueryError> {
        let attached = self.update(node, |data| data.style = style)?;
        if attached {
            self.emit(MutationEvent::StyleChanged { node });
        }
        Ok(())
    }

    pub fn set_rect(&self, node: NodeId, rect: Rect) -> Result<(), QueryError> {
        let attached = self.update(node, |data| data.rect = rect)?;
        if attached {
            self.emit(MutationEvent::StyleChanged { node });
        }
        Ok(())
    }

    pub fn set_text(&self, node: NodeId, text: impl Into<String>) -> Result<(), QueryError> {
        let text = text.into();
        let attached = self.update(node, |data| data.text = text.clone())?;
        if attached {
            self.emit(MutationEvent::TextChanged { node });
        }
        Ok(())
    }

    pub fn set_viewport(&self, viewport: Viewport) {
        *self.viewport.write() = viewport;
    }

    /// Number of live mutation subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.bus.subscriber_count()
    }

    /// First attached element matching `selector`, if any.
    pub fn query_first(&self, selector: &str) -> Result<Option<NodeId>, QueryError> {
        Ok(self.query_all(Scope::Document, selector)?.into_iter().next())
    }

    fn update<F>(&self, node: NodeId, apply: F) -> Result<bool, QueryError>
    where
        F: FnOnce(&mut NodeData),
    {
        let mut arena = self.arena.write();
        let attached = arena.is_attached(node);
        let data = arena.get_mut(node).ok_or(QueryError::UnknownNode(node))?;
        apply(data);
        Ok(attached)
    }

    fn emit(&self, event: MutationEvent) {
        debug!(kind = event.kind(), "document mutation");
        if let Err(err) = self.bus.publish(event) {
            warn!("failed to publish mutation: {}", err);
        }
    }
}

impl Document for InMemoryDocument {
    fn root(&self) -> NodeId {
        self.arena.read().root()
    }

    fn query_all(&self, scope: Scope, selector: &str) -> Result<Vec<NodeId>, QueryError> {
        let selector = css::parse(selector)?;
        let arena = self.arena.read();
        let nodes = arena.scope_nodes(scope)?;
        let scope_element = match scope {
            Scope::Document => None,
            Scope::Element(id) => Some(id),
        };
        Ok(nodes
            .into_iter()
            .filter(|node| selector.matches(&arena, *node, scope_element))
            .collect())
    }

    fn evaluate_xpath(&self, scope: Scope, expression: &str) -> Result<Vec<NodeId>, QueryError> {
        let path = xpath::parse(expression)?;
        let arena = self.arena.read();
        path.evaluate(&arena, scope)
    }

    fn descendants(&self, scope: Scope) -> Result<Vec<NodeId>, QueryError> {
        self.arena.read().scope_nodes(scope)
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.arena.read().children(node).to_vec()
    }

    fn tag_name(&self, node: NodeId) -> Option<String> {
        self.arena.read().get(node).map(|n| n.tag.clone())
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.arena
            .read()
            .get(node)
            .and_then(|n| n.attr(name).map(str::to_string))
    }

    fn text_content(&self, node: NodeId) -> Option<String> {
        let arena = self.arena.read();
        arena.get(node)?;
        Some(arena.text_content(node))
    }

    fn layout(&self, node: NodeId) -> Option<ElementLayout> {
        self.arena.read().layout(node)
    }

    fn viewport(&self) -> Viewport {
        *self.viewport.read()
    }

    fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        self.arena.read().is_ancestor(ancestor, node)
    }

    fn subscribe(&self) -> broadcast::Receiver<MutationEvent> {
        self.bus.subscribe()
    }
}
