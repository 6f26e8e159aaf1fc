//! Serde-described document snapshots with optional scripted mutations.
//!
//! Fixtures are YAML (or JSON, which YAML accepts):
//!
//! ```yaml
//! viewport: { width: 1280, height: 800 }
//! body:
//!   - tag: button
//!     id: save-btn
//!     text: Save
//! mutations:
//!   - after_ms: 800
//!     op: append
//!     parent: body
//!     element: { tag: div, class: toast }
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use waypoint_core_types::{ComputedStyle, NodeId, Rect, Viewport};

use crate::errors::FixtureError;
use crate::port::Document;
use crate::tree::{ElementSpec, InMemoryDocument, DEFAULT_RECT};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DocumentFixture {
    #[serde(default)]
    pub viewport: Viewport,
    /// Children of the `<body>` element.
    #[serde(default)]
    pub body: Vec<ElementNode>,
    #[serde(default)]
    pub mutations: Vec<ScriptedMutation>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ElementNode {
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rect: Option<Rect>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<ComputedStyle>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ElementNode>,
}

impl ElementNode {
    pub fn to_spec(&self) -> ElementSpec {
        let mut spec = ElementSpec::new(&self.tag).rect(self.rect.unwrap_or(DEFAULT_RECT));
        if let Some(id) = &self.id {
            spec = spec.id(id);
        }
        if let Some(class) = &self.class {
            spec = spec.class(class);
        }
        for (name, value) in &self.attributes {
            spec = spec.attr(name, value);
        }
        if let Some(text) = &self.text {
            spec = spec.text(text);
        }
        if let Some(style) = self.style {
            spec = spec.style(style);
        }
        for child in &self.children {
            spec = spec.child(child.to_spec());
        }
        spec
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScriptedMutation {
    /// Delay from the moment the script starts playing.
    pub after_ms: u64,
    #[serde(flatten)]
    pub action: MutationAction,
}

/// Targets are CSS selectors; the first matching element is used.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MutationAction {
    Append { parent: String, element: ElementNode },
    Remove { target: String },
    SetAttribute { target: String, name: String, value: String },
    RemoveAttribute { target: String, name: String },
    SetStyle { target: String, style: ComputedStyle },
    SetText { target: String, text: String },
    /// Resize the viewport; emits no mutation event.
    SetViewport { viewport: Viewport },
}

impl DocumentFixture {
    pub fn from_yaml(text: &str) -> Result<Self, FixtureError> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Materialise the initial document (scripted mutations are not applied).
    pub fn build(&self) -> Result<Arc<InMemoryDocument>, FixtureError> {
        let document = InMemoryDocument::new(self.viewport);
        let root = document.root();
        let mut body = ElementSpec::new("body").rect(Rect::new(
            0.0,
            0.0,
            self.viewport.width,
            self.viewport.height,
        ));
        for node in &self.body {
            body = body.child(node.to_spec());
        }
        document.append_child(root, body)?;
        Ok(document)
    }

    /// Play the scripted mutations against `document` on the tokio clock.
    pub fn play(&self, document: Arc<InMemoryDocument>) -> JoinHandle<Result<(), FixtureError>> {
        let mut script = self.mutations.clone();
        script.sort_by_key(|m| m.after_ms);
        tokio::spawn(async move {
            let start = tokio::time::Instant::now();
            for mutation in script {
                tokio::time::sleep_until(start + Duration::from_millis(mutation.after_ms)).await;
                if let Err(err) = apply(&document, &mutation.action) {
                    warn!(after_ms = mutation.after_ms, "scripted mutation failed: {}", err);
                    return Err(err);
                }
                debug!(after_ms = mutation.after_ms, "applied scripted mutation");
            }
            Ok(())
        })
    }
}

/// Apply a single mutation action immediately.
pub fn apply(document: &InMemoryDocument, action: &MutationAction) -> Result<(), FixtureError> {
    match action {
        MutationAction::Append { parent, element } => {
            let parent = target(document, parent)?;
            document.append_child(parent, element.to_spec())?;
        }
        MutationAction::Remove { target: selector } => {
            document.remove_node(target(document, selector)?)?;
        }
        MutationAction::SetAttribute {
            target: selector,
            name,
            value,
        } => {
            document.set_attribute(target(document, selector)?, name.as_str(), value.as_str())?;
        }
        MutationAction::RemoveAttribute {
            target: selector,
            name,
        } => {
            document.remove_attribute(target(document, selector)?, name)?;
        }
        MutationAction::SetStyle {
            target: selector,
            style,
        } => {
            document.set_style(target(document, selector)?, *style)?;
        }
        MutationAction::SetText {
            target: selector,
            text,
        } => {
            document.set_text(target(document, selector)?, text.as_str())?;
        }
        MutationAction::SetViewport { viewport } => document.set_viewport(*viewport),
    }
    Ok(())
}

fn target(document: &InMemoryDocument, selector: &str) -> Result<NodeId, FixtureError> {
    document
        .query_first(selector)?
        .ok_or_else(|| FixtureError::TargetNotFound {
            selector: selector.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypoint_core_types::Display;

    const FIXTURE: &str = r##"
viewport: { width: 1024, height: 768 }
body:
  - tag: div
    id: list
    children:
      - { tag: li, text: first }
      - { tag: li, text: second, style: { display: none } }
  - tag: button
    attributes: { data-testid: save }
    rect: { x: 10, y: 10, width: 80, height: 30 }
mutations:
  - after_ms: 50
    op: set_attribute
    target: "[data-testid=save]"
    name: aria-label
    value: Save changes
  - after_ms: 20
    op: append
    parent: "#list"
    element: { tag: li, text: third }
"##;

    #[test]
    fn builds_the_initial_tree() {
        let fixture = DocumentFixture::from_yaml(FIXTURE).unwrap();
        let doc = fixture.build().unwrap();
        assert_eq!(doc.viewport().width, 1024.0);
        let list = doc.query_first("#list").unwrap().unwrap();
        let items = doc.children(list);
        assert_eq!(items.len(), 2);
        let hidden = doc.layout(items[1]).unwrap();
        assert_eq!(hidden.style.display, Display::None);
        let button = doc.query_first("[data-testid=save]").unwrap().unwrap();
        assert_eq!(doc.layout(button).unwrap().rect.width, 80.0);
    }

    #[test]
    fn rejects_unknown_ops() {
        let bad = "mutations:\n  - after_ms: 1\n    op: explode\n    target: body\n";
        assert!(matches!(
            DocumentFixture::from_yaml(bad),
            Err(FixtureError::Parse(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn plays_mutations_in_time_order() {
        let fixture = DocumentFixture::from_yaml(FIXTURE).unwrap();
        let doc = fixture.build().unwrap();
        let handle = fixture.play(doc.clone());

        tokio::time::sleep(Duration::from_millis(30)).await;
        let list = doc.query_first("#list").unwrap().unwrap();
        assert_eq!(doc.children(list).len(), 3);
        let button = doc.query_first("[data-testid=save]").unwrap().unwrap();
        assert!(doc.attribute(button, "aria-label").is_none());

        handle.await.unwrap().unwrap();
        assert_eq!(
            doc.attribute(button, "aria-label").as_deref(),
            Some("Save changes")
        );
    }

    #[test]
    fn removes_attributes_and_resizes_the_viewport() {
        let script = r#"
body:
  - { tag: button, id: save, attributes: { disabled: "true" } }
mutations:
  - after_ms: 0
    op: remove_attribute
    target: "button"
    name: disabled
  - after_ms: 0
    op: set_viewport
    viewport: { width: 400, height: 300 }
"#;
        let fixture = DocumentFixture::from_yaml(script).unwrap();
        let doc = fixture.build().unwrap();
        let mut events = doc.subscribe();
        let button = doc.query_first("#save").unwrap().unwrap();
        assert!(doc.attribute(button, "disabled").is_some());

        for mutation in &fixture.mutations {
            apply(&doc, &mutation.action).unwrap();
        }
        assert!(doc.attribute(button, "disabled").is_none());
        assert_eq!(doc.viewport().width, 400.0);
        assert_eq!(doc.viewport().height, 300.0);
        assert!(matches!(
            events.try_recv(),
            Ok(waypoint_core_types::MutationEvent::AttributeChanged { node, .. }) if node == button
        ));
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn missing_targets_are_reported() {
        let doc = DocumentFixture::default().build().unwrap();
        let err = apply(
            &doc,
            &MutationAction::Remove {
                target: "#ghost".into(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, FixtureError::TargetNotFound { .. }));
    }
}
