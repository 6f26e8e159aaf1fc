//! Structural document layer for the Waypoint locator.
//!
//! - [`Document`]: the read-only port every matcher queries through
//! - [`InMemoryDocument`]: arena-backed live document publishing mutations
//! - CSS matching (on the `selectors` crate) and an XPath subset engine
//! - [`DocumentFixture`]: YAML/JSON snapshots with scripted mutations

mod css;
pub mod errors;
pub mod fixture;
pub mod port;
pub mod tree;
mod xpath;

pub use errors::*;
pub use fixture::{DocumentFixture, ElementNode, MutationAction, ScriptedMutation};
pub use port::*;
pub use tree::{ElementSpec, InMemoryDocument, DEFAULT_RECT};
