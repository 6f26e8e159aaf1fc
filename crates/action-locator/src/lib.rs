//! Multi-strategy element resolution
//!
//! This crate implements the element location system with:
//! - Primary and fallback descriptor matching, in declared order
//! - Text and structural (parent/child index) fallbacks
//! - A validity filter that rejects hidden, empty and far off-screen elements
//! - A mutation-aware wait/retry phase with exactly-once settlement
//! - Stability scoring and publish validation for recorded selector sets

pub mod authoring;
pub mod errors;
pub mod observer;
pub mod resolver;
pub mod scoring;
pub mod strategies;
pub mod types;
pub mod validity;
mod waiting;

pub use authoring::*;
pub use errors::*;
pub use observer::*;
pub use resolver::*;
pub use scoring::*;
pub use strategies::{match_descriptor, match_structural, match_text, scope_for, TextMatchMode};
pub use types::*;
pub use validity::*;
