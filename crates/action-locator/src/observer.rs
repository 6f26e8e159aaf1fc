//! Hooks for watching resolutions as they run

use waypoint_core_types::ResolutionId;

use crate::types::{Attempt, ResolutionResult, SettleTrigger};

/// Receives progress callbacks from a [`crate::LocatorEngine`].
///
/// Callbacks run inline on the resolving task and must not block.
pub trait ResolutionObserver: Send + Sync {
    /// A phase finished and was appended to the attempt log.
    fn on_attempt(&self, _id: &ResolutionId, _attempt: &Attempt) {}

    /// The wait phase re-ran the descriptors; `count` starts at 1.
    fn on_retry(&self, _id: &ResolutionId, _trigger: SettleTrigger, _count: u32) {}

    /// The resolution settled. Called exactly once per `resolve()`.
    fn on_settle(&self, _id: &ResolutionId, _result: &ResolutionResult) {}
}
