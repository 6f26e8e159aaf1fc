use tracing::{debug, info};
use waypoint_core_types::ResolutionId;
use waypoint_locator::{Attempt, ResolutionObserver, ResolutionResult, SettleTrigger};

/// Streams resolution progress into the log.
#[derive(Debug, Default)]
pub struct LogObserver;

impl ResolutionObserver for LogObserver {
    fn on_attempt(&self, id: &ResolutionId, attempt: &Attempt) {
        debug!(
            resolution = %id.0,
            strategy = %attempt.label(),
            target = %attempt.target,
            succeeded = attempt.succeeded,
            elapsed_ms = attempt.elapsed_ms,
            "attempt"
        );
    }

    fn on_retry(&self, id: &ResolutionId, trigger: SettleTrigger, count: u32) {
        debug!(resolution = %id.0, trigger = trigger.name(), count, "retry");
    }

    fn on_settle(&self, id: &ResolutionId, result: &ResolutionResult) {
        info!(
            resolution = %id.0,
            succeeded = result.succeeded,
            attempts = result.attempts.len(),
            elapsed_ms = result.total_elapsed_ms,
            "settled"
        );
    }
}
