//! Element resolver with fallback chain orchestration

use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use waypoint_core_types::{NodeId, ResolutionId};
use waypoint_dom::{Document, Scope};

use crate::errors::LocatorError;
use crate::observer::ResolutionObserver;
use crate::strategies::{guarded, match_descriptor, match_structural, match_text};
use crate::types::*;
use crate::waiting::WaitRetry;

/// Generic advice attached to every failed resolution.
pub const REMEDIATION_SUGGESTIONS: &[&str] = &[
    "Check that the element is rendered and visible when this step runs",
    "Prefer a test id or accessibility label as the primary selector",
    "Add fallbacks or a text match to the selector set",
    "Raise mutationTimeoutMs if the element appears late",
    "Make sure the scope element is still attached to the document",
];

/// Element resolver trait
#[async_trait]
pub trait ElementResolver: Send + Sync {
    /// Resolve an element through the fallback chain.
    ///
    /// Never fails: every problem is reported inside the result. `config`
    /// overrides the resolver's wait defaults for this call only.
    async fn resolve(
        &self,
        set: &SelectorSet,
        scope: Scope,
        config: Option<WaitConfig>,
    ) -> ResolutionResult;

    /// Abort in-flight resolutions and refuse new ones.
    fn destroy(&self);
}

/// Resolver over one live document.
///
/// Holds configuration only; each `resolve()` call owns its attempt log and
/// its wait-phase handles, so concurrent calls never share state.
pub struct LocatorEngine {
    document: Arc<dyn Document>,
    defaults: WaitConfig,
    observer: Option<Arc<dyn ResolutionObserver>>,
    lifecycle: CancellationToken,
}

impl LocatorEngine {
    /// Create an engine with default wait settings
    pub fn new(document: Arc<dyn Document>) -> Self {
        Self {
            document,
            defaults: WaitConfig::default(),
            observer: None,
            lifecycle: CancellationToken::new(),
        }
    }

    pub fn with_defaults(mut self, defaults: WaitConfig) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ResolutionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn document(&self) -> &Arc<dyn Document> {
        &self.document
    }

    pub fn defaults(&self) -> WaitConfig {
        self.defaults
    }

    pub fn is_destroyed(&self) -> bool {
        self.lifecycle.is_cancelled()
    }
}

#[async_trait]
impl ElementResolver for LocatorEngine {
    async fn resolve(
        &self,
        set: &SelectorSet,
        scope: Scope,
        config: Option<WaitConfig>,
    ) -> ResolutionResult {
        let config = config.unwrap_or(self.defaults);
        let document = self.document.as_ref();
        let mut run = Resolution::new(self.observer.as_deref());
        info!(resolution = %run.id, primary = %set.primary, "Resolving element");

        if self.is_destroyed() {
            return run.fail(
                LocatorError::Aborted("engine destroyed".to_string()),
                Some(SettleTrigger::Aborted),
                0,
            );
        }

        // Phase 1: primary
        let primary = run.attempt(LocatorStrategy::Primary, None, &set.primary, || {
            match_descriptor(document, scope, &set.primary)
        });
        if let Some(node) = primary {
            return run.succeed(node, SelectorUsed::Descriptor(set.primary.clone()), None, 0);
        }

        // Phase 2: fallbacks, in the order given
        for (index, fallback) in set.fallbacks.iter().enumerate() {
            let hit = run.attempt(LocatorStrategy::Fallback, Some(index), fallback, || {
                match_descriptor(document, scope, fallback)
            });
            if let Some(node) = hit {
                return run.succeed(node, SelectorUsed::Descriptor(fallback.clone()), None, 0);
            }
        }

        // Phase 3: text
        if let Some(spec) = &set.text_match {
            let hit = run.attempt(LocatorStrategy::TextMatch, None, spec, || {
                match_text(document, scope, spec)
            });
            if let Some((node, mode)) = hit {
                debug!(resolution = %run.id, ?mode, "text match succeeded");
                return run.succeed(node, SelectorUsed::TextMatch(spec.clone()), None, 0);
            }
        }

        // Phase 4: structural
        if let Some(spec) = &set.structural {
            let hit = run.attempt(LocatorStrategy::Structural, None, spec, || {
                match_structural(document, scope, spec)
            });
            if let Some(node) = hit {
                return run.succeed(node, SelectorUsed::Structural(spec.clone()), None, 0);
            }
        }

        // Phase 5: wait for the document to change
        let began = Instant::now();
        let target = format!("primary + {} fallbacks", set.fallbacks.len());
        let outcome = WaitRetry {
            document,
            scope,
            descriptors: set.descriptors().collect(),
            config,
            cancel: self.lifecycle.child_token(),
            resolution_id: &run.id,
            observer: run.observer,
        }
        .run()
        .await;
        let elapsed_ms = began.elapsed().as_millis() as u64;

        match outcome.matched {
            Some((node, descriptor)) => {
                run.record(Attempt {
                    strategy: LocatorStrategy::WaitRetry,
                    fallback_index: None,
                    target,
                    succeeded: true,
                    elapsed_ms,
                    error_message: None,
                });
                run.succeed(
                    node,
                    SelectorUsed::Descriptor(descriptor),
                    Some(outcome.trigger),
                    outcome.retries,
                )
            }
            None => {
                let error = outcome.error.unwrap_or_else(|| {
                    LocatorError::Internal("wait phase settled without a cause".to_string())
                });
                let message = match &outcome.last_error {
                    Some(last) => format!("{}; last error: {}", error, last),
                    None => error.to_string(),
                };
                run.record(Attempt {
                    strategy: LocatorStrategy::WaitRetry,
                    fallback_index: None,
                    target,
                    succeeded: false,
                    elapsed_ms,
                    error_message: Some(message),
                });
                run.fail(error, Some(outcome.trigger), outcome.retries)
            }
        }
    }

    fn destroy(&self) {
        if !self.lifecycle.is_cancelled() {
            info!("Destroying locator engine; aborting in-flight resolutions");
        }
        self.lifecycle.cancel();
    }
}

/// Per-call state: the attempt log and timing of one `resolve()`.
struct Resolution<'a> {
    id: ResolutionId,
    started: Instant,
    attempts: Vec<Attempt>,
    observer: Option<&'a dyn ResolutionObserver>,
}

impl<'a> Resolution<'a> {
    fn new(observer: Option<&'a dyn ResolutionObserver>) -> Self {
        Self {
            id: ResolutionId::new(),
            started: Instant::now(),
            attempts: Vec::new(),
            observer,
        }
    }

    /// Run one matcher and log it as one attempt.
    fn attempt<T>(
        &mut self,
        strategy: LocatorStrategy,
        fallback_index: Option<usize>,
        target: &dyn std::fmt::Display,
        matcher: impl FnOnce() -> Result<Option<T>, LocatorError>,
    ) -> Option<T> {
        let target = target.to_string();
        let began = Instant::now();
        let result = guarded(strategy.name(), matcher);
        let elapsed_ms = began.elapsed().as_millis() as u64;

        let (found, error_message) = match result {
            Ok(Some(found)) => (Some(found), None),
            Ok(None) => {
                let miss = LocatorError::ElementNotFound(format!("{} matched no valid element", target));
                (None, Some(miss.to_string()))
            }
            Err(err) => {
                warn!(
                    resolution = %self.id,
                    strategy = strategy.name(),
                    target = %target,
                    "Strategy failed: {}",
                    err
                );
                (None, Some(err.to_string()))
            }
        };
        self.record(Attempt {
            strategy,
            fallback_index,
            target,
            succeeded: found.is_some(),
            elapsed_ms,
            error_message,
        });
        found
    }

    fn record(&mut self, attempt: Attempt) {
        debug!(
            resolution = %self.id,
            strategy = %attempt.label(),
            target = %attempt.target,
            succeeded = attempt.succeeded,
            elapsed_ms = attempt.elapsed_ms,
            "attempt finished"
        );
        if let Some(observer) = self.observer {
            observer.on_attempt(&self.id, &attempt);
        }
        self.attempts.push(attempt);
    }

    fn succeed(
        self,
        node: NodeId,
        selector_used: SelectorUsed,
        settled_by: Option<SettleTrigger>,
        retries: u32,
    ) -> ResolutionResult {
        info!(
            resolution = %self.id,
            element = %node,
            selector = %selector_used,
            "Resolved element"
        );
        let result = ResolutionResult {
            resolution_id: self.id.clone(),
            succeeded: true,
            element: Some(node),
            selector_used: Some(selector_used),
            attempts: Vec::new(),
            total_elapsed_ms: 0,
            failed_attempt_count: 0,
            error_message: None,
            timed_out: false,
            suggestions: Vec::new(),
            settled_by,
            retries,
        };
        self.finish(result)
    }

    fn fail(
        self,
        error: LocatorError,
        settled_by: Option<SettleTrigger>,
        retries: u32,
    ) -> ResolutionResult {
        let timed_out = matches!(error, LocatorError::Timeout(_));
        let message = format!(
            "Element not found after {} attempts: {}",
            self.attempts.len(),
            error
        );
        info!(resolution = %self.id, timed_out, "Resolution failed: {}", message);
        let result = ResolutionResult {
            resolution_id: self.id.clone(),
            succeeded: false,
            element: None,
            selector_used: None,
            attempts: Vec::new(),
            total_elapsed_ms: 0,
            failed_attempt_count: 0,
            error_message: Some(message),
            timed_out,
            suggestions: REMEDIATION_SUGGESTIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            settled_by,
            retries,
        };
        self.finish(result)
    }

    fn finish(self, mut result: ResolutionResult) -> ResolutionResult {
        result.total_elapsed_ms = self.started.elapsed().as_millis() as u64;
        result.failed_attempt_count = self.attempts.iter().filter(|a| !a.succeeded).count();
        result.attempts = self.attempts;
        if let Some(observer) = self.observer {
            observer.on_settle(&result.resolution_id, &result);
        }
        result
    }
}
