//! Wait/retry phase
//!
//! Races three triggers against one settlement:
//! - node insertions in the document (each one re-attempts, within budget)
//! - a polling interval (re-attempts regardless of mutations)
//! - the mutation timeout (settles as a timed-out failure)
//!
//! plus cancellation from the owning engine. Whichever settles first tears
//! down the subscription, the interval and the deadline; nothing fires after.

use std::pin::Pin;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::{self, Instant, Interval, MissedTickBehavior, Sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use waypoint_core_types::{MutationEvent, NodeId, ResolutionId};
use waypoint_dom::{Document, Scope};

use crate::errors::LocatorError;
use crate::observer::ResolutionObserver;
use crate::strategies::{guarded, match_descriptor};
use crate::types::{SelectorDescriptor, SettleTrigger, WaitConfig};

/// How the race ended.
#[derive(Debug, Clone)]
pub(crate) struct RetryOutcome {
    pub matched: Option<(NodeId, SelectorDescriptor)>,
    pub trigger: SettleTrigger,
    pub retries: u32,
    pub error: Option<LocatorError>,
    /// Last matcher error seen while re-attempting
    pub last_error: Option<LocatorError>,
}

/// Subscription, interval and deadline owned by one race.
///
/// `settle` is the single settlement point: the first call records the
/// trigger and releases every handle, later calls are no-ops. Dropping the
/// race (for example when the resolving future is dropped) releases them too.
pub(crate) struct Settlement {
    settled: Option<SettleTrigger>,
    subscription: Option<broadcast::Receiver<MutationEvent>>,
    ticker: Option<Interval>,
    deadline: Option<Pin<Box<Sleep>>>,
}

impl Settlement {
    fn arm(document: &dyn Document, config: &WaitConfig) -> Self {
        let period = config.retry_interval();
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            settled: None,
            subscription: Some(document.subscribe()),
            ticker: Some(ticker),
            deadline: Some(Box::pin(time::sleep(config.mutation_timeout()))),
        }
    }

    /// Returns `false` if the race had already settled.
    fn settle(&mut self, trigger: SettleTrigger) -> bool {
        if self.settled.is_some() {
            trace!(trigger = trigger.name(), "ignoring trigger after settlement");
            return false;
        }
        self.settled = Some(trigger);
        self.teardown();
        true
    }

    fn teardown(&mut self) {
        self.subscription = None;
        self.ticker = None;
        self.deadline = None;
    }

    #[cfg(test)]
    fn is_armed(&self) -> bool {
        self.subscription.is_some() || self.ticker.is_some() || self.deadline.is_some()
    }
}

impl Drop for Settlement {
    fn drop(&mut self) {
        self.teardown();
    }
}

enum Wake {
    Aborted,
    Timeout,
    Insertion,
    Poll,
}

/// One wait/retry phase over the primary and fallback descriptors.
pub(crate) struct WaitRetry<'a> {
    pub document: &'a dyn Document,
    pub scope: Scope,
    pub descriptors: Vec<&'a SelectorDescriptor>,
    pub config: WaitConfig,
    pub cancel: CancellationToken,
    pub resolution_id: &'a ResolutionId,
    pub observer: Option<&'a dyn ResolutionObserver>,
}

impl WaitRetry<'_> {
    pub async fn run(self) -> RetryOutcome {
        // Subscribe before the first re-attempt so no insertion slips between them.
        let mut race = Settlement::arm(self.document, &self.config);
        let mut retries = 0u32;
        let mut structural = 0u32;
        let mut last_error = None;
        let mut retired = vec![false; self.descriptors.len()];

        retries += 1;
        if let Some(hit) =
            self.reattempt(SettleTrigger::Initial, retries, &mut retired, &mut last_error)
        {
            race.settle(SettleTrigger::Initial);
            return self.outcome(Some(hit), SettleTrigger::Initial, retries, None, None);
        }

        loop {
            let wake = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Wake::Aborted,
                _ = expire(&mut race.deadline) => Wake::Timeout,
                _ = next_insertion(&mut race.subscription) => Wake::Insertion,
                _ = tick(&mut race.ticker) => Wake::Poll,
            };

            let trigger = match wake {
                Wake::Aborted => {
                    race.settle(SettleTrigger::Aborted);
                    let error = LocatorError::Aborted("engine destroyed".to_string());
                    return self.outcome(
                        None,
                        SettleTrigger::Aborted,
                        retries,
                        Some(error),
                        last_error,
                    );
                }
                Wake::Timeout => {
                    race.settle(SettleTrigger::Timeout);
                    let error = LocatorError::Timeout(format!(
                        "no strategy matched within {}ms after {} re-attempts",
                        self.config.mutation_timeout_ms, retries
                    ));
                    return self.outcome(
                        None,
                        SettleTrigger::Timeout,
                        retries,
                        Some(error),
                        last_error,
                    );
                }
                Wake::Insertion => SettleTrigger::Mutation,
                Wake::Poll => SettleTrigger::Poll,
            };

            retries += 1;
            if trigger == SettleTrigger::Mutation {
                structural += 1;
            }
            if let Some(hit) = self.reattempt(trigger, retries, &mut retired, &mut last_error) {
                race.settle(trigger);
                return self.outcome(Some(hit), trigger, retries, None, None);
            }
            if trigger == SettleTrigger::Mutation && structural >= self.config.max_retries {
                race.settle(SettleTrigger::RetryBudget);
                let error = LocatorError::RetryBudgetExhausted(format!(
                    "{} structural re-attempts without a match",
                    structural
                ));
                return self.outcome(
                    None,
                    SettleTrigger::RetryBudget,
                    retries,
                    Some(error),
                    last_error,
                );
            }
        }
    }

    /// Primary then fallbacks against the live document.
    ///
    /// A descriptor that fails with a non-retryable error is marked in
    /// `retired` and skipped on later triggers.
    fn reattempt(
        &self,
        trigger: SettleTrigger,
        count: u32,
        retired: &mut [bool],
        last_error: &mut Option<LocatorError>,
    ) -> Option<(NodeId, SelectorDescriptor)> {
        debug!(
            resolution = %self.resolution_id,
            trigger = trigger.name(),
            count,
            "re-attempting descriptors"
        );
        if let Some(observer) = self.observer {
            observer.on_retry(self.resolution_id, trigger, count);
        }
        for (descriptor, retired) in self.descriptors.iter().zip(retired.iter_mut()) {
            if *retired {
                continue;
            }
            let result = guarded(descriptor.kind_name(), || {
                match_descriptor(self.document, self.scope, descriptor)
            });
            match result {
                Ok(Some(node)) => return Some((node, (*descriptor).clone())),
                Ok(None) => {}
                Err(err) => {
                    trace!(descriptor = %descriptor, error = %err, "re-attempt failed");
                    if !err.is_retryable() {
                        debug!(descriptor = %descriptor, "descriptor retired from the wait phase");
                        *retired = true;
                    }
                    *last_error = Some(err);
                }
            }
        }
        None
    }

    fn outcome(
        &self,
        matched: Option<(NodeId, SelectorDescriptor)>,
        trigger: SettleTrigger,
        retries: u32,
        error: Option<LocatorError>,
        last_error: Option<LocatorError>,
    ) -> RetryOutcome {
        debug!(
            resolution = %self.resolution_id,
            trigger = trigger.name(),
            retries,
            matched = matched.is_some(),
            "wait phase settled"
        );
        RetryOutcome {
            matched,
            trigger,
            retries,
            error,
            last_error,
        }
    }
}

async fn expire(deadline: &mut Option<Pin<Box<Sleep>>>) {
    match deadline.as_mut() {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker.as_mut() {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Resolves on the next node insertion; other mutations are skipped.
async fn next_insertion(subscription: &mut Option<broadcast::Receiver<MutationEvent>>) {
    loop {
        let Some(receiver) = subscription.as_mut() else {
            return std::future::pending().await;
        };
        match receiver.recv().await {
            Ok(event) if event.is_insertion() => return,
            Ok(event) => trace!(kind = event.kind(), "ignoring non-insertion mutation"),
            // Missed events may have included an insertion.
            Err(RecvError::Lagged(skipped)) => {
                trace!(skipped, "mutation subscription lagged");
                return;
            }
            Err(RecvError::Closed) => {
                debug!("mutation stream closed; falling back to polling");
                *subscription = None;
            }
        }
    }
}
