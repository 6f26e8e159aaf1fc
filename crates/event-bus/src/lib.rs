use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::trace;

use waypoint_core_types::CoreError;

/// Trait implemented by payload types that can be carried on the bus.
pub trait Event: Clone + Send + Sync + std::fmt::Debug + 'static {}

impl<T> Event for T where T: Clone + Send + Sync + std::fmt::Debug + 'static {}

pub trait EventBus<E>: Send + Sync
where
    E: Event,
{
    /// Publish to current subscribers. Returns how many received the event.
    fn publish(&self, event: E) -> Result<usize, CoreError>;
    fn subscribe(&self) -> broadcast::Receiver<E>;
    fn subscriber_count(&self) -> usize;
}

/// Simple in-memory bus backing documents and tests.
pub struct InMemoryBus<E>
where
    E: Event,
{
    sender: broadcast::Sender<E>,
}

impl<E> InMemoryBus<E>
where
    E: Event,
{
    pub fn new(capacity: usize) -> Arc<Self> {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Arc::new(Self { sender })
    }
}

impl<E> EventBus<E> for InMemoryBus<E>
where
    E: Event,
{
    fn publish(&self, event: E) -> Result<usize, CoreError> {
        if self.sender.receiver_count() == 0 {
            // Nobody is listening; dropping the event is the expected outcome.
            trace!(?event, "no subscribers for event");
            return Ok(0);
        }
        self.sender
            .send(event)
            .map_err(|err| CoreError::new(err.to_string()))
    }

    fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }

    fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
