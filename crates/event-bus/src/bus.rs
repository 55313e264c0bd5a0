use std::sync::Arc;

use async_trait::async_trait;
use event_store::EventEnvelope;
use tokio::sync::watch;

use crate::{EventBusError, HandlerError};

/// Receives events published on a bus.
///
/// Handlers may see an event more than once (for example during catch-up
/// followed by live delivery) and should apply it idempotently.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    async fn handle(&self, event: &EventEnvelope) -> Result<(), HandlerError>;
}

/// Publish/subscribe channel for committed events.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Delivers `event` to every registered subscriber.
    ///
    /// Delivery to each subscriber is independent: a subscriber that has gone
    /// away is reported in the error, but all others still get the event.
    async fn publish(&self, event: &EventEnvelope) -> Result<(), EventBusError>;

    /// Registers a handler for every event published from now on.
    async fn subscribe(&self, handler: Arc<dyn EventHandler>) -> Subscription;
}

#[async_trait]
impl<B: EventBus + ?Sized> EventBus for Arc<B> {
    async fn publish(&self, event: &EventEnvelope) -> Result<(), EventBusError> {
        (**self).publish(event).await
    }

    async fn subscribe(&self, handler: Arc<dyn EventHandler>) -> Subscription {
        (**self).subscribe(handler).await
    }
}

/// Handle on one registered subscriber.
///
/// Tracks how many events the subscriber has finished handling, successfully
/// or not.
#[derive(Debug, Clone)]
pub struct Subscription {
    name: String,
    delivered: watch::Receiver<u64>,
}

impl Subscription {
    pub(crate) fn new(name: String, delivered: watch::Receiver<u64>) -> Self {
        Self { name, delivered }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of events handled so far.
    pub fn delivered(&self) -> u64 {
        *self.delivered.borrow()
    }

    /// Waits until at least `count` events have been handled.
    pub async fn wait_for(&self, count: u64) -> Result<(), EventBusError> {
        let mut delivered = self.delivered.clone();
        delivered
            .wait_for(|handled| *handled >= count)
            .await
            .map(|_| ())
            .map_err(|_| EventBusError::SubscriptionEnded {
                subscriber: self.name.clone(),
                delivered: self.delivered(),
            })
    }
}
