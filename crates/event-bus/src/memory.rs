use std::sync::Arc;

use async_trait::async_trait;
use event_store::EventEnvelope;
use tokio::sync::{RwLock, mpsc, watch};

use crate::{EventBus, EventBusError, EventHandler, Subscription};

struct Subscriber {
    name: String,
    queue: mpsc::UnboundedSender<EventEnvelope>,
}

/// In-process event bus.
///
/// Each subscriber owns an unbounded queue drained by its own task, so a slow
/// or failing handler never holds up the publisher or the other subscribers,
/// and every subscriber sees events in publish order.
#[derive(Clone, Default)]
pub struct InMemoryEventBus {
    subscribers: Arc<RwLock<Vec<Subscriber>>>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Drops every subscriber queue. Delivery tasks finish the events already
    /// queued and then exit.
    pub async fn shutdown(&self) {
        self.subscribers.write().await.clear();
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, event: &EventEnvelope) -> Result<(), EventBusError> {
        let subscribers = self.subscribers.read().await;

        let mut closed = Vec::new();
        for subscriber in subscribers.iter() {
            if subscriber.queue.send(event.clone()).is_err() {
                closed.push(subscriber.name.clone());
            }
        }

        metrics::counter!("event_bus_published_total").increment(1);

        if closed.is_empty() {
            Ok(())
        } else {
            tracing::warn!(
                event_type = %event.event_type,
                aggregate_id = %event.aggregate_id,
                subscribers = ?closed,
                "Event not delivered to closed subscribers"
            );
            Err(EventBusError::SubscriberClosed {
                subscribers: closed,
            })
        }
    }

    async fn subscribe(&self, handler: Arc<dyn EventHandler>) -> Subscription {
        let name = handler.name().to_string();
        let (queue, mut rx) = mpsc::unbounded_channel::<EventEnvelope>();
        let (delivered_tx, delivered_rx) = watch::channel(0u64);

        tokio::spawn(async move {
            let mut delivered = 0u64;
            while let Some(event) = rx.recv().await {
                if let Err(e) = handler.handle(&event).await {
                    metrics::counter!("event_bus_handler_failures_total").increment(1);
                    tracing::warn!(
                        subscriber = handler.name(),
                        event_type = %event.event_type,
                        aggregate_id = %event.aggregate_id,
                        version = %event.version,
                        error = %e,
                        "Event handler failed"
                    );
                }
                delivered += 1;
                delivered_tx.send_replace(delivered);
            }
            tracing::debug!(subscriber = handler.name(), "Subscriber stopped");
        });

        self.subscribers.write().await.push(Subscriber {
            name: name.clone(),
            queue,
        });
        tracing::info!(subscriber = %name, "Subscriber registered");

        Subscription::new(name, delivered_rx)
    }
}
