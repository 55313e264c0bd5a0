use thiserror::Error;

/// Errors returned by [`EventBus`](crate::EventBus) operations.
#[derive(Debug, Clone, Error)]
pub enum EventBusError {
    /// One or more subscribers stopped consuming. Every other subscriber
    /// still received the event.
    #[error("Subscribers no longer receiving events: {}", subscribers.join(", "))]
    SubscriberClosed { subscribers: Vec<String> },

    /// A subscription's delivery task ended before reaching the awaited count.
    #[error("Subscription '{subscriber}' ended after {delivered} events")]
    SubscriptionEnded { subscriber: String, delivered: u64 },
}

/// Failure reported by an [`EventHandler`](crate::EventHandler).
///
/// The bus logs it and moves on to the next event.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct HandlerError(Box<dyn std::error::Error + Send + Sync>);

impl HandlerError {
    pub fn new<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self(Box::new(err))
    }

    /// Builds an error from a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self(message.into())
    }
}
