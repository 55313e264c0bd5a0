//! Fan-out of committed events to independent subscribers.
//!
//! The write side publishes each event after it is durably appended; the
//! read side subscribes handlers that fold events into projections. A
//! subscriber sees events in the order they were published.

pub mod bus;
pub mod error;
pub mod memory;

pub use bus::{EventBus, EventHandler, Subscription};
pub use error::{EventBusError, HandlerError};
pub use memory::InMemoryEventBus;
