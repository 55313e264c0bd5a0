//! Domain layer for the bar tab system.
//!
//! This crate provides the write side:
//! - Aggregate trait for event-sourced entities
//! - DomainEvent trait for domain events
//! - CommandDispatcher, which loads, replays, handles, persists and publishes
//! - Tab aggregate implementation with its state machine
//! - TabService and the caller-side retry policy

pub mod aggregate;
pub mod dispatcher;
pub mod error;
pub mod retry;
pub mod tab;

pub use aggregate::{Aggregate, DomainEvent, SnapshotCapable};
pub use dispatcher::{Command, CommandDispatcher, CommandResult, DispatcherConfig};
pub use error::{DispatchError, DispatchStage, ServiceError};
pub use retry::RetryPolicy;
pub use tab::{
    DrinksOrderedData, DrinksServedData, InMemoryMenu, MenuError, MenuItem, MenuRepository, Money,
    MoneyParseError, TabAggregate, TabClosedData, TabCommand, TabError, TabEvent, TabOpenedData,
    TabService, TabState,
};
