//! Shared types for the bar tab event-sourcing system.

pub mod id;

pub use id::{AggregateId, IdParseError};
