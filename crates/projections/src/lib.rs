//! Read models and projections for the CQRS query side.
//!
//! This crate provides the query side:
//! - [`Projection`] trait for processing events into read models
//! - [`ReadModel`] trait for query access to denormalized data
//! - [`ProjectionProcessor`] for catching projections up from the store
//! - [`ProjectionSubscriber`] for feeding live bus events to a projection
//! - [`OpenTabsView`], the open tabs per table and waiter

pub mod error;
pub mod processor;
pub mod projection;
pub mod read_model;
pub mod subscriber;
pub mod views;

pub use error::{ProjectionError, Result};
pub use processor::ProjectionProcessor;
pub use projection::{Projection, ProjectionPosition};
pub use read_model::ReadModel;
pub use subscriber::ProjectionSubscriber;
pub use views::{OpenTabsView, TabInvoice, TabItem, TabStatus};
