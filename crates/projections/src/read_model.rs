//! Read model trait for query-side views.

use async_trait::async_trait;

/// A read model providing query access to denormalized data.
///
/// Read models are updated by projections and shaped for the queries they
/// answer rather than for the events they come from.
#[async_trait]
pub trait ReadModel: Send + Sync {
    /// Returns the name of this read model.
    fn name(&self) -> &'static str;

    /// Returns the number of live entries. Waits for any in-flight event to
    /// finish applying.
    async fn count(&self) -> usize;
}
