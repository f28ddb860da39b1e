//! Domain error types.

use event_store::EventStoreError;
use thiserror::Error;

use crate::deferred::DeferredError;
use crate::group::GroupError;
use crate::order::OrderError;
use crate::table::TableError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    #[error("Table error: {0}")]
    Table(#[from] TableError),

    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    #[error("Group error: {0}")]
    Group(#[from] GroupError),

    #[error("Deferred payment error: {0}")]
    Deferred(#[from] DeferredError),

    #[error("Aggregate not found: {aggregate_type} with id {aggregate_id}")]
    AggregateNotFound {
        aggregate_type: &'static str,
        aggregate_id: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DomainError {
    /// Returns true if the failure was a lost optimistic-concurrency race.
    pub fn is_conflict(&self) -> bool {
        matches!(self, DomainError::EventStore(e) if e.is_conflict())
    }
}
