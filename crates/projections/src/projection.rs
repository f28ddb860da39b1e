//! Core projection trait and position tracking.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::DomainEvent;
use event_store::EventEnvelope;

use crate::{ProjectionError, Result};

/// How far into the global event log a projection has read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectionPosition {
    /// Number of events processed, relevant or not.
    pub events_processed: u64,

    /// Commit time of the last processed event.
    pub last_event_at: Option<DateTime<Utc>>,
}

impl ProjectionPosition {
    pub fn zero() -> Self {
        Self::default()
    }

    /// Advances the position past `event`.
    pub fn advance(&self, event: &EventEnvelope) -> Self {
        Self {
            events_processed: self.events_processed + 1,
            last_event_at: Some(event.timestamp),
        }
    }
}

impl std::fmt::Display for ProjectionPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "position({})", self.events_processed)
    }
}

/// A projection that processes events and updates a read model.
///
/// Every event in the log is delivered to every projection; a projection
/// advances its position even for events it ignores.
#[async_trait]
pub trait Projection: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, event: &EventEnvelope) -> Result<()>;

    async fn position(&self) -> ProjectionPosition;

    /// Clears the read model and rewinds to the start of the log.
    async fn reset(&self) -> Result<()>;
}

/// Decodes an envelope's payload as a domain event.
pub fn decode<E: DomainEvent>(event: &EventEnvelope) -> Result<E> {
    event.decode().map_err(|source| ProjectionError::Decode {
        event_type: event.event_type.clone(),
        source,
    })
}
