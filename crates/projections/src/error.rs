//! Projection error types.

use thiserror::Error;

/// Errors that can occur while feeding events to read models.
#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("Event store error: {0}")]
    EventStore(#[from] event_store::EventStoreError),

    /// A stored payload does not decode as the event its stream declares.
    #[error("Cannot decode {event_type} event: {source}")]
    Decode {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;
