//! External collaborator traits and in-memory implementations.

pub mod feature_gate;
pub mod kitchen;

use thiserror::Error;

pub use feature_gate::{Feature, FeatureGate, InMemoryFeatureGate};
pub use kitchen::{
    InMemoryKitchenNotifier, KitchenNotifier, KitchenTicket, LoggingKitchenNotifier, TicketId,
};

/// A collaborator could not answer.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),

    #[error("Collaborator rejected the request: {0}")]
    Rejected(String),
}
