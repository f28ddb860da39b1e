//! Engine error taxonomy.

use domain::{DeferredError, DomainError, GroupError, OrderError, TableError};
use thiserror::Error;

use crate::collaborators::{CollaboratorError, Feature};

/// Errors surfaced to callers of the consolidation services.
///
/// Each variant maps to one stable code (see [`EngineError::code`]).
#[derive(Debug, Error)]
pub enum EngineError {
    /// The target is in the wrong state for the operation.
    #[error("{0}")]
    TableUnavailable(String),

    /// Malformed or empty input.
    #[error("{0}")]
    InvalidRequest(String),

    #[error("Feature {feature} is not enabled for restaurant {restaurant_id}")]
    FeatureRestricted {
        feature: Feature,
        restaurant_id: i64,
    },

    /// Stored state breaks an invariant; needs reconciliation.
    #[error("Consistency violation: {0}")]
    ConsistencyViolation(String),

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    /// Optimistic version checks kept failing.
    #[error("Concurrent modification during {operation}; gave up after {retries} retries")]
    Conflict {
        operation: &'static str,
        retries: u32,
    },

    #[error("Collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),

    #[error("Domain error: {0}")]
    Domain(DomainError),
}

impl EngineError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::TableUnavailable(_) => "TABLE_UNAVAILABLE",
            EngineError::InvalidRequest(_) => "INVALID_REQUEST",
            EngineError::FeatureRestricted { .. } => "FEATURE_RESTRICTED",
            EngineError::ConsistencyViolation(_) => "CONSISTENCY_VIOLATION",
            EngineError::NotFound { .. } => "NOT_FOUND",
            EngineError::Conflict { .. } => "CONFLICT",
            EngineError::Domain(e) if e.is_conflict() => "CONFLICT",
            EngineError::Collaborator(_) | EngineError::Domain(_) => "INTERNAL",
        }
    }

    /// A lost optimistic-concurrency race that may be re-run from the read phase.
    pub fn is_retryable_conflict(&self) -> bool {
        matches!(self, EngineError::Domain(e) if e.is_conflict())
    }

    pub(crate) fn unavailable(message: impl Into<String>) -> Self {
        EngineError::TableUnavailable(message.into())
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        EngineError::InvalidRequest(message.into())
    }

    pub(crate) fn violation(message: impl Into<String>) -> Self {
        let message = message.into();
        metrics::counter!("consistency_violations_total").increment(1);
        tracing::error!(target: "reconciliation", %message, "consistency violation");
        EngineError::ConsistencyViolation(message)
    }
}

impl From<DomainError> for EngineError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::AggregateNotFound {
                aggregate_type,
                aggregate_id,
            } => EngineError::NotFound {
                kind: aggregate_type,
                id: aggregate_id,
            },
            DomainError::Table(e) => e.into(),
            DomainError::Order(e) => e.into(),
            DomainError::Group(e) => e.into(),
            DomainError::Deferred(e) => e.into(),
            other => EngineError::Domain(other),
        }
    }
}

impl From<TableError> for EngineError {
    fn from(err: TableError) -> Self {
        match err {
            TableError::NotRegistered => EngineError::NotFound {
                kind: "Table",
                id: "unregistered".to_string(),
            },
            TableError::AlreadyRegistered
            | TableError::InvalidCapacity(_)
            | TableError::InvalidAvailability(_) => EngineError::invalid(err.to_string()),
            TableError::Unavailable { .. }
            | TableError::InvalidStateTransition { .. }
            | TableError::ReleaseWithOpenBill { .. } => EngineError::unavailable(err.to_string()),
            TableError::NotActiveOrder { .. } | TableError::ConsistencyViolation { .. } => {
                EngineError::violation(err.to_string())
            }
        }
    }
}

impl From<OrderError> for EngineError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::NotOpened => EngineError::NotFound {
                kind: "Order",
                id: "unopened".to_string(),
            },
            OrderError::InvalidStateTransition { .. } => EngineError::unavailable(err.to_string()),
            OrderError::AlreadyOpened => EngineError::violation(err.to_string()),
            OrderError::NotKitchenState(_)
            | OrderError::NoItems
            | OrderError::InvalidQuantity { .. }
            | OrderError::InvalidPrice { .. }
            | OrderError::TotalOverflow
            | OrderError::ZeroTotal => EngineError::invalid(err.to_string()),
        }
    }
}

impl From<GroupError> for EngineError {
    fn from(err: GroupError) -> Self {
        match err {
            GroupError::TooFewTables(_) => EngineError::invalid(err.to_string()),
            GroupError::NotOpen | GroupError::NoOpenBill | GroupError::OpenBill { .. } => {
                EngineError::unavailable(err.to_string())
            }
            GroupError::AlreadyOpened
            | GroupError::BillAlreadyOpen { .. }
            | GroupError::NotActiveOrder { .. } => EngineError::violation(err.to_string()),
        }
    }
}

impl From<DeferredError> for EngineError {
    fn from(err: DeferredError) -> Self {
        match err {
            DeferredError::NotOpened => EngineError::NotFound {
                kind: "DeferredPayment",
                id: "unopened".to_string(),
            },
            DeferredError::NonPositiveAmount(_) => EngineError::invalid(err.to_string()),
            DeferredError::AlreadyResolved => EngineError::unavailable(err.to_string()),
            DeferredError::AlreadyOpened => EngineError::violation(err.to_string()),
        }
    }
}

/// Convenience type alias for engine results.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{Money, TableState};
    use event_store::{EventStoreError, Version};

    #[test]
    fn codes_follow_the_taxonomy() {
        let unavailable: EngineError = TableError::Unavailable {
            state: TableState::Maintenance,
        }
        .into();
        assert_eq!(unavailable.code(), "TABLE_UNAVAILABLE");

        let empty: EngineError = OrderError::NoItems.into();
        assert_eq!(empty.code(), "INVALID_REQUEST");

        let zero: EngineError = DeferredError::NonPositiveAmount(Money::zero()).into();
        assert_eq!(zero.code(), "INVALID_REQUEST");

        let restricted = EngineError::FeatureRestricted {
            feature: Feature::TableGrouping,
            restaurant_id: 1,
        };
        assert_eq!(restricted.code(), "FEATURE_RESTRICTED");

        let missing: EngineError = DomainError::AggregateNotFound {
            aggregate_type: "Table",
            aggregate_id: "x".to_string(),
        }
        .into();
        assert_eq!(missing.code(), "NOT_FOUND");
    }

    #[test]
    fn store_conflicts_are_retryable() {
        let conflict: EngineError = DomainError::EventStore(EventStoreError::ConcurrencyConflict {
            aggregate_id: common::AggregateId::new(),
            expected: Version::new(1),
            actual: Version::new(2),
        })
        .into();

        assert!(conflict.is_retryable_conflict());
        assert_eq!(conflict.code(), "CONFLICT");
        assert!(!EngineError::invalid("x").is_retryable_conflict());
    }
}
