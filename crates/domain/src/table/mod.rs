//! Table aggregate: the Table Registry's unit of state.

mod aggregate;
mod events;
mod state;

pub use aggregate::Table;
pub use events::{
    AvailabilityChangedData, BillVoidedData, CollectionRequestedData, TableEvent,
    TableGroupedData, TableOccupiedData, TablePaidData, TableRegisteredData, TableReleasedData,
    TableTotalUpdatedData,
};
pub use state::TableState;

use common::AggregateId;
use serde::Serialize;
use thiserror::Error;

use crate::money::Money;

/// A broken invariant found on a stored table, group or order.
///
/// These indicate an earlier defect, never a user mistake, and are reported
/// for reconciliation rather than corrected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum ConsistencyIssue {
    /// A FREE table still carries an accumulated total.
    FreeWithTotal { total: Money },
    /// A FREE table still references an order.
    FreeWithActiveOrder { order_id: AggregateId },
    /// A GROUPED table has no group, or a group that does not list it.
    OrphanedMembership { group_id: Option<AggregateId> },
    /// The cached total differs from the open order's total.
    TotalMismatch { cached: Money, actual: Money },
    /// An order's stored total is not the sum of its line subtotals.
    /// `computed` is None when the lines overflow.
    LineSumMismatch {
        order_id: AggregateId,
        stored: Money,
        computed: Option<Money>,
    },
}

impl std::fmt::Display for ConsistencyIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConsistencyIssue::FreeWithTotal { total } => {
                write!(f, "free table carries a total of {total}")
            }
            ConsistencyIssue::FreeWithActiveOrder { order_id } => {
                write!(f, "free table references order {order_id}")
            }
            ConsistencyIssue::OrphanedMembership { group_id: Some(id) } => {
                write!(f, "grouped table is not a member of group {id}")
            }
            ConsistencyIssue::OrphanedMembership { group_id: None } => {
                write!(f, "grouped table has no group")
            }
            ConsistencyIssue::TotalMismatch { cached, actual } => {
                write!(f, "cached total {cached} differs from order total {actual}")
            }
            ConsistencyIssue::LineSumMismatch {
                order_id,
                stored,
                computed: Some(computed),
            } => write!(
                f,
                "order {order_id} stores {stored} but its lines sum to {computed}"
            ),
            ConsistencyIssue::LineSumMismatch {
                order_id,
                stored,
                computed: None,
            } => write!(f, "order {order_id} stores {stored} but its lines overflow"),
        }
    }
}

/// Errors that can occur during table operations.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("Table already registered")]
    AlreadyRegistered,

    #[error("Table is not registered")]
    NotRegistered,

    #[error("Invalid capacity: {0} (must be greater than 0)")]
    InvalidCapacity(u32),

    /// RESERVED, MAINTENANCE or PAID tables take no orders.
    #[error("Table is {state} and cannot take orders")]
    Unavailable { state: TableState },

    #[error("Invalid state transition: cannot {action} from {current_state} state")]
    InvalidStateTransition {
        current_state: TableState,
        action: &'static str,
    },

    #[error("{0} is not an administrative availability")]
    InvalidAvailability(TableState),

    #[error("Order {actual} is not the table's active order")]
    NotActiveOrder { actual: AggregateId },

    #[error("Cannot release a table with an open bill of {total}")]
    ReleaseWithOpenBill { total: Money },

    #[error("Consistency violation on table {table_id}: {issue}")]
    ConsistencyViolation {
        table_id: AggregateId,
        issue: ConsistencyIssue,
    },
}
