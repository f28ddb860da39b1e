//! Table group aggregate: several tables sharing one running bill.

mod aggregate;
mod events;

pub use aggregate::{GroupState, TableGroup};
pub use events::{
    GroupBillClosedData, GroupBillStartedData, GroupClosedData, GroupCollectionRequestedData,
    GroupEvent, GroupOpenedData, GroupTotalUpdatedData,
};

use common::AggregateId;
use thiserror::Error;

use crate::money::Money;

/// Errors that can occur during table group operations.
#[derive(Debug, Error)]
pub enum GroupError {
    #[error("A group needs at least two distinct tables, got {0}")]
    TooFewTables(usize),

    #[error("Group already opened")]
    AlreadyOpened,

    #[error("Group is not open")]
    NotOpen,

    #[error("Group already has an open bill (order {order_id})")]
    BillAlreadyOpen { order_id: AggregateId },

    #[error("Group has no open bill")]
    NoOpenBill,

    #[error("Order {actual} is not the group's running bill")]
    NotActiveOrder { actual: AggregateId },

    #[error("Cannot close a group with an open bill of {total}")]
    OpenBill { total: Money },
}
