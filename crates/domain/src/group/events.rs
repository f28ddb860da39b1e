//! Table group domain events.

use chrono::{DateTime, Utc};
use common::{AggregateId, TenantScope};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::bill::BillOutcome;
use crate::money::Money;

/// Events that can occur on a table group aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GroupEvent {
    GroupOpened(GroupOpenedData),
    GroupBillStarted(GroupBillStartedData),
    GroupTotalUpdated(GroupTotalUpdatedData),
    GroupCollectionRequested(GroupCollectionRequestedData),
    GroupBillClosed(GroupBillClosedData),
    GroupClosed(GroupClosedData),
}

impl DomainEvent for GroupEvent {
    fn event_type(&self) -> &'static str {
        match self {
            GroupEvent::GroupOpened(_) => "GroupOpened",
            GroupEvent::GroupBillStarted(_) => "GroupBillStarted",
            GroupEvent::GroupTotalUpdated(_) => "GroupTotalUpdated",
            GroupEvent::GroupCollectionRequested(_) => "GroupCollectionRequested",
            GroupEvent::GroupBillClosed(_) => "GroupBillClosed",
            GroupEvent::GroupClosed(_) => "GroupClosed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupOpenedData {
    pub group_id: AggregateId,
    pub scope: TenantScope,
    pub server: String,
    /// Member tables, sorted.
    pub tables: Vec<AggregateId>,
    pub opened_at: DateTime<Utc>,
}

/// First submission against the group designated its running bill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupBillStartedData {
    pub order_id: AggregateId,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupTotalUpdatedData {
    pub order_id: AggregateId,
    pub total: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupCollectionRequestedData {
    pub total: Money,
    pub requested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupBillClosedData {
    pub order_id: AggregateId,
    pub outcome: BillOutcome,
    pub amount: Money,
    pub closed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupClosedData {
    pub closed_at: DateTime<Utc>,
}

impl GroupEvent {
    pub fn group_opened(
        group_id: AggregateId,
        scope: TenantScope,
        server: impl Into<String>,
        tables: Vec<AggregateId>,
    ) -> Self {
        GroupEvent::GroupOpened(GroupOpenedData {
            group_id,
            scope,
            server: server.into(),
            tables,
            opened_at: Utc::now(),
        })
    }

    pub fn bill_started(order_id: AggregateId) -> Self {
        GroupEvent::GroupBillStarted(GroupBillStartedData {
            order_id,
            started_at: Utc::now(),
        })
    }

    pub fn total_updated(order_id: AggregateId, total: Money) -> Self {
        GroupEvent::GroupTotalUpdated(GroupTotalUpdatedData { order_id, total })
    }

    pub fn collection_requested(total: Money) -> Self {
        GroupEvent::GroupCollectionRequested(GroupCollectionRequestedData {
            total,
            requested_at: Utc::now(),
        })
    }

    pub fn bill_closed(order_id: AggregateId, outcome: BillOutcome, amount: Money) -> Self {
        GroupEvent::GroupBillClosed(GroupBillClosedData {
            order_id,
            outcome,
            amount,
            closed_at: Utc::now(),
        })
    }

    pub fn group_closed() -> Self {
        GroupEvent::GroupClosed(GroupClosedData {
            closed_at: Utc::now(),
        })
    }
}
