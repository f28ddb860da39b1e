//! Table domain events.

use chrono::{DateTime, Utc};
use common::{AggregateId, TableNumber, TenantScope};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::money::Money;

use super::TableState;

/// Events that can occur on a table aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum TableEvent {
    TableRegistered(TableRegisteredData),
    AvailabilityChanged(AvailabilityChangedData),
    TableOccupied(TableOccupiedData),
    TableTotalUpdated(TableTotalUpdatedData),
    CollectionRequested(CollectionRequestedData),
    TablePaid(TablePaidData),
    BillVoided(BillVoidedData),
    TableGrouped(TableGroupedData),
    TableReleased(TableReleasedData),
}

impl DomainEvent for TableEvent {
    fn event_type(&self) -> &'static str {
        match self {
            TableEvent::TableRegistered(_) => "TableRegistered",
            TableEvent::AvailabilityChanged(_) => "AvailabilityChanged",
            TableEvent::TableOccupied(_) => "TableOccupied",
            TableEvent::TableTotalUpdated(_) => "TableTotalUpdated",
            TableEvent::CollectionRequested(_) => "CollectionRequested",
            TableEvent::TablePaid(_) => "TablePaid",
            TableEvent::BillVoided(_) => "BillVoided",
            TableEvent::TableGrouped(_) => "TableGrouped",
            TableEvent::TableReleased(_) => "TableReleased",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableRegisteredData {
    pub table_id: AggregateId,
    pub scope: TenantScope,
    pub number: TableNumber,
    pub capacity: u32,
    pub registered_at: DateTime<Utc>,
}

/// Administrative switch between FREE, RESERVED and MAINTENANCE.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityChangedData {
    pub from: TableState,
    pub to: TableState,
    pub changed_at: DateTime<Utc>,
}

/// First order recorded against a free table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableOccupiedData {
    pub order_id: AggregateId,
    pub server: String,
    pub occupied_at: DateTime<Utc>,
}

/// The open bill's total, recomputed from its line items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableTotalUpdatedData {
    pub order_id: AggregateId,
    pub total: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionRequestedData {
    pub total: Money,
    pub requested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TablePaidData {
    pub order_id: AggregateId,
    pub amount: Money,
    pub paid_at: DateTime<Utc>,
}

/// The open bill was cancelled; no payment was taken.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillVoidedData {
    pub order_id: AggregateId,
    pub voided_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableGroupedData {
    pub group_id: AggregateId,
    pub grouped_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableReleasedData {
    pub released_at: DateTime<Utc>,
}

impl TableEvent {
    pub fn table_registered(
        table_id: AggregateId,
        scope: TenantScope,
        number: TableNumber,
        capacity: u32,
    ) -> Self {
        TableEvent::TableRegistered(TableRegisteredData {
            table_id,
            scope,
            number,
            capacity,
            registered_at: Utc::now(),
        })
    }

    pub fn availability_changed(from: TableState, to: TableState) -> Self {
        TableEvent::AvailabilityChanged(AvailabilityChangedData {
            from,
            to,
            changed_at: Utc::now(),
        })
    }

    pub fn table_occupied(order_id: AggregateId, server: impl Into<String>) -> Self {
        TableEvent::TableOccupied(TableOccupiedData {
            order_id,
            server: server.into(),
            occupied_at: Utc::now(),
        })
    }

    pub fn total_updated(order_id: AggregateId, total: Money) -> Self {
        TableEvent::TableTotalUpdated(TableTotalUpdatedData { order_id, total })
    }

    pub fn collection_requested(total: Money) -> Self {
        TableEvent::CollectionRequested(CollectionRequestedData {
            total,
            requested_at: Utc::now(),
        })
    }

    pub fn table_paid(order_id: AggregateId, amount: Money) -> Self {
        TableEvent::TablePaid(TablePaidData {
            order_id,
            amount,
            paid_at: Utc::now(),
        })
    }

    pub fn bill_voided(order_id: AggregateId) -> Self {
        TableEvent::BillVoided(BillVoidedData {
            order_id,
            voided_at: Utc::now(),
        })
    }

    pub fn table_grouped(group_id: AggregateId) -> Self {
        TableEvent::TableGrouped(TableGroupedData {
            group_id,
            grouped_at: Utc::now(),
        })
    }

    pub fn table_released() -> Self {
        TableEvent::TableReleased(TableReleasedData {
            released_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_matches_variant() {
        let id = AggregateId::new();
        assert_eq!(
            TableEvent::table_occupied(id, "ana").event_type(),
            "TableOccupied"
        );
        assert_eq!(
            TableEvent::total_updated(id, Money::from_cents(4500)).event_type(),
            "TableTotalUpdated"
        );
        assert_eq!(TableEvent::table_released().event_type(), "TableReleased");
    }

    #[test]
    fn tagged_serialization() {
        let id = AggregateId::new();
        let event = TableEvent::total_updated(id, Money::from_cents(4500));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "TableTotalUpdated");
        assert_eq!(json["data"]["total"], 4500);

        let back: TableEvent = serde_json::from_value(json).unwrap();
        match back {
            TableEvent::TableTotalUpdated(data) => {
                assert_eq!(data.order_id, id);
                assert_eq!(data.total, Money::from_cents(4500));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
