//! Order domain events.

use chrono::{DateTime, Utc};
use common::{AggregateId, TenantScope};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::bill::BillRef;
use crate::money::Money;

use super::{LineItem, OrderState};

/// Events that can occur on an order aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    /// A bill was opened against a table or group.
    OrderOpened(OrderOpenedData),

    /// A submission added lines; carries the recomputed total.
    ItemsAppended(ItemsAppendedData),

    /// Kitchen progress, or a return to RECEIVED after new items.
    StatusAdvanced(StatusAdvancedData),

    /// The bill was marked "pay later".
    PaymentDeferred(PaymentDeferredData),

    OrderPaid(OrderPaidData),

    OrderCancelled(OrderCancelledData),
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderOpened(_) => "OrderOpened",
            OrderEvent::ItemsAppended(_) => "ItemsAppended",
            OrderEvent::StatusAdvanced(_) => "StatusAdvanced",
            OrderEvent::PaymentDeferred(_) => "PaymentDeferred",
            OrderEvent::OrderPaid(_) => "OrderPaid",
            OrderEvent::OrderCancelled(_) => "OrderCancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderOpenedData {
    pub order_id: AggregateId,
    pub target: BillRef,
    pub scope: TenantScope,
    /// Server attending the bill.
    pub server: String,
    pub opened_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemsAppendedData {
    pub batch: u32,
    /// Client-generated token used to drop re-submitted batches.
    pub submission_token: Option<String>,
    pub lines: Vec<LineItem>,
    /// Sum over every line of the order after this append.
    pub total: Money,
    pub appended_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusAdvancedData {
    pub from: OrderState,
    pub to: OrderState,
    pub changed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentDeferredData {
    pub record_id: AggregateId,
    pub amount: Money,
    pub deferred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPaidData {
    pub amount: Money,
    pub paid_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCancelledData {
    pub reason: String,
    pub cancelled_at: DateTime<Utc>,
}

impl OrderEvent {
    pub fn order_opened(
        order_id: AggregateId,
        target: BillRef,
        scope: TenantScope,
        server: impl Into<String>,
    ) -> Self {
        OrderEvent::OrderOpened(OrderOpenedData {
            order_id,
            target,
            scope,
            server: server.into(),
            opened_at: Utc::now(),
        })
    }

    pub fn items_appended(
        batch: u32,
        submission_token: Option<String>,
        lines: Vec<LineItem>,
        total: Money,
    ) -> Self {
        OrderEvent::ItemsAppended(ItemsAppendedData {
            batch,
            submission_token,
            lines,
            total,
            appended_at: Utc::now(),
        })
    }

    pub fn status_advanced(from: OrderState, to: OrderState) -> Self {
        OrderEvent::StatusAdvanced(StatusAdvancedData {
            from,
            to,
            changed_at: Utc::now(),
        })
    }

    pub fn payment_deferred(record_id: AggregateId, amount: Money) -> Self {
        OrderEvent::PaymentDeferred(PaymentDeferredData {
            record_id,
            amount,
            deferred_at: Utc::now(),
        })
    }

    pub fn order_paid(amount: Money) -> Self {
        OrderEvent::OrderPaid(OrderPaidData {
            amount,
            paid_at: Utc::now(),
        })
    }

    pub fn order_cancelled(reason: impl Into<String>) -> Self {
        OrderEvent::OrderCancelled(OrderCancelledData {
            reason: reason.into(),
            cancelled_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type() {
        let event = OrderEvent::order_opened(
            AggregateId::new(),
            BillRef::Table(AggregateId::new()),
            TenantScope::new(1, 1),
            "ana",
        );
        assert_eq!(event.event_type(), "OrderOpened");
        assert_eq!(
            OrderEvent::order_paid(Money::from_cents(100)).event_type(),
            "OrderPaid"
        );
    }

    #[test]
    fn test_serialization_carries_target() {
        let table_id = AggregateId::new();
        let event = OrderEvent::order_opened(
            AggregateId::new(),
            BillRef::Table(table_id),
            TenantScope::new(1, 1),
            "ana",
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "OrderOpened");
        assert_eq!(json["data"]["target"]["kind"], "table");
        assert_eq!(json["data"]["target"]["id"], table_id.to_string());
    }
}
