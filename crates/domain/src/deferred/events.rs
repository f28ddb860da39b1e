//! Deferred payment domain events.

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::bill::{BillOutcome, BillRef};
use crate::money::Money;

/// Events that can occur on a deferred payment record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum DeferredEvent {
    DeferredPaymentOpened(DeferredPaymentOpenedData),
    PendingAmountAdjusted(PendingAmountAdjustedData),
    DeferredPaymentResolved(DeferredPaymentResolvedData),
    DeferredPaymentExpired(DeferredPaymentExpiredData),
}

impl DomainEvent for DeferredEvent {
    fn event_type(&self) -> &'static str {
        match self {
            DeferredEvent::DeferredPaymentOpened(_) => "DeferredPaymentOpened",
            DeferredEvent::PendingAmountAdjusted(_) => "PendingAmountAdjusted",
            DeferredEvent::DeferredPaymentResolved(_) => "DeferredPaymentResolved",
            DeferredEvent::DeferredPaymentExpired(_) => "DeferredPaymentExpired",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeferredPaymentOpenedData {
    pub record_id: AggregateId,
    pub order_id: AggregateId,
    pub target: BillRef,
    /// Order total at the moment of deferral.
    pub amount: Money,
    pub due_at: DateTime<Utc>,
    pub opened_at: DateTime<Utc>,
}

/// Items were appended to the deferred bill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingAmountAdjustedData {
    pub from: Money,
    pub to: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeferredPaymentResolvedData {
    pub outcome: BillOutcome,
    pub amount: Money,
    pub resolved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeferredPaymentExpiredData {
    pub expired_at: DateTime<Utc>,
}

impl DeferredEvent {
    pub fn opened(
        record_id: AggregateId,
        order_id: AggregateId,
        target: BillRef,
        amount: Money,
        due_at: DateTime<Utc>,
    ) -> Self {
        DeferredEvent::DeferredPaymentOpened(DeferredPaymentOpenedData {
            record_id,
            order_id,
            target,
            amount,
            due_at,
            opened_at: Utc::now(),
        })
    }

    pub fn amount_adjusted(from: Money, to: Money) -> Self {
        DeferredEvent::PendingAmountAdjusted(PendingAmountAdjustedData { from, to })
    }

    pub fn resolved(outcome: BillOutcome, amount: Money) -> Self {
        DeferredEvent::DeferredPaymentResolved(DeferredPaymentResolvedData {
            outcome,
            amount,
            resolved_at: Utc::now(),
        })
    }

    pub fn expired(expired_at: DateTime<Utc>) -> Self {
        DeferredEvent::DeferredPaymentExpired(DeferredPaymentExpiredData { expired_at })
    }
}
