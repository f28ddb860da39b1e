//! Deferred payment aggregate implementation.

use chrono::{DateTime, Utc};
use common::AggregateId;
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, SnapshotCapable};
use crate::bill::{BillOutcome, BillRef};
use crate::money::Money;

use super::{DeferredError, DeferredEvent, events::DeferredPaymentOpenedData};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeferredState {
    #[default]
    Pending,
    Resolved,
    /// Past due; still collectible.
    Expired,
}

impl DeferredState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeferredState::Pending => "PENDING",
            DeferredState::Resolved => "RESOLVED",
            DeferredState::Expired => "EXPIRED",
        }
    }
}

impl std::fmt::Display for DeferredState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A bill marked for later collection, with a snapshot of the amount owed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeferredPayment {
    id: Option<AggregateId>,

    #[serde(default)]
    version: Version,

    order_id: Option<AggregateId>,
    target: Option<BillRef>,
    pending_amount: Money,
    due_at: Option<DateTime<Utc>>,
    state: DeferredState,
    outcome: Option<BillOutcome>,
    opened_at: Option<DateTime<Utc>>,
    resolved_at: Option<DateTime<Utc>>,
}

impl Aggregate for DeferredPayment {
    type Event = DeferredEvent;
    type Error = DeferredError;

    fn aggregate_type() -> &'static str {
        "DeferredPayment"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            DeferredEvent::DeferredPaymentOpened(data) => self.apply_opened(data),
            DeferredEvent::PendingAmountAdjusted(data) => {
                self.pending_amount = data.to;
            }
            DeferredEvent::DeferredPaymentResolved(data) => {
                self.state = DeferredState::Resolved;
                self.outcome = Some(data.outcome);
                self.resolved_at = Some(data.resolved_at);
            }
            DeferredEvent::DeferredPaymentExpired(_) => {
                self.state = DeferredState::Expired;
            }
        }
    }
}

impl SnapshotCapable for DeferredPayment {}

// Query methods
impl DeferredPayment {
    pub fn order_id(&self) -> Option<AggregateId> {
        self.order_id
    }

    pub fn target(&self) -> Option<BillRef> {
        self.target
    }

    pub fn pending_amount(&self) -> Money {
        self.pending_amount
    }

    pub fn due_at(&self) -> Option<DateTime<Utc>> {
        self.due_at
    }

    pub fn state(&self) -> DeferredState {
        self.state
    }

    pub fn outcome(&self) -> Option<BillOutcome> {
        self.outcome
    }

    pub fn opened_at(&self) -> Option<DateTime<Utc>> {
        self.opened_at
    }

    pub fn resolved_at(&self) -> Option<DateTime<Utc>> {
        self.resolved_at
    }

    pub fn is_outstanding(&self) -> bool {
        self.id.is_some() && self.state != DeferredState::Resolved
    }
}

// Command methods (return events)
impl DeferredPayment {
    pub fn open(
        &self,
        record_id: AggregateId,
        order_id: AggregateId,
        target: BillRef,
        amount: Money,
        due_at: DateTime<Utc>,
    ) -> Result<Vec<DeferredEvent>, DeferredError> {
        if self.id.is_some() {
            return Err(DeferredError::AlreadyOpened);
        }
        if !amount.is_positive() {
            return Err(DeferredError::NonPositiveAmount(amount));
        }

        Ok(vec![DeferredEvent::opened(
            record_id, order_id, target, amount, due_at,
        )])
    }

    /// Keeps the snapshot equal to the order total after an append.
    pub fn adjust(&self, amount: Money) -> Result<Vec<DeferredEvent>, DeferredError> {
        self.ensure_outstanding()?;
        if amount == self.pending_amount {
            return Ok(vec![]);
        }

        Ok(vec![DeferredEvent::amount_adjusted(
            self.pending_amount,
            amount,
        )])
    }

    pub fn resolve(&self, outcome: BillOutcome) -> Result<Vec<DeferredEvent>, DeferredError> {
        self.ensure_outstanding()?;
        Ok(vec![DeferredEvent::resolved(outcome, self.pending_amount)])
    }

    /// PENDING → EXPIRED once `due_at` has passed; otherwise nothing.
    pub fn expire(&self, now: DateTime<Utc>) -> Result<Vec<DeferredEvent>, DeferredError> {
        if self.id.is_none() {
            return Err(DeferredError::NotOpened);
        }
        match (self.state, self.due_at) {
            (DeferredState::Pending, Some(due_at)) if due_at <= now => {
                Ok(vec![DeferredEvent::expired(now)])
            }
            _ => Ok(vec![]),
        }
    }

    fn ensure_outstanding(&self) -> Result<(), DeferredError> {
        if self.id.is_none() {
            return Err(DeferredError::NotOpened);
        }
        if self.state == DeferredState::Resolved {
            return Err(DeferredError::AlreadyResolved);
        }
        Ok(())
    }
}

// Apply event helpers
impl DeferredPayment {
    fn apply_opened(&mut self, data: DeferredPaymentOpenedData) {
        self.id = Some(data.record_id);
        self.order_id = Some(data.order_id);
        self.target = Some(data.target);
        self.pending_amount = data.amount;
        self.due_at = Some(data.due_at);
        self.state = DeferredState::Pending;
        self.opened_at = Some(data.opened_at);
    }
}
