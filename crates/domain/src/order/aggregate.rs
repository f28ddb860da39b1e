//! Order aggregate implementation.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use common::{AggregateId, TenantScope};
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, SnapshotCapable};
use crate::bill::BillRef;
use crate::money::Money;

use super::{
    LineItem, NewLineItem, OrderError, OrderEvent, OrderState,
    events::{ItemsAppendedData, OrderOpenedData},
};

/// Order aggregate root: one bill's line items from first submission to
/// payment or cancellation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Order {
    id: Option<AggregateId>,

    #[serde(default)]
    version: Version,

    /// Table or group the bill belongs to.
    target: Option<BillRef>,
    scope: Option<TenantScope>,
    server: String,
    state: OrderState,

    /// Lines in submission order.
    lines: Vec<LineItem>,

    /// Sum of every line's subtotal.
    total: Money,

    /// Number of submissions appended so far.
    batches: u32,

    #[serde(default)]
    submission_tokens: BTreeSet<String>,

    deferred_record: Option<AggregateId>,
    opened_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    closed_at: Option<DateTime<Utc>>,
    cancel_reason: Option<String>,
}

impl Aggregate for Order {
    type Event = OrderEvent;
    type Error = OrderError;

    fn aggregate_type() -> &'static str {
        "Order"
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
            OrderEvent::OrderOpened(data) => self.apply_order_opened(data),
            OrderEvent::ItemsAppended(data) => self.apply_items_appended(data),
            OrderEvent::StatusAdvanced(data) => {
                self.state = data.to;
                self.updated_at = Some(data.changed_at);
            }
            OrderEvent::PaymentDeferred(data) => {
                self.state = OrderState::PendingPayment;
                self.deferred_record = Some(data.record_id);
                self.updated_at = Some(data.deferred_at);
            }
            OrderEvent::OrderPaid(data) => {
                self.state = OrderState::Paid;
                self.closed_at = Some(data.paid_at);
            }
            OrderEvent::OrderCancelled(data) => {
                self.state = OrderState::Cancelled;
                self.cancel_reason = Some(data.reason);
                self.closed_at = Some(data.cancelled_at);
            }
        }
    }
}

impl SnapshotCapable for Order {
    fn snapshot_interval() -> usize {
        50
    }
}

// Query methods
impl Order {
    pub fn target(&self) -> Option<BillRef> {
        self.target
    }

    pub fn scope(&self) -> Option<TenantScope> {
        self.scope
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn state(&self) -> OrderState {
        self.state
    }

    pub fn lines(&self) -> &[LineItem] {
        &self.lines
    }

    /// Lines added by one submission.
    pub fn batch_lines(&self, batch: u32) -> impl Iterator<Item = &LineItem> {
        self.lines.iter().filter(move |line| line.batch == batch)
    }

    pub fn total(&self) -> Money {
        self.total
    }

    pub fn batches(&self) -> u32 {
        self.batches
    }

    pub fn deferred_record(&self) -> Option<AggregateId> {
        self.deferred_record
    }

    pub fn opened_at(&self) -> Option<DateTime<Utc>> {
        self.opened_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn closed_at(&self) -> Option<DateTime<Utc>> {
        self.closed_at
    }

    pub fn cancel_reason(&self) -> Option<&str> {
        self.cancel_reason.as_deref()
    }

    pub fn is_open(&self) -> bool {
        self.id.is_some() && self.state.is_open()
    }

    pub fn has_seen_token(&self, token: &str) -> bool {
        self.submission_tokens.contains(token)
    }

    /// Sum of the line subtotals, None on overflow.
    pub fn computed_total(&self) -> Option<Money> {
        Money::checked_sum(self.lines.iter().map(|line| line.subtotal))
    }
}

// Command methods (return events)
impl Order {
    /// Opens a bill in RECEIVED.
    pub fn open(
        &self,
        order_id: AggregateId,
        target: BillRef,
        scope: TenantScope,
        server: impl Into<String>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        if self.id.is_some() {
            return Err(OrderError::AlreadyOpened);
        }

        Ok(vec![OrderEvent::order_opened(order_id, target, scope, server)])
    }

    /// Appends a submission to the order.
    ///
    /// The total is recomputed over every line rather than incremented. A
    /// token that was already recorded yields no events.
    pub fn append_items(
        &self,
        items: Vec<NewLineItem>,
        submission_token: Option<String>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_open("append items")?;

        if items.is_empty() {
            return Err(OrderError::NoItems);
        }
        if let Some(token) = &submission_token
            && self.has_seen_token(token)
        {
            return Ok(vec![]);
        }

        let batch = self.batches + 1;
        let mut next_line = self.lines.len() as u32 + 1;
        let mut lines = Vec::with_capacity(items.len());
        for item in items {
            if item.quantity == 0 {
                return Err(OrderError::InvalidQuantity {
                    product_id: item.product_id.to_string(),
                    quantity: item.quantity,
                });
            }
            if item.unit_price.is_negative() {
                return Err(OrderError::InvalidPrice {
                    product_id: item.product_id.to_string(),
                    price: item.unit_price.cents(),
                });
            }
            let line = LineItem::priced(item, next_line, batch).ok_or(OrderError::TotalOverflow)?;
            lines.push(line);
            next_line += 1;
        }

        let total = Money::checked_sum(
            self.lines
                .iter()
                .chain(lines.iter())
                .map(|line| line.subtotal),
        )
        .ok_or(OrderError::TotalOverflow)?;

        let mut events = vec![OrderEvent::items_appended(
            batch,
            submission_token,
            lines,
            total,
        )];

        // New items need the kitchen again
        if matches!(self.state, OrderState::Ready | OrderState::Delivered) {
            events.push(OrderEvent::status_advanced(
                self.state,
                OrderState::Received,
            ));
        }

        Ok(events)
    }

    /// Moves the order forward along the kitchen track.
    ///
    /// Skipping ahead is allowed; moving back is not. Advancing to the
    /// current state yields no events.
    pub fn advance(&self, to: OrderState) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_open("advance")?;

        let target_rank = to.kitchen_rank().ok_or(OrderError::NotKitchenState(to))?;
        let current_rank = self
            .state
            .kitchen_rank()
            .ok_or(OrderError::InvalidStateTransition {
                current_state: self.state,
                action: "advance",
            })?;

        if target_rank == current_rank {
            return Ok(vec![]);
        }
        if target_rank < current_rank {
            return Err(OrderError::InvalidStateTransition {
                current_state: self.state,
                action: "move back",
            });
        }

        Ok(vec![OrderEvent::status_advanced(self.state, to)])
    }

    /// Marks the bill "pay later". Deferring a deferred order is a no-op.
    pub fn defer(&self, record_id: AggregateId) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_open("defer payment")?;

        if self.state == OrderState::PendingPayment {
            return Ok(vec![]);
        }
        if !self.total.is_positive() {
            return Err(OrderError::ZeroTotal);
        }

        Ok(vec![OrderEvent::payment_deferred(record_id, self.total)])
    }

    pub fn pay(&self) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_open("pay")?;
        Ok(vec![OrderEvent::order_paid(self.total)])
    }

    pub fn cancel(&self, reason: impl Into<String>) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_open("cancel")?;
        Ok(vec![OrderEvent::order_cancelled(reason)])
    }

    fn ensure_open(&self, action: &'static str) -> Result<(), OrderError> {
        if self.id.is_none() {
            return Err(OrderError::NotOpened);
        }
        if self.state.is_terminal() {
            return Err(OrderError::InvalidStateTransition {
                current_state: self.state,
                action,
            });
        }
        Ok(())
    }
}

// Apply event helpers
impl Order {
    fn apply_order_opened(&mut self, data: OrderOpenedData) {
        self.id = Some(data.order_id);
        self.target = Some(data.target);
        self.scope = Some(data.scope);
        self.server = data.server;
        self.state = OrderState::Received;
        self.opened_at = Some(data.opened_at);
        self.updated_at = Some(data.opened_at);
    }

    fn apply_items_appended(&mut self, data: ItemsAppendedData) {
        self.lines.extend(data.lines);
        self.total = data.total;
        self.batches = data.batch;
        if let Some(token) = data.submission_token {
            self.submission_tokens.insert(token);
        }
        self.updated_at = Some(data.appended_at);
    }
}
