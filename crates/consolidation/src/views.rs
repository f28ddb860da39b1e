//! Serializable views returned by the services.

use chrono::{DateTime, Utc};
use common::{AggregateId, TableNumber, TenantScope};
use domain::{
    Aggregate, BillOutcome, BillRef, DeferredPayment, DeferredState, GroupState, LineItem, Money,
    Order, OrderState, Table, TableGroup, TableState,
};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct TableView {
    pub table_id: AggregateId,
    pub scope: Option<TenantScope>,
    pub number: TableNumber,
    pub capacity: u32,
    pub state: TableState,
    pub accumulated_total: Money,
    pub active_order_id: Option<AggregateId>,
    pub group_id: Option<AggregateId>,
    pub server: Option<String>,
    pub opened_at: Option<DateTime<Utc>>,
    pub version: i64,
}

impl From<&Table> for TableView {
    fn from(table: &Table) -> Self {
        Self {
            table_id: table.id().unwrap_or_default(),
            scope: table.scope(),
            number: table.number(),
            capacity: table.capacity(),
            state: table.state(),
            accumulated_total: table.accumulated_total(),
            active_order_id: table.active_order_id(),
            group_id: table.group_id(),
            server: table.server().map(str::to_string),
            opened_at: table.opened_at(),
            version: table.version().as_i64(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupView {
    pub group_id: AggregateId,
    pub scope: Option<TenantScope>,
    pub server: String,
    pub state: GroupState,
    pub tables: Vec<AggregateId>,
    pub active_order_id: Option<AggregateId>,
    pub accumulated_total: Money,
    pub pending_collection: bool,
    pub opened_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl From<&TableGroup> for GroupView {
    fn from(group: &TableGroup) -> Self {
        Self {
            group_id: group.id().unwrap_or_default(),
            scope: group.scope(),
            server: group.server().to_string(),
            state: group.state(),
            tables: group.tables().to_vec(),
            active_order_id: group.active_order_id(),
            accumulated_total: group.accumulated_total(),
            pending_collection: group.is_pending_collection(),
            opened_at: group.opened_at(),
            closed_at: group.closed_at(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderView {
    pub order_id: AggregateId,
    pub target: Option<BillRef>,
    pub server: String,
    pub state: OrderState,
    pub lines: Vec<LineItem>,
    pub total: Money,
    pub batches: u32,
    pub deferred_record: Option<AggregateId>,
    pub opened_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
}

impl From<&Order> for OrderView {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id().unwrap_or_default(),
            target: order.target(),
            server: order.server().to_string(),
            state: order.state(),
            lines: order.lines().to_vec(),
            total: order.total(),
            batches: order.batches(),
            deferred_record: order.deferred_record(),
            opened_at: order.opened_at(),
            updated_at: order.updated_at(),
            closed_at: order.closed_at(),
            cancel_reason: order.cancel_reason().map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeferredView {
    pub record_id: AggregateId,
    pub order_id: Option<AggregateId>,
    pub target: Option<BillRef>,
    pub pending_amount: Money,
    pub state: DeferredState,
    pub outcome: Option<BillOutcome>,
    pub due_at: Option<DateTime<Utc>>,
    pub opened_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl From<&DeferredPayment> for DeferredView {
    fn from(record: &DeferredPayment) -> Self {
        Self {
            record_id: record.id().unwrap_or_default(),
            order_id: record.order_id(),
            target: record.target(),
            pending_amount: record.pending_amount(),
            state: record.state(),
            outcome: record.outcome(),
            due_at: record.due_at(),
            opened_at: record.opened_at(),
            resolved_at: record.resolved_at(),
        }
    }
}

/// The table or group holding a bill.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HolderView {
    Table(TableView),
    Group(GroupView),
}

/// Result of a submission.
#[derive(Debug, Clone, Serialize)]
pub struct Submission {
    pub order: OrderView,
    pub new_total: Money,
    /// True when the submission opened a new order.
    pub created: bool,
    /// True when the submission token had already been applied.
    pub duplicate: bool,
    pub holder: HolderView,
}

/// Result of closing a bill.
#[derive(Debug, Clone, Serialize)]
pub struct ClosedBill {
    pub order: OrderView,
    pub outcome: BillOutcome,
    pub amount: Money,
    pub holder: HolderView,
    pub deferred: Option<DeferredView>,
}

/// Pre-invoice for an open bill.
#[derive(Debug, Clone, Serialize)]
pub struct Prebill {
    pub target: BillRef,
    pub table_numbers: Vec<TableNumber>,
    pub order_id: AggregateId,
    pub server: String,
    pub state: OrderState,
    pub lines: Vec<LineItem>,
    pub total: Money,
    pub issued_at: DateTime<Utc>,
}

/// A deferral together with the holder it put into collection.
#[derive(Debug, Clone, Serialize)]
pub struct Deferral {
    pub record: DeferredView,
    pub order: OrderView,
    pub holder: HolderView,
}
