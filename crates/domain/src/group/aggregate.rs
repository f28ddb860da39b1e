//! Table group aggregate implementation.

use chrono::{DateTime, Utc};
use common::{AggregateId, TenantScope};
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, SnapshotCapable};
use crate::bill::BillOutcome;
use crate::money::Money;

use super::{GroupError, GroupEvent, events::GroupOpenedData};

/// Lifecycle of a table group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GroupState {
    #[default]
    Open,
    Closed,
}

impl GroupState {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupState::Open => "OPEN",
            GroupState::Closed => "CLOSED",
        }
    }
}

impl std::fmt::Display for GroupState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Several tables with one server and one running bill.
///
/// Member tables ignore their own totals while grouped; the group's
/// `accumulated_total` mirrors the running order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableGroup {
    id: Option<AggregateId>,

    #[serde(default)]
    version: Version,

    scope: Option<TenantScope>,
    server: String,
    state: GroupState,
    tables: Vec<AggregateId>,
    active_order_id: Option<AggregateId>,
    accumulated_total: Money,
    pending_collection: bool,
    opened_at: Option<DateTime<Utc>>,
    closed_at: Option<DateTime<Utc>>,
}

impl Aggregate for TableGroup {
    type Event = GroupEvent;
    type Error = GroupError;

    fn aggregate_type() -> &'static str {
        "TableGroup"
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
            GroupEvent::GroupOpened(data) => self.apply_group_opened(data),
            GroupEvent::GroupBillStarted(data) => {
                self.active_order_id = Some(data.order_id);
                self.accumulated_total = Money::zero();
                self.pending_collection = false;
            }
            GroupEvent::GroupTotalUpdated(data) => {
                self.accumulated_total = data.total;
            }
            GroupEvent::GroupCollectionRequested(_) => {
                self.pending_collection = true;
            }
            GroupEvent::GroupBillClosed(_) => {
                self.active_order_id = None;
                self.accumulated_total = Money::zero();
                self.pending_collection = false;
            }
            GroupEvent::GroupClosed(data) => {
                self.state = GroupState::Closed;
                self.closed_at = Some(data.closed_at);
            }
        }
    }
}

impl SnapshotCapable for TableGroup {}

// Query methods
impl TableGroup {
    pub fn scope(&self) -> Option<TenantScope> {
        self.scope
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn state(&self) -> GroupState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.id.is_some() && self.state == GroupState::Open
    }

    /// Member tables in ascending id order.
    pub fn tables(&self) -> &[AggregateId] {
        &self.tables
    }

    pub fn contains(&self, table_id: AggregateId) -> bool {
        self.tables.binary_search(&table_id).is_ok()
    }

    pub fn active_order_id(&self) -> Option<AggregateId> {
        self.active_order_id
    }

    pub fn accumulated_total(&self) -> Money {
        self.accumulated_total
    }

    pub fn is_pending_collection(&self) -> bool {
        self.pending_collection
    }

    pub fn opened_at(&self) -> Option<DateTime<Utc>> {
        self.opened_at
    }

    pub fn closed_at(&self) -> Option<DateTime<Utc>> {
        self.closed_at
    }
}

// Command methods (return events)
impl TableGroup {
    /// Opens a group over at least two distinct tables.
    pub fn open(
        &self,
        group_id: AggregateId,
        scope: TenantScope,
        server: impl Into<String>,
        tables: Vec<AggregateId>,
    ) -> Result<Vec<GroupEvent>, GroupError> {
        if self.id.is_some() {
            return Err(GroupError::AlreadyOpened);
        }

        let mut tables = tables;
        tables.sort();
        tables.dedup();
        if tables.len() < 2 {
            return Err(GroupError::TooFewTables(tables.len()));
        }

        Ok(vec![GroupEvent::group_opened(
            group_id, scope, server, tables,
        )])
    }

    /// Designates the group's running bill.
    pub fn start_bill(&self, order_id: AggregateId) -> Result<Vec<GroupEvent>, GroupError> {
        self.ensure_open()?;
        if let Some(active) = self.active_order_id {
            return Err(GroupError::BillAlreadyOpen { order_id: active });
        }

        Ok(vec![GroupEvent::bill_started(order_id)])
    }

    pub fn update_total(
        &self,
        order_id: AggregateId,
        total: Money,
    ) -> Result<Vec<GroupEvent>, GroupError> {
        self.ensure_active_order(order_id)?;
        if self.accumulated_total == total {
            return Ok(vec![]);
        }

        Ok(vec![GroupEvent::total_updated(order_id, total)])
    }

    /// Idempotent when collection is already pending.
    pub fn request_collection(&self) -> Result<Vec<GroupEvent>, GroupError> {
        self.ensure_open()?;
        if self.active_order_id.is_none() {
            return Err(GroupError::NoOpenBill);
        }
        if self.pending_collection {
            return Ok(vec![]);
        }

        Ok(vec![GroupEvent::collection_requested(
            self.accumulated_total,
        )])
    }

    /// Ends the running bill; the group stays open for a new one.
    pub fn close_bill(&self, outcome: BillOutcome) -> Result<Vec<GroupEvent>, GroupError> {
        self.ensure_open()?;
        let order_id = self.active_order_id.ok_or(GroupError::NoOpenBill)?;
        let amount = match outcome {
            BillOutcome::Paid => self.accumulated_total,
            BillOutcome::Cancelled => Money::zero(),
        };

        Ok(vec![GroupEvent::bill_closed(order_id, outcome, amount)])
    }

    /// Only permitted once no bill is running.
    pub fn close(&self) -> Result<Vec<GroupEvent>, GroupError> {
        self.ensure_open()?;
        if self.active_order_id.is_some() {
            return Err(GroupError::OpenBill {
                total: self.accumulated_total,
            });
        }

        Ok(vec![GroupEvent::group_closed()])
    }

    fn ensure_open(&self) -> Result<(), GroupError> {
        if !self.is_open() {
            return Err(GroupError::NotOpen);
        }
        Ok(())
    }

    fn ensure_active_order(&self, order_id: AggregateId) -> Result<(), GroupError> {
        self.ensure_open()?;
        match self.active_order_id {
            Some(active) if active == order_id => Ok(()),
            Some(_) => Err(GroupError::NotActiveOrder { actual: order_id }),
            None => Err(GroupError::NoOpenBill),
        }
    }
}

// Apply event helpers
impl TableGroup {
    fn apply_group_opened(&mut self, data: GroupOpenedData) {
        self.id = Some(data.group_id);
        self.scope = Some(data.scope);
        self.server = data.server;
        self.tables = data.tables;
        self.state = GroupState::Open;
        self.opened_at = Some(data.opened_at);
    }
}
