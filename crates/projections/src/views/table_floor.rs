//! Table floor board: every table of a branch with its running bill.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AggregateId, TableNumber, TenantScope};
use domain::{GroupEvent, Money, TableEvent, TableState};
use event_store::EventEnvelope;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::Result;
use crate::projection::{Projection, ProjectionPosition, decode};
use crate::read_model::ReadModel;

#[derive(Debug, Clone, Serialize)]
pub struct TableSummary {
    pub table_id: AggregateId,
    pub scope: TenantScope,
    pub number: TableNumber,
    pub capacity: u32,
    pub state: TableState,
    pub accumulated_total: Money,
    pub active_order_id: Option<AggregateId>,
    pub group_id: Option<AggregateId>,
    pub server: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Counts per state and money on the floor for one branch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableStats {
    pub total_tables: usize,
    pub free: usize,
    pub occupied: usize,
    pub pending_collection: usize,
    pub paid: usize,
    pub reserved: usize,
    pub maintenance: usize,
    pub grouped: usize,
    /// Sum of the tables' own accumulated totals.
    pub tables_total: Money,
    /// Sum of the running bills of open groups.
    pub groups_total: Money,
    pub open_groups: usize,
}

impl TableStats {
    /// Everything currently owed on the floor.
    pub fn open_bills_total(&self) -> Money {
        self.tables_total + self.groups_total
    }

    fn count(&mut self, state: TableState) {
        self.total_tables += 1;
        let slot = match state {
            TableState::Free => &mut self.free,
            TableState::Occupied => &mut self.occupied,
            TableState::PendingCollection => &mut self.pending_collection,
            TableState::Paid => &mut self.paid,
            TableState::Reserved => &mut self.reserved,
            TableState::Maintenance => &mut self.maintenance,
            TableState::Grouped => &mut self.grouped,
        };
        *slot += 1;
    }
}

/// An open table group with its member tables and running bill.
#[derive(Debug, Clone, Serialize)]
pub struct GroupSummary {
    pub group_id: AggregateId,
    pub scope: TenantScope,
    pub server: String,
    /// Member table numbers, ascending.
    pub table_numbers: Vec<TableNumber>,
    pub total: Money,
    pub active_order_id: Option<AggregateId>,
    pub opened_at: DateTime<Utc>,
    #[serde(skip)]
    tables: Vec<AggregateId>,
}

#[derive(Default)]
struct TableFloorState {
    tables: HashMap<AggregateId, TableSummary>,
    open_groups: HashMap<AggregateId, GroupSummary>,
    position: ProjectionPosition,
}

impl TableFloorState {
    fn apply_table(&mut self, table_id: AggregateId, event: TableEvent, at: DateTime<Utc>) {
        if let TableEvent::TableRegistered(data) = event {
            self.tables.insert(
                table_id,
                TableSummary {
                    table_id,
                    scope: data.scope,
                    number: data.number,
                    capacity: data.capacity,
                    state: TableState::Free,
                    accumulated_total: Money::zero(),
                    active_order_id: None,
                    group_id: None,
                    server: None,
                    updated_at: data.registered_at,
                },
            );
            return;
        }

        let Some(table) = self.tables.get_mut(&table_id) else {
            return;
        };
        table.updated_at = at;
        match event {
            TableEvent::TableRegistered(_) => {}
            TableEvent::AvailabilityChanged(data) => table.state = data.to,
            TableEvent::TableOccupied(data) => {
                table.state = TableState::Occupied;
                table.active_order_id = Some(data.order_id);
                table.server = Some(data.server);
                table.accumulated_total = Money::zero();
            }
            TableEvent::TableTotalUpdated(data) => table.accumulated_total = data.total,
            TableEvent::CollectionRequested(_) => table.state = TableState::PendingCollection,
            TableEvent::TablePaid(_) => {
                table.state = TableState::Paid;
                table.accumulated_total = Money::zero();
                table.active_order_id = None;
            }
            TableEvent::BillVoided(_) => {
                table.accumulated_total = Money::zero();
                table.active_order_id = None;
            }
            TableEvent::TableGrouped(data) => {
                table.state = TableState::Grouped;
                table.group_id = Some(data.group_id);
            }
            TableEvent::TableReleased(_) => {
                table.state = TableState::Free;
                table.group_id = None;
                table.server = None;
            }
        }
    }

    fn apply_group(&mut self, group_id: AggregateId, event: GroupEvent) {
        match event {
            GroupEvent::GroupOpened(data) => {
                self.open_groups.insert(
                    group_id,
                    GroupSummary {
                        group_id,
                        scope: data.scope,
                        server: data.server.clone(),
                        table_numbers: Vec::new(),
                        total: Money::zero(),
                        active_order_id: None,
                        opened_at: data.opened_at,
                        tables: data.tables.clone(),
                    },
                );
                for table_id in data.tables {
                    if let Some(table) = self.tables.get_mut(&table_id) {
                        table.server = Some(data.server.clone());
                    }
                }
            }
            GroupEvent::GroupBillStarted(data) => {
                if let Some(group) = self.open_groups.get_mut(&group_id) {
                    group.active_order_id = Some(data.order_id);
                    group.total = Money::zero();
                }
            }
            GroupEvent::GroupTotalUpdated(data) => {
                if let Some(group) = self.open_groups.get_mut(&group_id) {
                    group.total = data.total;
                }
            }
            GroupEvent::GroupBillClosed(_) => {
                if let Some(group) = self.open_groups.get_mut(&group_id) {
                    group.total = Money::zero();
                    group.active_order_id = None;
                }
            }
            GroupEvent::GroupClosed(_) => {
                self.open_groups.remove(&group_id);
            }
            GroupEvent::GroupCollectionRequested(_) => {}
        }
    }
}

/// Per-branch board of tables, fed by table and group streams.
#[derive(Clone, Default)]
pub struct TableFloorView {
    state: Arc<RwLock<TableFloorState>>,
}

impl TableFloorView {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_table(&self, table_id: AggregateId) -> Option<TableSummary> {
        self.state.read().await.tables.get(&table_id).cloned()
    }

    /// Tables of one branch ordered by number.
    pub async fn tables(&self, scope: TenantScope) -> Vec<TableSummary> {
        let state = self.state.read().await;
        let mut tables: Vec<TableSummary> = state
            .tables
            .values()
            .filter(|t| t.scope == scope)
            .cloned()
            .collect();
        tables.sort_by_key(|t| t.number);
        tables
    }

    pub async fn tables_in_state(&self, scope: TenantScope, state: TableState) -> Vec<TableSummary> {
        self.tables(scope)
            .await
            .into_iter()
            .filter(|t| t.state == state)
            .collect()
    }

    /// Open groups of one branch, oldest first.
    pub async fn open_groups(&self, scope: TenantScope) -> Vec<GroupSummary> {
        let state = self.state.read().await;
        let mut groups: Vec<GroupSummary> = state
            .open_groups
            .values()
            .filter(|g| g.scope == scope)
            .map(|group| {
                let mut group = group.clone();
                let mut numbers: Vec<TableNumber> = group
                    .tables
                    .iter()
                    .filter_map(|id| state.tables.get(id).map(|t| t.number))
                    .collect();
                numbers.sort();
                group.table_numbers = numbers;
                group
            })
            .collect();
        groups.sort_by_key(|g| g.opened_at);
        groups
    }

    pub async fn stats(&self, scope: TenantScope) -> TableStats {
        let state = self.state.read().await;
        let mut stats = TableStats::default();

        for table in state.tables.values().filter(|t| t.scope == scope) {
            stats.count(table.state);
            stats.tables_total += table.accumulated_total;
        }
        for group in state.open_groups.values().filter(|g| g.scope == scope) {
            stats.open_groups += 1;
            stats.groups_total += group.total;
        }

        stats
    }
}

#[async_trait]
impl Projection for TableFloorView {
    fn name(&self) -> &'static str {
        "TableFloorView"
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        let mut state = self.state.write().await;

        match event.aggregate_type.as_str() {
            "Table" => {
                let table_event: TableEvent = decode(event)?;
                state.apply_table(event.aggregate_id, table_event, event.timestamp);
            }
            "TableGroup" => {
                let group_event: GroupEvent = decode(event)?;
                state.apply_group(event.aggregate_id, group_event);
            }
            _ => {}
        }

        state.position = state.position.advance(event);
        Ok(())
    }

    async fn position(&self) -> ProjectionPosition {
        self.state.read().await.position
    }

    async fn reset(&self) -> Result<()> {
        *self.state.write().await = TableFloorState::default();
        Ok(())
    }
}

impl ReadModel for TableFloorView {
    fn name(&self) -> &'static str {
        "TableFloorView"
    }

    fn count(&self) -> usize {
        self.state.try_read().map(|s| s.tables.len()).unwrap_or(0)
    }
}
