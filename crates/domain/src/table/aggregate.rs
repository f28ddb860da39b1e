//! Table aggregate implementation.

use chrono::{DateTime, Utc};
use common::{AggregateId, TableNumber, TenantScope};
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, SnapshotCapable};
use crate::money::Money;

use super::{ConsistencyIssue, TableError, TableEvent, TableState};

/// A physical table and the denormalized state of its running bill.
///
/// `accumulated_total` is a cache of the open order's total; it is written in
/// the same commit as every order change and reset only when the bill is paid
/// or voided.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Table {
    id: Option<AggregateId>,

    #[serde(default)]
    version: Version,

    scope: Option<TenantScope>,
    number: TableNumber,
    capacity: u32,
    state: TableState,
    accumulated_total: Money,
    active_order_id: Option<AggregateId>,
    group_id: Option<AggregateId>,

    /// Server attending the current bill.
    server: Option<String>,
    opened_at: Option<DateTime<Utc>>,
    closed_at: Option<DateTime<Utc>>,
}

impl Aggregate for Table {
    type Event = TableEvent;
    type Error = TableError;

    fn aggregate_type() -> &'static str {
        "Table"
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
            TableEvent::TableRegistered(data) => {
                self.id = Some(data.table_id);
                self.scope = Some(data.scope);
                self.number = data.number;
                self.capacity = data.capacity;
                self.state = TableState::Free;
            }
            TableEvent::AvailabilityChanged(data) => {
                self.state = data.to;
            }
            TableEvent::TableOccupied(data) => {
                self.state = TableState::Occupied;
                self.active_order_id = Some(data.order_id);
                self.server = Some(data.server);
                self.accumulated_total = Money::zero();
                self.opened_at = Some(data.occupied_at);
                self.closed_at = None;
            }
            TableEvent::TableTotalUpdated(data) => {
                self.accumulated_total = data.total;
            }
            TableEvent::CollectionRequested(_) => {
                self.state = TableState::PendingCollection;
            }
            TableEvent::TablePaid(data) => {
                self.state = TableState::Paid;
                self.accumulated_total = Money::zero();
                self.active_order_id = None;
                self.closed_at = Some(data.paid_at);
            }
            TableEvent::BillVoided(data) => {
                self.accumulated_total = Money::zero();
                self.active_order_id = None;
                self.closed_at = Some(data.voided_at);
            }
            TableEvent::TableGrouped(data) => {
                self.state = TableState::Grouped;
                self.group_id = Some(data.group_id);
            }
            TableEvent::TableReleased(_) => {
                self.state = TableState::Free;
                self.group_id = None;
                self.server = None;
            }
        }
    }
}

impl SnapshotCapable for Table {
    fn snapshot_interval() -> usize {
        50
    }
}

// Query methods
impl Table {
    pub fn scope(&self) -> Option<TenantScope> {
        self.scope
    }

    pub fn number(&self) -> TableNumber {
        self.number
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn state(&self) -> TableState {
        self.state
    }

    pub fn accumulated_total(&self) -> Money {
        self.accumulated_total
    }

    pub fn active_order_id(&self) -> Option<AggregateId> {
        self.active_order_id
    }

    pub fn group_id(&self) -> Option<AggregateId> {
        self.group_id
    }

    pub fn server(&self) -> Option<&str> {
        self.server.as_deref()
    }

    pub fn opened_at(&self) -> Option<DateTime<Utc>> {
        self.opened_at
    }

    pub fn closed_at(&self) -> Option<DateTime<Utc>> {
        self.closed_at
    }

    /// Returns the invariant violations visible on this table alone.
    pub fn consistency_issues(&self) -> Vec<ConsistencyIssue> {
        let mut issues = Vec::new();
        match self.state {
            TableState::Free => {
                if !self.accumulated_total.is_zero() {
                    issues.push(ConsistencyIssue::FreeWithTotal {
                        total: self.accumulated_total,
                    });
                }
                if let Some(order_id) = self.active_order_id {
                    issues.push(ConsistencyIssue::FreeWithActiveOrder { order_id });
                }
            }
            TableState::Grouped if self.group_id.is_none() => {
                issues.push(ConsistencyIssue::OrphanedMembership { group_id: None });
            }
            _ => {}
        }
        issues
    }
}

// Command methods (return events)
impl Table {
    pub fn register(
        &self,
        table_id: AggregateId,
        scope: TenantScope,
        number: TableNumber,
        capacity: u32,
    ) -> Result<Vec<TableEvent>, TableError> {
        if self.id.is_some() {
            return Err(TableError::AlreadyRegistered);
        }
        if capacity == 0 {
            return Err(TableError::InvalidCapacity(capacity));
        }

        Ok(vec![TableEvent::table_registered(
            table_id, scope, number, capacity,
        )])
    }

    /// Administrative switch between FREE, RESERVED and MAINTENANCE.
    pub fn set_availability(&self, to: TableState) -> Result<Vec<TableEvent>, TableError> {
        self.ensure_registered()?;

        if !to.is_administrative() {
            return Err(TableError::InvalidAvailability(to));
        }
        if !self.state.is_administrative() {
            return Err(TableError::InvalidStateTransition {
                current_state: self.state,
                action: "change availability",
            });
        }
        if self.state == to {
            return Ok(vec![]);
        }

        Ok(vec![TableEvent::availability_changed(self.state, to)])
    }

    /// Rejects RESERVED, MAINTENANCE and PAID tables.
    pub fn ensure_accepts_orders(&self) -> Result<(), TableError> {
        self.ensure_registered()?;
        if self.state.accepts_orders() {
            Ok(())
        } else {
            Err(TableError::Unavailable { state: self.state })
        }
    }

    /// Opens a bill on a free table.
    pub fn occupy(
        &self,
        order_id: AggregateId,
        server: impl Into<String>,
    ) -> Result<Vec<TableEvent>, TableError> {
        self.ensure_accepts_orders()?;
        if self.state != TableState::Free {
            return Err(TableError::InvalidStateTransition {
                current_state: self.state,
                action: "occupy",
            });
        }

        Ok(vec![TableEvent::table_occupied(order_id, server)])
    }

    /// Records the recomputed total of the active order.
    pub fn update_total(
        &self,
        order_id: AggregateId,
        total: Money,
    ) -> Result<Vec<TableEvent>, TableError> {
        self.ensure_registered()?;
        if !self.state.has_open_bill() {
            return Err(TableError::InvalidStateTransition {
                current_state: self.state,
                action: "update total",
            });
        }
        self.ensure_active_order(order_id)?;
        if self.accumulated_total == total {
            return Ok(vec![]);
        }

        Ok(vec![TableEvent::total_updated(order_id, total)])
    }

    /// OCCUPIED → PENDING_COLLECTION. A table already pending is left as is.
    pub fn request_collection(&self) -> Result<Vec<TableEvent>, TableError> {
        self.ensure_registered()?;
        match self.state {
            TableState::Occupied => Ok(vec![TableEvent::collection_requested(
                self.accumulated_total,
            )]),
            TableState::PendingCollection => Ok(vec![]),
            state => Err(TableError::InvalidStateTransition {
                current_state: state,
                action: "request collection",
            }),
        }
    }

    /// Confirms payment: total goes to zero and the order is detached.
    pub fn settle(&self) -> Result<Vec<TableEvent>, TableError> {
        let order_id = self.open_bill("settle")?;
        Ok(vec![TableEvent::table_paid(order_id, self.accumulated_total)])
    }

    /// Cancels the running bill without a payment.
    pub fn void_bill(&self) -> Result<Vec<TableEvent>, TableError> {
        let order_id = self.open_bill("void bill")?;
        Ok(vec![TableEvent::bill_voided(order_id)])
    }

    pub fn join_group(&self, group_id: AggregateId) -> Result<Vec<TableEvent>, TableError> {
        self.ensure_registered()?;
        if self.state != TableState::Free || self.group_id.is_some() {
            return Err(TableError::InvalidStateTransition {
                current_state: self.state,
                action: "join group",
            });
        }

        Ok(vec![TableEvent::table_grouped(group_id)])
    }

    /// Returns the table to FREE.
    ///
    /// Only a table whose bill has already been settled or voided (or whose
    /// group is closing) may be released, so a FREE table never carries a
    /// total.
    pub fn release(&self) -> Result<Vec<TableEvent>, TableError> {
        self.ensure_registered()?;
        if self.state == TableState::Free {
            return Ok(vec![]);
        }
        if matches!(self.state, TableState::Reserved | TableState::Maintenance) {
            return Err(TableError::InvalidStateTransition {
                current_state: self.state,
                action: "release",
            });
        }
        if !self.accumulated_total.is_zero() || self.active_order_id.is_some() {
            return Err(TableError::ReleaseWithOpenBill {
                total: self.accumulated_total,
            });
        }

        Ok(vec![TableEvent::table_released()])
    }

    /// Fails with the first invariant violation found.
    pub fn check_consistency(&self) -> Result<(), TableError> {
        match (self.id, self.consistency_issues().into_iter().next()) {
            (Some(table_id), Some(issue)) => {
                Err(TableError::ConsistencyViolation { table_id, issue })
            }
            _ => Ok(()),
        }
    }

    fn ensure_registered(&self) -> Result<(), TableError> {
        if self.id.is_none() {
            return Err(TableError::NotRegistered);
        }
        Ok(())
    }

    fn ensure_active_order(&self, order_id: AggregateId) -> Result<(), TableError> {
        if self.active_order_id != Some(order_id) {
            return Err(TableError::NotActiveOrder { actual: order_id });
        }
        Ok(())
    }

    fn open_bill(&self, action: &'static str) -> Result<AggregateId, TableError> {
        self.ensure_registered()?;
        match (self.state.has_open_bill(), self.active_order_id) {
            (true, Some(order_id)) => Ok(order_id),
            _ => Err(TableError::InvalidStateTransition {
                current_state: self.state,
                action,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registered() -> Table {
        let mut table = Table::default();
        let events = table
            .register(
                AggregateId::new(),
                TenantScope::new(1, 1),
                TableNumber(5),
                4,
            )
            .unwrap();
        table.apply_events(events);
        table
    }

    fn occupied(total_cents: i64) -> (Table, AggregateId) {
        let mut table = registered();
        let order_id = AggregateId::new();
        table.apply_events(table.occupy(order_id, "ana").unwrap());
        table.apply_events(
            table
                .update_total(order_id, Money::from_cents(total_cents))
                .unwrap(),
        );
        (table, order_id)
    }

    #[test]
    fn register_starts_free() {
        let table = registered();
        assert_eq!(table.state(), TableState::Free);
        assert_eq!(table.number(), TableNumber(5));
        assert_eq!(table.capacity(), 4);
        assert!(table.accumulated_total().is_zero());
    }

    #[test]
    fn register_twice_or_zero_capacity_fails() {
        let table = registered();
        assert!(matches!(
            table.register(AggregateId::new(), TenantScope::new(1, 1), TableNumber(5), 4),
            Err(TableError::AlreadyRegistered)
        ));
        assert!(matches!(
            Table::default().register(
                AggregateId::new(),
                TenantScope::new(1, 1),
                TableNumber(1),
                0
            ),
            Err(TableError::InvalidCapacity(0))
        ));
    }

    #[test]
    fn occupy_then_update_total() {
        let (table, order_id) = occupied(3000);
        assert_eq!(table.state(), TableState::Occupied);
        assert_eq!(table.active_order_id(), Some(order_id));
        assert_eq!(table.accumulated_total(), Money::from_cents(3000));
        assert_eq!(table.server(), Some("ana"));
    }

    #[test]
    fn unchanged_total_records_nothing() {
        let (table, order_id) = occupied(3000);
        assert!(
            table
                .update_total(order_id, Money::from_cents(3000))
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn update_total_for_foreign_order_fails() {
        let (table, _) = occupied(3000);
        assert!(matches!(
            table.update_total(AggregateId::new(), Money::from_cents(10)),
            Err(TableError::NotActiveOrder { .. })
        ));
    }

    #[test]
    fn maintenance_rejects_orders() {
        let mut table = registered();
        table.apply_events(table.set_availability(TableState::Maintenance).unwrap());

        assert!(matches!(
            table.ensure_accepts_orders(),
            Err(TableError::Unavailable {
                state: TableState::Maintenance
            })
        ));
        assert!(table.occupy(AggregateId::new(), "ana").is_err());
    }

    #[test]
    fn availability_cannot_change_during_a_bill() {
        let (table, _) = occupied(1500);
        assert!(matches!(
            table.set_availability(TableState::Reserved),
            Err(TableError::InvalidStateTransition { .. })
        ));
        assert!(matches!(
            registered().set_availability(TableState::Occupied),
            Err(TableError::InvalidAvailability(TableState::Occupied))
        ));
    }

    #[test]
    fn request_collection_is_idempotent() {
        let (mut table, _) = occupied(4500);
        table.apply_events(table.request_collection().unwrap());
        assert_eq!(table.state(), TableState::PendingCollection);
        assert!(table.request_collection().unwrap().is_empty());
    }

    #[test]
    fn settle_resets_total_then_release_frees() {
        let (mut table, _) = occupied(4500);
        table.apply_events(table.request_collection().unwrap());
        table.apply_events(table.settle().unwrap());

        assert_eq!(table.state(), TableState::Paid);
        assert!(table.accumulated_total().is_zero());
        assert!(table.active_order_id().is_none());

        table.apply_events(table.release().unwrap());
        assert_eq!(table.state(), TableState::Free);
        assert!(table.check_consistency().is_ok());
    }

    #[test]
    fn release_with_open_bill_fails() {
        let (table, _) = occupied(4500);
        assert!(matches!(
            table.release(),
            Err(TableError::ReleaseWithOpenBill { .. })
        ));
    }

    #[test]
    fn void_bill_allows_release() {
        let (mut table, _) = occupied(4500);
        table.apply_events(table.void_bill().unwrap());
        table.apply_events(table.release().unwrap());
        assert_eq!(table.state(), TableState::Free);
        assert!(table.accumulated_total().is_zero());
    }

    #[test]
    fn join_group_only_from_free() {
        let mut table = registered();
        let group_id = AggregateId::new();
        table.apply_events(table.join_group(group_id).unwrap());
        assert_eq!(table.state(), TableState::Grouped);
        assert_eq!(table.group_id(), Some(group_id));
        assert!(table.join_group(AggregateId::new()).is_err());

        table.apply_events(table.release().unwrap());
        assert_eq!(table.state(), TableState::Free);
        assert!(table.group_id().is_none());

        let (occupied, _) = occupied(100);
        assert!(occupied.join_group(group_id).is_err());
    }

    #[test]
    fn free_table_with_total_is_a_violation() {
        let mut table = registered();
        // Replayed history from a defective writer
        table.apply(TableEvent::total_updated(
            AggregateId::new(),
            Money::from_cents(1500),
        ));

        assert_eq!(
            table.consistency_issues(),
            vec![ConsistencyIssue::FreeWithTotal {
                total: Money::from_cents(1500)
            }]
        );
        assert!(matches!(
            table.check_consistency(),
            Err(TableError::ConsistencyViolation { .. })
        ));
    }

    #[test]
    fn grouped_without_group_is_a_violation() {
        let mut table = registered();
        table.apply(TableEvent::availability_changed(
            TableState::Free,
            TableState::Grouped,
        ));
        assert_eq!(
            table.consistency_issues(),
            vec![ConsistencyIssue::OrphanedMembership { group_id: None }]
        );
    }

    #[test]
    fn snapshot_round_trip_keeps_state() {
        let (table, order_id) = occupied(4500);
        let json = serde_json::to_value(&table).unwrap();
        let restored: Table = serde_json::from_value(json).unwrap();
        assert_eq!(restored.active_order_id(), Some(order_id));
        assert_eq!(restored.accumulated_total(), Money::from_cents(4500));
        assert_eq!(restored.state(), TableState::Occupied);
    }
}
