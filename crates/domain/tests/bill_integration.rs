//! Integration tests for bills spanning table, order, group and deferred
//! payment streams.
//!
//! These tests drive the aggregates through the repository so every step is
//! persisted, reloaded and checked against the store.

use chrono::{Duration, Utc};
use common::{AggregateId, TableNumber, TenantScope};
use domain::{
    Aggregate, BillOutcome, BillRef, DeferredPayment, DeferredState, DomainError, Money,
    NewLineItem, Order, OrderState, Repository, Table, TableGroup, TableState, UnitOfWork,
};
use event_store::{EventStore, InMemoryEventStore, Version};

fn scope() -> TenantScope {
    TenantScope::new(1, 1)
}

fn item_a(quantity: u32) -> NewLineItem {
    NewLineItem::new("A", "Item-A", quantity, Money::from_cents(1500))
}

async fn register_table(repo: &Repository<InMemoryEventStore>, number: u32) -> AggregateId {
    let table_id = AggregateId::for_table(&scope(), TableNumber(number));
    let mut table = Table::default();
    let mut uow = UnitOfWork::new();
    let events = table
        .register(table_id, scope(), TableNumber(number), 4)
        .unwrap();
    uow.record(&mut table, events).unwrap();
    repo.commit(uow).await.unwrap();
    table_id
}

/// Opens a bill on a free table with a first submission, in one commit.
async fn open_bill(
    repo: &Repository<InMemoryEventStore>,
    table_id: AggregateId,
    items: Vec<NewLineItem>,
) -> AggregateId {
    let mut table: Table = repo.get(table_id).await.unwrap();
    let mut order = Order::default();
    let order_id = AggregateId::new();

    let mut uow = UnitOfWork::new();
    let events = order
        .open(order_id, BillRef::Table(table_id), scope(), "ana")
        .unwrap();
    uow.record(&mut order, events).unwrap();
    let events = order.append_items(items, None).unwrap();
    uow.record(&mut order, events).unwrap();
    let events = table.occupy(order_id, "ana").unwrap();
    uow.record(&mut table, events).unwrap();
    let events = table.update_total(order_id, order.total()).unwrap();
    uow.record(&mut table, events).unwrap();
    repo.commit(uow).await.unwrap();

    order_id
}

async fn append(
    repo: &Repository<InMemoryEventStore>,
    table_id: AggregateId,
    order_id: AggregateId,
    items: Vec<NewLineItem>,
) {
    let mut table: Table = repo.get(table_id).await.unwrap();
    let mut order: Order = repo.get(order_id).await.unwrap();

    let mut uow = UnitOfWork::new();
    let events = order.append_items(items, None).unwrap();
    uow.record(&mut order, events).unwrap();
    let events = table.update_total(order_id, order.total()).unwrap();
    uow.record(&mut table, events).unwrap();
    repo.commit(uow).await.unwrap();
}

mod table_bill {
    use super::*;

    #[tokio::test]
    async fn first_submission_occupies_table() {
        let repo = Repository::new(InMemoryEventStore::new());
        let table_id = register_table(&repo, 5).await;

        let order_id = open_bill(&repo, table_id, vec![item_a(2)]).await;

        let table: Table = repo.get(table_id).await.unwrap();
        assert_eq!(table.state(), TableState::Occupied);
        assert_eq!(table.active_order_id(), Some(order_id));
        assert_eq!(table.accumulated_total(), Money::from_cents(3000));
        assert_eq!(table.version(), Version::new(3));
    }

    #[tokio::test]
    async fn second_submission_merges_into_same_order() {
        let repo = Repository::new(InMemoryEventStore::new());
        let table_id = register_table(&repo, 5).await;
        let order_id = open_bill(&repo, table_id, vec![item_a(2)]).await;

        append(&repo, table_id, order_id, vec![item_a(1)]).await;

        let order: Order = repo.get(order_id).await.unwrap();
        let table: Table = repo.get(table_id).await.unwrap();
        assert_eq!(order.lines().len(), 2);
        assert_eq!(order.total(), Money::from_cents(4500));
        assert_eq!(table.accumulated_total(), order.total());
        assert_eq!(table.active_order_id(), Some(order_id));
    }

    #[tokio::test]
    async fn pay_then_release_leaves_table_clean() {
        let repo = Repository::new(InMemoryEventStore::new());
        let table_id = register_table(&repo, 5).await;
        let order_id = open_bill(&repo, table_id, vec![item_a(3)]).await;

        let mut table: Table = repo.get(table_id).await.unwrap();
        let mut order: Order = repo.get(order_id).await.unwrap();
        let mut uow = UnitOfWork::new();
        let events = order.pay().unwrap();
        uow.record(&mut order, events).unwrap();
        let events = table.settle().unwrap();
        uow.record(&mut table, events).unwrap();
        let events = table.release().unwrap();
        uow.record(&mut table, events).unwrap();
        repo.commit(uow).await.unwrap();

        let table: Table = repo.get(table_id).await.unwrap();
        let order: Order = repo.get(order_id).await.unwrap();
        assert_eq!(table.state(), TableState::Free);
        assert!(table.accumulated_total().is_zero());
        assert!(table.active_order_id().is_none());
        assert!(table.check_consistency().is_ok());
        assert_eq!(order.state(), OrderState::Paid);
    }

    #[tokio::test]
    async fn stale_table_rolls_back_order_append() {
        let repo = Repository::new(InMemoryEventStore::new());
        let table_id = register_table(&repo, 5).await;
        let order_id = open_bill(&repo, table_id, vec![item_a(2)]).await;

        // Loaded before a concurrent writer moves the table on
        let mut stale_table: Table = repo.get(table_id).await.unwrap();
        let mut order: Order = repo.get(order_id).await.unwrap();
        append(&repo, table_id, order_id, vec![item_a(1)]).await;

        let mut uow = UnitOfWork::new();
        let events = order.append_items(vec![item_a(5)], None).unwrap();
        uow.record(&mut order, events).unwrap();
        let events = stale_table.update_total(order_id, order.total()).unwrap();
        uow.record(&mut stale_table, events).unwrap();

        let err = repo.commit(uow).await.unwrap_err();
        assert!(err.is_conflict());

        let order: Order = repo.get(order_id).await.unwrap();
        assert_eq!(order.total(), Money::from_cents(4500));
    }

    #[tokio::test]
    async fn table_snapshots_every_fifty_events() {
        let store = InMemoryEventStore::new();
        let repo = Repository::new(store.clone());
        let table_id = register_table(&repo, 9).await;

        let mut table: Table = repo.get(table_id).await.unwrap();
        let mut uow = UnitOfWork::new();
        for i in 0..49 {
            let to = if i % 2 == 0 {
                TableState::Reserved
            } else {
                TableState::Free
            };
            let events = table.set_availability(to).unwrap();
            uow.record_snapshotting(&mut table, events).unwrap();
        }
        repo.commit(uow).await.unwrap();

        let snapshot = store.get_snapshot(table_id).await.unwrap().unwrap();
        assert_eq!(snapshot.version, Version::new(50));

        let loaded: Table = repo.get(table_id).await.unwrap();
        assert_eq!(loaded.state(), TableState::Reserved);
        assert_eq!(loaded.version(), Version::new(50));
    }
}

mod group_bill {
    use super::*;

    #[tokio::test]
    async fn group_bill_and_close_release_members() {
        let repo = Repository::new(InMemoryEventStore::new());
        let t1 = register_table(&repo, 1).await;
        let t2 = register_table(&repo, 2).await;
        let group_id = AggregateId::new();

        let mut group = TableGroup::default();
        let mut table1: Table = repo.get(t1).await.unwrap();
        let mut table2: Table = repo.get(t2).await.unwrap();
        let mut uow = UnitOfWork::new();
        let events = group.open(group_id, scope(), "luis", vec![t2, t1]).unwrap();
        uow.record(&mut group, events).unwrap();
        let events = table1.join_group(group_id).unwrap();
        uow.record(&mut table1, events).unwrap();
        let events = table2.join_group(group_id).unwrap();
        uow.record(&mut table2, events).unwrap();
        repo.commit(uow).await.unwrap();

        let mut group: TableGroup = repo.get(group_id).await.unwrap();
        let mut order = Order::default();
        let order_id = AggregateId::new();
        let mut uow = UnitOfWork::new();
        let events = order
            .open(order_id, BillRef::Group(group_id), scope(), "luis")
            .unwrap();
        uow.record(&mut order, events).unwrap();
        let events = order.append_items(vec![item_a(4)], None).unwrap();
        uow.record(&mut order, events).unwrap();
        let events = group.start_bill(order_id).unwrap();
        uow.record(&mut group, events).unwrap();
        let events = group.update_total(order_id, order.total()).unwrap();
        uow.record(&mut group, events).unwrap();
        let events = order.pay().unwrap();
        uow.record(&mut order, events).unwrap();
        let events = group.close_bill(BillOutcome::Paid).unwrap();
        uow.record(&mut group, events).unwrap();
        repo.commit(uow).await.unwrap();

        let mut group: TableGroup = repo.get(group_id).await.unwrap();
        let mut uow = UnitOfWork::new();
        let events = group.close().unwrap();
        uow.record(&mut group, events).unwrap();
        for table_id in [t1, t2] {
            let mut table: Table = repo.get(table_id).await.unwrap();
            let events = table.release().unwrap();
            uow.record(&mut table, events).unwrap();
        }
        repo.commit(uow).await.unwrap();

        for table_id in [t1, t2] {
            let table: Table = repo.get(table_id).await.unwrap();
            assert_eq!(table.state(), TableState::Free);
            assert!(table.group_id().is_none());
        }
        let group: TableGroup = repo.get(group_id).await.unwrap();
        assert!(!group.is_open());
    }
}

mod deferred_bill {
    use super::*;

    #[tokio::test]
    async fn deferred_record_follows_appends_and_resolves() {
        let repo = Repository::new(InMemoryEventStore::new());
        let table_id = register_table(&repo, 5).await;
        let order_id = open_bill(&repo, table_id, vec![item_a(3)]).await;

        let record_id = AggregateId::new();
        let mut table: Table = repo.get(table_id).await.unwrap();
        let mut order: Order = repo.get(order_id).await.unwrap();
        let mut record = DeferredPayment::default();
        let mut uow = UnitOfWork::new();
        let events = record
            .open(
                record_id,
                order_id,
                BillRef::Table(table_id),
                order.total(),
                Utc::now() + Duration::hours(24),
            )
            .unwrap();
        uow.record(&mut record, events).unwrap();
        let events = order.defer(record_id).unwrap();
        uow.record(&mut order, events).unwrap();
        let events = table.request_collection().unwrap();
        uow.record(&mut table, events).unwrap();
        repo.commit(uow).await.unwrap();

        let mut order: Order = repo.get(order_id).await.unwrap();
        let mut record: DeferredPayment = repo.get(record_id).await.unwrap();
        let mut table: Table = repo.get(table_id).await.unwrap();
        let mut uow = UnitOfWork::new();
        let events = order.append_items(vec![item_a(1)], None).unwrap();
        uow.record(&mut order, events).unwrap();
        let events = record.adjust(order.total()).unwrap();
        uow.record(&mut record, events).unwrap();
        let events = table.update_total(order_id, order.total()).unwrap();
        uow.record(&mut table, events).unwrap();
        repo.commit(uow).await.unwrap();

        let record: DeferredPayment = repo.get(record_id).await.unwrap();
        assert_eq!(record.pending_amount(), Money::from_cents(6000));
        assert_eq!(record.state(), DeferredState::Pending);

        let order: Order = repo.get(order_id).await.unwrap();
        assert_eq!(order.state(), OrderState::PendingPayment);
    }

    #[tokio::test]
    async fn missing_record_is_not_found() {
        let repo = Repository::new(InMemoryEventStore::new());
        let result = repo.get::<DeferredPayment>(AggregateId::new()).await;
        assert!(matches!(
            result,
            Err(DomainError::AggregateNotFound {
                aggregate_type: "DeferredPayment",
                ..
            })
        ));
    }
}
