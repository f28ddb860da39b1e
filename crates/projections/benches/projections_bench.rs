use common::{AggregateId, TableNumber, TenantScope};
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{BillRef, DomainEvent, Money, NewLineItem, Order, OrderEvent, TableEvent};
use event_store::{AppendOptions, EventEnvelope, EventStoreExt, InMemoryEventStore, Version};
use projections::{KitchenFeedView, Projection, ProjectionProcessor, TableFloorView};

use std::sync::Arc;

fn make_envelope<E: DomainEvent>(
    aggregate_id: AggregateId,
    aggregate_type: &str,
    version: i64,
    event: &E,
) -> EventEnvelope {
    EventEnvelope::new(
        aggregate_id,
        aggregate_type,
        Version::new(version),
        event.event_type(),
        event,
    )
    .unwrap()
}

/// Populates a store with N tables, each with an open order of one submission.
async fn populate_store(store: &InMemoryEventStore, n: u32) {
    let scope = TenantScope::new(1, 1);
    for number in 1..=n {
        let table_id = AggregateId::for_table(&scope, TableNumber(number));
        let order_id = AggregateId::new();

        let registered = TableEvent::table_registered(table_id, scope, TableNumber(number), 4);
        let occupied = TableEvent::table_occupied(order_id, "bench");
        let total = TableEvent::total_updated(order_id, Money::from_cents(2000));
        store
            .append(
                vec![
                    make_envelope(table_id, "Table", 1, &registered),
                    make_envelope(table_id, "Table", 2, &occupied),
                    make_envelope(table_id, "Table", 3, &total),
                ],
                AppendOptions::new(),
            )
            .await
            .unwrap();

        let opened = OrderEvent::order_opened(order_id, BillRef::Table(table_id), scope, "bench");
        let mut order = Order::default();
        domain::Aggregate::apply(&mut order, opened.clone());
        let appended = order
            .append_items(
                vec![NewLineItem::new("A", "Item-A", 2, Money::from_cents(1000))],
                None,
            )
            .unwrap()
            .remove(0);
        store
            .append(
                vec![
                    make_envelope(order_id, "Order", 1, &opened),
                    make_envelope(order_id, "Order", 2, &appended),
                ],
                AppendOptions::new(),
            )
            .await
            .unwrap();
    }
}

fn bench_catch_up_100_tables(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();
    rt.block_on(populate_store(&store, 100));

    c.bench_function("projections/catch_up_100_tables", |b| {
        b.iter(|| {
            rt.block_on(async {
                let floor = TableFloorView::new();
                let kitchen = KitchenFeedView::new();
                let mut processor = ProjectionProcessor::new(store.clone());
                processor.register(Box::new(floor.clone()));
                processor.register(Box::new(kitchen.clone()));
                processor.run_catch_up().await.unwrap();
            });
        });
    });
}

fn bench_incremental_catch_up(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();
    rt.block_on(populate_store(&store, 100));

    let floor = TableFloorView::new();
    let mut processor = ProjectionProcessor::new(store);
    processor.register(Box::new(floor.clone()));
    let processor = Arc::new(processor);
    rt.block_on(processor.run_catch_up()).unwrap();

    c.bench_function("projections/catch_up_nothing_new", |b| {
        b.iter(|| rt.block_on(processor.run_catch_up()).unwrap());
    });
}

fn bench_floor_stats(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();
    rt.block_on(populate_store(&store, 200));

    let floor = TableFloorView::new();
    let mut processor = ProjectionProcessor::new(store);
    processor.register(Box::new(floor.clone()));
    rt.block_on(processor.run_catch_up()).unwrap();
    assert!(rt.block_on(floor.position()).events_processed > 0);

    c.bench_function("projections/floor_stats_200_tables", |b| {
        b.iter(|| rt.block_on(floor.stats(TenantScope::new(1, 1))));
    });
}

criterion_group!(
    benches,
    bench_catch_up_100_tables,
    bench_incremental_catch_up,
    bench_floor_stats,
);
criterion_main!(benches);
