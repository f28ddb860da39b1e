use common::{AggregateId, TableNumber, TenantScope};
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{
    Aggregate, BillRef, DomainEvent, Money, NewLineItem, Order, OrderEvent, Repository, Table,
    UnitOfWork,
};
use event_store::{AppendOptions, EventEnvelope, EventStoreExt, InMemoryEventStore, Version};

fn make_envelope(aggregate_id: AggregateId, version: i64, event: &OrderEvent) -> EventEnvelope {
    EventEnvelope::new(
        aggregate_id,
        "Order",
        Version::new(version),
        event.event_type(),
        event,
    )
    .unwrap()
}

fn item(n: i64) -> NewLineItem {
    NewLineItem::new(
        format!("P-{n:03}"),
        format!("Product {n}"),
        1,
        Money::from_cents(100 * n),
    )
}

/// Opens an order and appends `batches` single-line submissions to it.
fn order_history(order_id: AggregateId, batches: i64) -> Vec<EventEnvelope> {
    let mut order = Order::default();
    let opened = order
        .open(
            order_id,
            BillRef::Table(AggregateId::new()),
            TenantScope::new(1, 1),
            "bench",
        )
        .unwrap();
    let mut envelopes = vec![make_envelope(order_id, 1, &opened[0])];
    order.apply_events(opened);

    for v in 2..=batches + 1 {
        let events = order.append_items(vec![item(v)], None).unwrap();
        envelopes.push(make_envelope(order_id, v, &events[0]));
        order.apply_events(events);
    }
    envelopes
}

fn bench_append_recompute(c: &mut Criterion) {
    let mut order = Order::default();
    order.apply_events(
        order
            .open(
                AggregateId::new(),
                BillRef::Table(AggregateId::new()),
                TenantScope::new(1, 1),
                "bench",
            )
            .unwrap(),
    );
    for n in 1..=50 {
        order.apply_events(order.append_items(vec![item(n)], None).unwrap());
    }

    c.bench_function("domain/append_to_50_line_order", |b| {
        b.iter(|| order.append_items(vec![item(51), item(52)], None).unwrap());
    });
}

fn bench_occupy_commit(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("domain/open_bill_commit", |b| {
        b.iter(|| {
            rt.block_on(async {
                let repo = Repository::new(InMemoryEventStore::new());
                let scope = TenantScope::new(1, 1);
                let table_id = AggregateId::for_table(&scope, TableNumber(5));
                let order_id = AggregateId::new();

                let mut table = Table::default();
                let mut order = Order::default();
                let mut uow = UnitOfWork::new();
                let events = table.register(table_id, scope, TableNumber(5), 4).unwrap();
                uow.record(&mut table, events).unwrap();
                let events = order
                    .open(order_id, BillRef::Table(table_id), scope, "bench")
                    .unwrap();
                uow.record(&mut order, events).unwrap();
                let events = order.append_items(vec![item(1)], None).unwrap();
                uow.record(&mut order, events).unwrap();
                let events = table.occupy(order_id, "bench").unwrap();
                uow.record(&mut table, events).unwrap();
                let events = table.update_total(order_id, order.total()).unwrap();
                uow.record(&mut table, events).unwrap();
                repo.commit(uow).await.unwrap();
            });
        });
    });
}

fn bench_aggregate_reconstruction(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();
    let order_id = AggregateId::new();

    rt.block_on(async {
        store
            .append(order_history(order_id, 50), AppendOptions::new())
            .await
            .unwrap();
    });
    let repo = Repository::new(store);

    c.bench_function("domain/reconstruct_order_51_events", |b| {
        b.iter(|| {
            rt.block_on(async {
                let order: Order = repo.get(order_id).await.unwrap();
                assert_eq!(order.batches(), 50);
            });
        });
    });
}

criterion_group!(
    benches,
    bench_append_recompute,
    bench_occupy_commit,
    bench_aggregate_reconstruction,
);
criterion_main!(benches);
