//! Bill history read model: paid and cancelled bills per table.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::{BillOutcome, BillRef, GroupEvent, LineItem, Money, OrderEvent};
use event_store::EventEnvelope;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::Result;
use crate::projection::{Projection, ProjectionPosition, decode};
use crate::read_model::ReadModel;

/// A bill that reached PAID or CANCELLED.
#[derive(Debug, Clone, Serialize)]
pub struct ClosedBill {
    pub order_id: AggregateId,
    pub target: BillRef,
    /// Tables the bill covered (one, or every member of the group).
    pub tables: Vec<AggregateId>,
    pub server: String,
    pub outcome: BillOutcome,
    pub amount: Money,
    pub lines: Vec<LineItem>,
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
    pub cancel_reason: Option<String>,
}

/// Close-time window; both bounds inclusive.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct HistoryFilter {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl HistoryFilter {
    fn accepts(&self, closed_at: DateTime<Utc>) -> bool {
        self.from.is_none_or(|from| closed_at >= from) && self.to.is_none_or(|to| closed_at <= to)
    }
}

/// An order still running, kept until it closes.
#[derive(Debug, Clone)]
struct StagingBill {
    target: BillRef,
    server: String,
    lines: Vec<LineItem>,
    total: Money,
    opened_at: DateTime<Utc>,
}

#[derive(Default)]
struct BillHistoryState {
    staging: HashMap<AggregateId, StagingBill>,
    history: HashMap<AggregateId, ClosedBill>,
    group_tables: HashMap<AggregateId, Vec<AggregateId>>,
    position: ProjectionPosition,
}

impl BillHistoryState {
    fn close(
        &mut self,
        order_id: AggregateId,
        outcome: BillOutcome,
        amount: Option<Money>,
        closed_at: DateTime<Utc>,
        cancel_reason: Option<String>,
    ) {
        let Some(bill) = self.staging.remove(&order_id) else {
            return;
        };
        let tables = match bill.target {
            BillRef::Table(id) => vec![id],
            BillRef::Group(id) => self.group_tables.get(&id).cloned().unwrap_or_default(),
        };
        self.history.insert(
            order_id,
            ClosedBill {
                order_id,
                target: bill.target,
                tables,
                server: bill.server,
                outcome,
                amount: amount.unwrap_or(bill.total),
                lines: bill.lines,
                opened_at: bill.opened_at,
                closed_at,
                cancel_reason,
            },
        );
    }

    fn apply_order(&mut self, order_id: AggregateId, event: OrderEvent) {
        match event {
            OrderEvent::OrderOpened(data) => {
                self.staging.insert(
                    order_id,
                    StagingBill {
                        target: data.target,
                        server: data.server,
                        lines: Vec::new(),
                        total: Money::zero(),
                        opened_at: data.opened_at,
                    },
                );
            }
            OrderEvent::ItemsAppended(data) => {
                if let Some(bill) = self.staging.get_mut(&order_id) {
                    bill.lines.extend(data.lines);
                    bill.total = data.total;
                }
            }
            OrderEvent::OrderPaid(data) => {
                self.close(order_id, BillOutcome::Paid, Some(data.amount), data.paid_at, None);
            }
            OrderEvent::OrderCancelled(data) => {
                self.close(
                    order_id,
                    BillOutcome::Cancelled,
                    None,
                    data.cancelled_at,
                    Some(data.reason),
                );
            }
            OrderEvent::StatusAdvanced(_) | OrderEvent::PaymentDeferred(_) => {}
        }
    }
}

/// Closed bills, queryable per table with an optional date window.
#[derive(Clone, Default)]
pub struct BillHistoryView {
    state: Arc<RwLock<BillHistoryState>>,
}

impl BillHistoryView {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_bill(&self, order_id: AggregateId) -> Option<ClosedBill> {
        self.state.read().await.history.get(&order_id).cloned()
    }

    /// Bills that covered `table_id`, directly or through a group, newest first.
    pub async fn for_table(&self, table_id: AggregateId, filter: HistoryFilter) -> Vec<ClosedBill> {
        self.select(|bill| bill.tables.contains(&table_id), filter)
            .await
    }

    /// Every closed bill in the window, newest first.
    pub async fn all(&self, filter: HistoryFilter) -> Vec<ClosedBill> {
        self.select(|_| true, filter).await
    }

    /// Number of paid bills in the window and the sum of their amounts.
    pub async fn revenue(&self, filter: HistoryFilter) -> (usize, Money) {
        let paid = self
            .select(|bill| bill.outcome == BillOutcome::Paid, filter)
            .await;
        let total: Money = paid.iter().map(|bill| bill.amount).sum();
        (paid.len(), total)
    }

    async fn select(
        &self,
        predicate: impl Fn(&ClosedBill) -> bool,
        filter: HistoryFilter,
    ) -> Vec<ClosedBill> {
        let state = self.state.read().await;
        let mut bills: Vec<ClosedBill> = state
            .history
            .values()
            .filter(|bill| predicate(bill) && filter.accepts(bill.closed_at))
            .cloned()
            .collect();
        bills.sort_by(|a, b| b.closed_at.cmp(&a.closed_at));
        bills
    }
}

#[async_trait]
impl Projection for BillHistoryView {
    fn name(&self) -> &'static str {
        "BillHistoryView"
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        let mut state = self.state.write().await;

        match event.aggregate_type.as_str() {
            "Order" => {
                let order_event: OrderEvent = decode(event)?;
                state.apply_order(event.aggregate_id, order_event);
            }
            "TableGroup" => {
                if let GroupEvent::GroupOpened(data) = decode(event)? {
                    state.group_tables.insert(data.group_id, data.tables);
                }
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
        *self.state.write().await = BillHistoryState::default();
        Ok(())
    }
}

impl ReadModel for BillHistoryView {
    fn name(&self) -> &'static str {
        "BillHistoryView"
    }

    fn count(&self) -> usize {
        self.state.try_read().map(|s| s.history.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use common::TenantScope;
    use domain::{Aggregate, DomainEvent, NewLineItem, Order};
    use event_store::Version;

    fn envelope<E: DomainEvent>(aggregate_id: AggregateId, kind: &str, event: &E) -> EventEnvelope {
        EventEnvelope::new(aggregate_id, kind, Version::first(), event.event_type(), event).unwrap()
    }

    async fn run_bill(view: &BillHistoryView, target: BillRef, close: OrderEvent) -> AggregateId {
        let order_id = AggregateId::new();
        let mut order = Order::default();
        let mut events = order
            .open(order_id, target, TenantScope::new(1, 1), "ana")
            .unwrap();
        order.apply_events(events.clone());
        let appended = order
            .append_items(
                vec![NewLineItem::new("A", "Item-A", 3, Money::from_cents(1500))],
                None,
            )
            .unwrap();
        events.extend(appended);
        events.push(close);

        for event in &events {
            view.handle(&envelope(order_id, "Order", event))
                .await
                .unwrap();
        }
        order_id
    }

    #[tokio::test]
    async fn paid_bill_is_recorded_for_its_table() {
        let view = BillHistoryView::new();
        let table_id = AggregateId::new();
        let order_id = run_bill(
            &view,
            BillRef::Table(table_id),
            OrderEvent::order_paid(Money::from_cents(4500)),
        )
        .await;

        let bills = view.for_table(table_id, HistoryFilter::default()).await;
        assert_eq!(bills.len(), 1);
        assert_eq!(bills[0].order_id, order_id);
        assert_eq!(bills[0].outcome, BillOutcome::Paid);
        assert_eq!(bills[0].amount, Money::from_cents(4500));
        assert_eq!(bills[0].lines.len(), 1);
        assert!(view.for_table(AggregateId::new(), HistoryFilter::default()).await.is_empty());
    }

    #[tokio::test]
    async fn group_bill_is_listed_for_every_member() {
        let view = BillHistoryView::new();
        let (t1, t2, group_id) = (AggregateId::new(), AggregateId::new(), AggregateId::new());
        let opened = GroupEvent::group_opened(group_id, TenantScope::new(1, 1), "luis", vec![t1, t2]);
        view.handle(&envelope(group_id, "TableGroup", &opened))
            .await
            .unwrap();

        run_bill(
            &view,
            BillRef::Group(group_id),
            OrderEvent::order_cancelled("walked out"),
        )
        .await;

        for table_id in [t1, t2] {
            let bills = view.for_table(table_id, HistoryFilter::default()).await;
            assert_eq!(bills.len(), 1);
            assert_eq!(bills[0].outcome, BillOutcome::Cancelled);
            assert_eq!(bills[0].cancel_reason.as_deref(), Some("walked out"));
        }
        assert_eq!(
            view.revenue(HistoryFilter::default()).await,
            (0, Money::zero())
        );
    }

    #[tokio::test]
    async fn date_filter_bounds_close_time() {
        let view = BillHistoryView::new();
        let table_id = AggregateId::new();
        run_bill(
            &view,
            BillRef::Table(table_id),
            OrderEvent::order_paid(Money::from_cents(4500)),
        )
        .await;

        let future = HistoryFilter {
            from: Some(Utc::now() + Duration::hours(1)),
            to: None,
        };
        assert!(view.for_table(table_id, future).await.is_empty());

        let past = HistoryFilter {
            from: Some(Utc::now() - Duration::hours(1)),
            to: Some(Utc::now() + Duration::hours(1)),
        };
        assert_eq!(view.for_table(table_id, past).await.len(), 1);
        assert_eq!(view.revenue(past).await, (1, Money::from_cents(4500)));
    }

    #[tokio::test]
    async fn open_bills_stay_out_of_history() {
        let view = BillHistoryView::new();
        let order_id = AggregateId::new();
        let opened = OrderEvent::order_opened(
            order_id,
            BillRef::Table(AggregateId::new()),
            TenantScope::new(1, 1),
            "ana",
        );
        view.handle(&envelope(order_id, "Order", &opened))
            .await
            .unwrap();

        assert_eq!(view.count(), 0);
        assert!(view.get_bill(order_id).await.is_none());
    }
}
