//! Kitchen Feed: open orders the kitchen still has to prepare.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AggregateId, TableNumber};
use domain::{BillRef, GroupEvent, LineItem, Money, OrderEvent, OrderState, TableEvent};
use event_store::EventEnvelope;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::Result;
use crate::projection::{Projection, ProjectionPosition, decode};
use crate::read_model::ReadModel;

/// An order as shown on the kitchen display.
#[derive(Debug, Clone, Serialize)]
pub struct KitchenOrder {
    pub order_id: AggregateId,
    pub target: BillRef,
    /// Physical tables the order is served to.
    pub table_numbers: Vec<TableNumber>,
    pub server: String,
    pub state: OrderState,
    pub lines: Vec<LineItem>,
    pub total: Money,
    pub opened_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Default)]
struct KitchenFeedState {
    /// Every open order, whatever its kitchen progress.
    orders: HashMap<AggregateId, KitchenOrder>,
    table_numbers: HashMap<AggregateId, TableNumber>,
    group_tables: HashMap<AggregateId, Vec<AggregateId>>,
    position: ProjectionPosition,
}

impl KitchenFeedState {
    fn numbers_for(&self, target: BillRef) -> Vec<TableNumber> {
        let tables = match target {
            BillRef::Table(id) => vec![id],
            BillRef::Group(id) => self.group_tables.get(&id).cloned().unwrap_or_default(),
        };
        let mut numbers: Vec<TableNumber> = tables
            .iter()
            .filter_map(|id| self.table_numbers.get(id).copied())
            .collect();
        numbers.sort();
        numbers
    }

    fn apply_order(&mut self, order_id: AggregateId, event: OrderEvent, at: DateTime<Utc>) {
        match event {
            OrderEvent::OrderOpened(data) => {
                let table_numbers = self.numbers_for(data.target);
                self.orders.insert(
                    order_id,
                    KitchenOrder {
                        order_id,
                        target: data.target,
                        table_numbers,
                        server: data.server,
                        state: OrderState::Received,
                        lines: Vec::new(),
                        total: Money::zero(),
                        opened_at: data.opened_at,
                        updated_at: data.opened_at,
                    },
                );
            }
            OrderEvent::ItemsAppended(data) => {
                if let Some(order) = self.orders.get_mut(&order_id) {
                    order.lines.extend(data.lines);
                    order.total = data.total;
                    order.updated_at = data.appended_at;
                }
            }
            OrderEvent::StatusAdvanced(data) => {
                if let Some(order) = self.orders.get_mut(&order_id) {
                    order.state = data.to;
                    order.updated_at = data.changed_at;
                }
            }
            OrderEvent::PaymentDeferred(_) => {
                if let Some(order) = self.orders.get_mut(&order_id) {
                    order.state = OrderState::PendingPayment;
                    order.updated_at = at;
                }
            }
            OrderEvent::OrderPaid(_) | OrderEvent::OrderCancelled(_) => {
                self.orders.remove(&order_id);
            }
        }
    }
}

/// Pull-based view of orders in RECEIVED or IN_PREPARATION, optionally READY.
#[derive(Clone, Default)]
pub struct KitchenFeedView {
    state: Arc<RwLock<KitchenFeedState>>,
}

impl KitchenFeedView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Orders awaiting the kitchen, oldest first.
    pub async fn orders(&self, include_ready: bool) -> Vec<KitchenOrder> {
        let state = self.state.read().await;
        let mut orders: Vec<KitchenOrder> = state
            .orders
            .values()
            .filter(|o| o.state.is_in_kitchen() || (include_ready && o.state == OrderState::Ready))
            .cloned()
            .collect();
        orders.sort_by_key(|o| (o.opened_at, o.order_id));
        orders
    }

    /// Any open order, including ones the kitchen has finished.
    pub async fn get_order(&self, order_id: AggregateId) -> Option<KitchenOrder> {
        self.state.read().await.orders.get(&order_id).cloned()
    }
}

#[async_trait]
impl Projection for KitchenFeedView {
    fn name(&self) -> &'static str {
        "KitchenFeedView"
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        let mut state = self.state.write().await;

        match event.aggregate_type.as_str() {
            "Order" => {
                let order_event: OrderEvent = decode(event)?;
                state.apply_order(event.aggregate_id, order_event, event.timestamp);
            }
            "Table" => {
                if let TableEvent::TableRegistered(data) = decode(event)? {
                    state.table_numbers.insert(data.table_id, data.number);
                }
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
        *self.state.write().await = KitchenFeedState::default();
        Ok(())
    }
}

impl ReadModel for KitchenFeedView {
    fn name(&self) -> &'static str {
        "KitchenFeedView"
    }

    fn count(&self) -> usize {
        self.state.try_read().map(|s| s.orders.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::TenantScope;
    use domain::{Aggregate, DomainEvent, NewLineItem, Order};
    use event_store::Version;

    fn envelope<E: DomainEvent>(
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

    async fn feed_order(view: &KitchenFeedView, order_id: AggregateId, table_id: AggregateId) {
        let opened = OrderEvent::order_opened(
            order_id,
            BillRef::Table(table_id),
            TenantScope::new(1, 1),
            "ana",
        );
        view.handle(&envelope(order_id, "Order", 1, &opened))
            .await
            .unwrap();

        let mut order = Order::default();
        order.apply(opened);
        let appended = order
            .append_items(
                vec![NewLineItem::new("A", "Item-A", 2, Money::from_cents(1500))],
                None,
            )
            .unwrap()
            .remove(0);
        view.handle(&envelope(order_id, "Order", 2, &appended))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn new_order_appears_with_lines() {
        let view = KitchenFeedView::new();
        let order_id = AggregateId::new();
        let table_id = AggregateId::new();

        let registered = TableEvent::table_registered(
            table_id,
            TenantScope::new(1, 1),
            TableNumber(5),
            4,
        );
        view.handle(&envelope(table_id, "Table", 1, &registered))
            .await
            .unwrap();
        feed_order(&view, order_id, table_id).await;

        let orders = view.orders(false).await;
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].table_numbers, vec![TableNumber(5)]);
        assert_eq!(orders[0].lines.len(), 1);
        assert_eq!(orders[0].total, Money::from_cents(3000));
        assert_eq!(view.position().await.events_processed, 3);
    }

    #[tokio::test]
    async fn ready_orders_only_on_request() {
        let view = KitchenFeedView::new();
        let order_id = AggregateId::new();
        feed_order(&view, order_id, AggregateId::new()).await;

        let ready = OrderEvent::status_advanced(OrderState::Received, OrderState::Ready);
        view.handle(&envelope(order_id, "Order", 3, &ready))
            .await
            .unwrap();

        assert!(view.orders(false).await.is_empty());
        assert_eq!(view.orders(true).await.len(), 1);
        assert!(view.get_order(order_id).await.is_some());
    }

    #[tokio::test]
    async fn closed_orders_leave_the_feed() {
        let view = KitchenFeedView::new();
        let order_id = AggregateId::new();
        feed_order(&view, order_id, AggregateId::new()).await;

        let paid = OrderEvent::order_paid(Money::from_cents(3000));
        view.handle(&envelope(order_id, "Order", 3, &paid))
            .await
            .unwrap();

        assert!(view.orders(true).await.is_empty());
        assert!(view.get_order(order_id).await.is_none());
    }

    #[tokio::test]
    async fn reset_clears_everything() {
        let view = KitchenFeedView::new();
        feed_order(&view, AggregateId::new(), AggregateId::new()).await;

        view.reset().await.unwrap();
        assert_eq!(view.count(), 0);
        assert_eq!(view.position().await, ProjectionPosition::zero());
    }
}
