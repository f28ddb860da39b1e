//! Kitchen display / printer notifications.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::{BillRef, LineItem};
use serde::Serialize;

use super::CollaboratorError;

/// Stable identity of a ticket: one per order submission.
///
/// Redelivering the same submission produces the same id, so a receiver can
/// drop duplicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TicketId {
    pub order_id: AggregateId,
    pub batch: u32,
}

impl std::fmt::Display for TicketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.order_id, self.batch)
    }
}

/// Items the kitchen must prepare for one submission.
#[derive(Debug, Clone, Serialize)]
pub struct KitchenTicket {
    pub ticket_id: TicketId,
    pub order_id: AggregateId,
    pub target: BillRef,
    pub server: String,
    /// True when the submission opened the order.
    pub new_order: bool,
    pub lines: Vec<LineItem>,
    pub issued_at: DateTime<Utc>,
}

/// Receives a ticket whenever an order is created or appended to.
///
/// Delivery is at-least-once.
#[async_trait]
pub trait KitchenNotifier: Send + Sync {
    async fn notify(&self, ticket: KitchenTicket) -> Result<(), CollaboratorError>;
}

/// Writes each ticket to the `kitchen` log target and keeps nothing.
///
/// Kitchen displays read open orders from the Kitchen Feed, so the server
/// binary only needs a record that a ticket went out.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingKitchenNotifier;

#[async_trait]
impl KitchenNotifier for LoggingKitchenNotifier {
    async fn notify(&self, ticket: KitchenTicket) -> Result<(), CollaboratorError> {
        metrics::counter!("kitchen_tickets_total").increment(1);
        tracing::info!(
            target: "kitchen",
            ticket = %ticket.ticket_id,
            bill = %ticket.target,
            server = %ticket.server,
            new_order = ticket.new_order,
            lines = ticket.lines.len(),
            "kitchen ticket issued"
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
struct InMemoryKitchenState {
    tickets: HashMap<TicketId, KitchenTicket>,
    deliveries: usize,
    failures_left: u32,
}

/// Keeps tickets in memory, ignoring redeliveries.
#[derive(Debug, Clone, Default)]
pub struct InMemoryKitchenNotifier {
    state: Arc<RwLock<InMemoryKitchenState>>,
}

impl InMemoryKitchenNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the next `count` deliveries.
    pub fn fail_next(&self, count: u32) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .failures_left = count;
    }

    /// Distinct tickets received.
    pub fn ticket_count(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .tickets
            .len()
    }

    /// Successful deliveries, duplicates included.
    pub fn delivery_count(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .deliveries
    }

    pub fn ticket(&self, ticket_id: TicketId) -> Option<KitchenTicket> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .tickets
            .get(&ticket_id)
            .cloned()
    }

    /// Tickets of one order in submission order.
    pub fn tickets_for(&self, order_id: AggregateId) -> Vec<KitchenTicket> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let mut tickets: Vec<KitchenTicket> = state
            .tickets
            .values()
            .filter(|t| t.order_id == order_id)
            .cloned()
            .collect();
        tickets.sort_by_key(|t| t.ticket_id.batch);
        tickets
    }
}

#[async_trait]
impl KitchenNotifier for InMemoryKitchenNotifier {
    async fn notify(&self, ticket: KitchenTicket) -> Result<(), CollaboratorError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        if state.failures_left > 0 {
            state.failures_left -= 1;
            return Err(CollaboratorError::Unavailable(
                "kitchen printer offline".to_string(),
            ));
        }

        state.deliveries += 1;
        state.tickets.entry(ticket.ticket_id).or_insert(ticket);
        Ok(())
    }
}
