//! Consolidation Engine: merges submissions into the one open bill of a
//! table or group.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use common::{AggregateId, TableNumber};
use domain::{
    Aggregate, BillRef, DeferredPayment, Order, OrderState, Table, UnitOfWork,
};
use event_store::EventStore;

use crate::collaborators::{KitchenNotifier, KitchenTicket, TicketId};
use crate::commands::{SettleBill, SubmitItems};
use crate::context::{Holder, ServiceContext};
use crate::error::{EngineError, Result};
use crate::views::{ClosedBill, HolderView, OrderView, Prebill, Submission};

/// Applies waiter submissions, kitchen progress, checkout and payment.
///
/// Every operation follows the same shape: lock the holder of the bill,
/// read it, decide, and commit all touched streams at once. A lost version
/// race re-runs the operation from the read.
pub struct ConsolidationEngine<S: EventStore> {
    ctx: Arc<ServiceContext<S>>,
    notifier: Arc<dyn KitchenNotifier>,
}

impl<S: EventStore> ConsolidationEngine<S> {
    pub(crate) fn new(ctx: Arc<ServiceContext<S>>, notifier: Arc<dyn KitchenNotifier>) -> Self {
        Self { ctx, notifier }
    }

    /// Adds items to the open bill of `cmd.target`, opening one if none exists.
    #[tracing::instrument(skip(self, cmd), fields(target = %cmd.target, items = cmd.items.len()))]
    pub async fn submit_items(&self, cmd: SubmitItems) -> Result<Submission> {
        let started = Instant::now();
        metrics::counter!("consolidation_submissions_total").increment(1);

        if cmd.items.is_empty() {
            return Err(EngineError::invalid("submission has no items"));
        }
        if cmd.server.trim().is_empty() {
            return Err(EngineError::invalid("server is required"));
        }

        let (submission, ticket) = self
            .ctx
            .retry("submit_items", || self.try_submit(&cmd))
            .await?;

        if let Some(ticket) = ticket {
            self.deliver(ticket).await;
        }

        metrics::histogram!("submit_items_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        Ok(submission)
    }

    async fn try_submit(&self, cmd: &SubmitItems) -> Result<(Submission, Option<KitchenTicket>)> {
        let (mut holder, _guard) = self.ctx.lock_holder(cmd.target).await?;
        if let Holder::Table(table) = &holder {
            table.ensure_accepts_orders()?;
        }

        let mut uow = UnitOfWork::new().with_metadata("server", cmd.server.as_str());
        if let Some(token) = &cmd.submission_token {
            uow = uow.with_metadata("submission_token", token.as_str());
        }
        let (mut order, created) = match self.ctx.open_order(&holder).await? {
            Some(order) => (order, false),
            None => (self.stage_new_order(&mut uow, &mut holder, &cmd.server)?, true),
        };
        let order_id = order.id().unwrap_or_default();

        let events = order.append_items(cmd.items.clone(), cmd.submission_token.clone())?;
        if events.is_empty() {
            metrics::counter!("submission_duplicates_total").increment(1);
            tracing::info!(%order_id, "submission token already applied");
            let submission = Submission {
                order: (&order).into(),
                new_total: order.total(),
                created: false,
                duplicate: true,
                holder: holder.view(),
            };
            return Ok((submission, None));
        }
        uow.record_snapshotting(&mut order, events)?;
        holder.stage_total(&mut uow, order_id, order.total())?;

        if order.state() == OrderState::PendingPayment
            && let Some(record_id) = order.deferred_record()
        {
            let mut record: DeferredPayment = self.ctx.repo.get(record_id).await?;
            if record.is_outstanding() {
                let events = record.adjust(order.total())?;
                uow.record_snapshotting(&mut record, events)?;
            }
        }

        self.ctx.repo.commit(uow).await?;

        if created {
            metrics::counter!("orders_opened_total").increment(1);
        } else {
            metrics::counter!("orders_merged_total").increment(1);
        }
        tracing::info!(
            %order_id,
            total_cents = order.total().cents(),
            created,
            batch = order.batches(),
            "items submitted"
        );

        let batch = order.batches();
        let ticket = KitchenTicket {
            ticket_id: TicketId { order_id, batch },
            order_id,
            target: holder.target(),
            server: order.server().to_string(),
            new_order: created,
            lines: order.batch_lines(batch).cloned().collect(),
            issued_at: Utc::now(),
        };
        let submission = Submission {
            order: (&order).into(),
            new_total: order.total(),
            created,
            duplicate: false,
            holder: holder.view(),
        };
        Ok((submission, Some(ticket)))
    }

    /// Opens an order for a holder with no running bill.
    ///
    /// A group's bill is always served by the group's assigned server.
    fn stage_new_order(
        &self,
        uow: &mut UnitOfWork,
        holder: &mut Holder,
        server: &str,
    ) -> Result<Order> {
        let scope = holder.scope().ok_or_else(|| {
            EngineError::violation(format!("{} has no tenant scope", holder.target()))
        })?;
        let server = match &*holder {
            Holder::Group(group) => group.server().to_string(),
            Holder::Table(_) => server.to_string(),
        };

        let order_id = AggregateId::new();
        let mut order = Order::default();
        let events = order.open(order_id, holder.target(), scope, &server)?;
        uow.record_snapshotting(&mut order, events)?;
        holder.stage_open(uow, order_id, &server)?;
        Ok(order)
    }

    /// Hands the ticket to the kitchen, retrying a bounded number of times.
    ///
    /// The commit already happened; a failed delivery is logged and the
    /// order remains visible through the kitchen feed.
    async fn deliver(&self, ticket: KitchenTicket) {
        let attempts = self.ctx.config.notify_attempts.max(1);
        for attempt in 1..=attempts {
            match self.notifier.notify(ticket.clone()).await {
                Ok(()) => return,
                Err(e) => tracing::warn!(
                    ticket_id = %ticket.ticket_id,
                    attempt,
                    error = %e,
                    "kitchen notification failed"
                ),
            }
        }
        metrics::counter!("kitchen_notifications_failed_total").increment(1);
    }

    /// Moves an order along the kitchen track.
    #[tracing::instrument(skip(self))]
    pub async fn advance_order(&self, order_id: AggregateId, to: OrderState) -> Result<OrderView> {
        self.ctx
            .retry("advance_order", || self.try_advance(order_id, to))
            .await
    }

    async fn try_advance(&self, order_id: AggregateId, to: OrderState) -> Result<OrderView> {
        let peeked: Order = self.ctx.repo.get(order_id).await?;
        let target = peeked
            .target()
            .ok_or_else(|| EngineError::violation(format!("order {order_id} has no target")))?;
        let _guard = self.ctx.lock_exact(target).await;

        let mut order: Order = self.ctx.repo.get(order_id).await?;
        let events = order.advance(to)?;
        if !events.is_empty() {
            let mut uow = UnitOfWork::new();
            uow.record_snapshotting(&mut order, events)?;
            self.ctx.repo.commit(uow).await?;
            tracing::info!(%order_id, state = %order.state(), "order advanced");
        }
        Ok((&order).into())
    }

    /// Asks for the bill without paying yet: OCCUPIED → PENDING_COLLECTION.
    #[tracing::instrument(skip(self), fields(target = %target))]
    pub async fn request_checkout(&self, target: BillRef) -> Result<HolderView> {
        self.ctx
            .retry("request_checkout", || self.try_checkout(target))
            .await
    }

    async fn try_checkout(&self, target: BillRef) -> Result<HolderView> {
        let (mut holder, _guard) = self.ctx.lock_holder(target).await?;
        if self.ctx.open_order(&holder).await?.is_none() {
            return Err(EngineError::unavailable(format!(
                "{} has no open bill",
                holder.target()
            )));
        }

        let mut uow = UnitOfWork::new();
        holder.stage_collection(&mut uow)?;
        self.ctx.repo.commit(uow).await?;
        Ok(holder.view())
    }

    /// Pays or cancels the open bill and frees its holder.
    ///
    /// A table is released in the same commit. A group keeps its tables until
    /// it is closed. An outstanding deferred record is resolved with the
    /// same outcome.
    #[tracing::instrument(skip(self, cmd), fields(target = %cmd.target, outcome = %cmd.outcome))]
    pub async fn settle_bill(&self, cmd: SettleBill) -> Result<ClosedBill> {
        self.ctx
            .retry("settle_bill", || self.try_settle(&cmd))
            .await
    }

    async fn try_settle(&self, cmd: &SettleBill) -> Result<ClosedBill> {
        let (mut holder, _guard) = self.ctx.lock_holder(cmd.target).await?;
        let mut order = self.ctx.open_order(&holder).await?.ok_or_else(|| {
            EngineError::unavailable(format!("{} has no open bill", holder.target()))
        })?;

        let mut uow = UnitOfWork::new();
        let deferred = self
            .ctx
            .stage_close(&mut uow, &mut holder, &mut order, cmd.outcome, cmd.reason.clone())
            .await?;
        self.ctx.repo.commit(uow).await?;

        metrics::counter!("bills_closed_total", "outcome" => cmd.outcome.as_str()).increment(1);
        tracing::info!(
            order_id = %order.id().unwrap_or_default(),
            total_cents = order.total().cents(),
            "bill closed"
        );

        Ok(ClosedBill {
            order: (&order).into(),
            outcome: cmd.outcome,
            amount: order.total(),
            holder: holder.view(),
            deferred: deferred.as_ref().map(Into::into),
        })
    }

    /// Pre-invoice of the open bill: lines and total, nothing changes.
    #[tracing::instrument(skip(self), fields(target = %target))]
    pub async fn prebill(&self, target: BillRef) -> Result<Prebill> {
        let (holder, _guard) = self.ctx.lock_holder(target).await?;
        let order = self.ctx.open_order(&holder).await?.ok_or_else(|| {
            EngineError::unavailable(format!("{} has no open bill", holder.target()))
        })?;

        let table_numbers = match &holder {
            Holder::Table(table) => vec![table.number()],
            Holder::Group(group) => {
                let mut numbers: Vec<TableNumber> = Vec::with_capacity(group.tables().len());
                for table_id in group.tables() {
                    let table: Table = self.ctx.repo.get(*table_id).await?;
                    numbers.push(table.number());
                }
                numbers.sort();
                numbers
            }
        };

        Ok(Prebill {
            target: holder.target(),
            table_numbers,
            order_id: order.id().unwrap_or_default(),
            server: order.server().to_string(),
            state: order.state(),
            lines: order.lines().to_vec(),
            total: order.total(),
            issued_at: Utc::now(),
        })
    }

    /// Any order, open or closed.
    pub async fn get_order(&self, order_id: AggregateId) -> Result<OrderView> {
        let order: Order = self.ctx.repo.get(order_id).await?;
        Ok((&order).into())
    }
}
