//! Deferred Payment Tracker: "pay later" bills and their resolution.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use common::AggregateId;
use domain::{
    Aggregate, BillOutcome, BillRef, DeferredEvent, DeferredPayment, DeferredState, DomainError,
    Order, OrderState, UnitOfWork,
};
use event_store::{EventQuery, EventStore};

use crate::context::ServiceContext;
use crate::error::{EngineError, Result};
use crate::views::{ClosedBill, Deferral, DeferredView};

pub struct DeferredPaymentTracker<S: EventStore> {
    ctx: Arc<ServiceContext<S>>,
}

impl<S: EventStore> DeferredPaymentTracker<S> {
    pub(crate) fn new(ctx: Arc<ServiceContext<S>>) -> Self {
        Self { ctx }
    }

    /// Marks the open bill of `target` as collectible later.
    ///
    /// The holder goes to PENDING_COLLECTION and a record captures the total
    /// at this instant. Marking an already deferred bill returns the
    /// existing record unchanged.
    #[tracing::instrument(skip(self), fields(target = %target))]
    pub async fn mark_deferred(&self, target: BillRef, due_in: Option<Duration>) -> Result<Deferral> {
        let due_in = due_in.unwrap_or(self.ctx.config.deferred_due);
        self.ctx
            .retry("mark_deferred", || self.try_mark(target, due_in))
            .await
    }

    async fn try_mark(&self, target: BillRef, due_in: Duration) -> Result<Deferral> {
        let (mut holder, _guard) = self.ctx.lock_holder(target).await?;
        let mut order = self.ctx.open_order(&holder).await?.ok_or_else(|| {
            EngineError::unavailable(format!("{} has no open bill to defer", holder.target()))
        })?;

        if order.state() == OrderState::PendingPayment
            && let Some(record_id) = order.deferred_record()
        {
            let record: DeferredPayment = self.ctx.repo.get(record_id).await?;
            return Ok(Deferral {
                record: (&record).into(),
                order: (&order).into(),
                holder: holder.view(),
            });
        }

        let order_id = order.id().unwrap_or_default();
        let record_id = AggregateId::new();
        let mut record = DeferredPayment::default();
        let mut uow = UnitOfWork::new();

        let events = order.defer(record_id)?;
        uow.record_snapshotting(&mut order, events)?;
        let events = record.open(
            record_id,
            order_id,
            holder.target(),
            order.total(),
            Utc::now() + due_in,
        )?;
        uow.record_snapshotting(&mut record, events)?;
        holder.stage_collection(&mut uow)?;

        self.ctx.repo.commit(uow).await?;

        metrics::counter!("deferred_payments_total", "action" => "opened").increment(1);
        tracing::info!(
            %record_id,
            %order_id,
            total_cents = order.total().cents(),
            "payment deferred"
        );

        Ok(Deferral {
            record: (&record).into(),
            order: (&order).into(),
            holder: holder.view(),
        })
    }

    /// Collects (or writes off) a deferred bill and frees its holder.
    ///
    /// Expired records can still be resolved.
    #[tracing::instrument(skip(self))]
    pub async fn resolve(&self, record_id: AggregateId, outcome: BillOutcome) -> Result<ClosedBill> {
        self.ctx
            .retry("resolve_deferred", || self.try_resolve(record_id, outcome))
            .await
    }

    async fn try_resolve(&self, record_id: AggregateId, outcome: BillOutcome) -> Result<ClosedBill> {
        let peeked: DeferredPayment = self.ctx.repo.get(record_id).await?;
        if !peeked.is_outstanding() {
            return Err(domain::DeferredError::AlreadyResolved.into());
        }
        let (target, order_id) = peeked.target().zip(peeked.order_id()).ok_or_else(|| {
            EngineError::violation(format!("deferred record {record_id} has no bill"))
        })?;

        let (mut holder, _guard) = self.ctx.lock_holder(target).await?;
        if holder.active_order_id() != Some(order_id) {
            return Err(EngineError::violation(format!(
                "deferred record {record_id} points at order {order_id}, which {} no longer runs",
                holder.target()
            )));
        }
        let mut order: Order = self.ctx.repo.get(order_id).await?;

        let mut uow = UnitOfWork::new();
        let record = self
            .ctx
            .stage_close(&mut uow, &mut holder, &mut order, outcome, None)
            .await?;
        self.ctx.repo.commit(uow).await?;

        metrics::counter!("deferred_payments_total", "action" => "resolved").increment(1);
        tracing::info!(%record_id, %order_id, %outcome, "deferred payment resolved");

        Ok(ClosedBill {
            order: (&order).into(),
            outcome,
            amount: order.total(),
            holder: holder.view(),
            deferred: record.as_ref().map(Into::into),
        })
    }

    /// Moves every pending record past its due date to EXPIRED.
    ///
    /// Expiry only flags the record; the bill stays open and can still be
    /// resolved.
    #[tracing::instrument(skip(self))]
    pub async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<Vec<DeferredView>> {
        let mut expired = Vec::new();
        for record_id in self.record_ids().await? {
            let peeked: DeferredPayment = self.ctx.repo.get(record_id).await?;
            let overdue = peeked.state() == DeferredState::Pending
                && peeked.due_at().is_some_and(|due| due <= now);
            if !overdue {
                continue;
            }
            if let Some(view) = self
                .ctx
                .retry("expire_deferred", || self.try_expire(record_id, now))
                .await?
            {
                expired.push(view);
            }
        }

        if !expired.is_empty() {
            metrics::counter!("deferred_payments_total", "action" => "expired")
                .increment(expired.len() as u64);
            tracing::info!(count = expired.len(), "deferred payments expired");
        }
        Ok(expired)
    }

    async fn try_expire(&self, record_id: AggregateId, now: DateTime<Utc>) -> Result<Option<DeferredView>> {
        let peeked: DeferredPayment = self.ctx.repo.get(record_id).await?;
        let Some(target) = peeked.target() else {
            return Ok(None);
        };
        let _guard = self.ctx.lock_exact(target).await;

        let mut record: DeferredPayment = self.ctx.repo.get(record_id).await?;
        let events = record.expire(now)?;
        if events.is_empty() {
            return Ok(None);
        }
        let mut uow = UnitOfWork::new();
        uow.record_snapshotting(&mut record, events)?;
        self.ctx.repo.commit(uow).await?;
        Ok(Some((&record).into()))
    }

    pub async fn get_record(&self, record_id: AggregateId) -> Result<DeferredView> {
        let record: DeferredPayment = self.ctx.repo.get(record_id).await?;
        Ok((&record).into())
    }

    /// Records that are not yet resolved, oldest first.
    pub async fn outstanding(&self) -> Result<Vec<DeferredView>> {
        let mut records = Vec::new();
        for record_id in self.record_ids().await? {
            let record: DeferredPayment = self.ctx.repo.get(record_id).await?;
            if record.is_outstanding() {
                records.push(DeferredView::from(&record));
            }
        }
        Ok(records)
    }

    async fn record_ids(&self) -> Result<Vec<AggregateId>> {
        let events = self
            .ctx
            .repo
            .store()
            .query_events(EventQuery::of(
                DeferredPayment::aggregate_type(),
                "DeferredPaymentOpened",
            ))
            .await
            .map_err(DomainError::from)?;

        let mut ids = Vec::with_capacity(events.len());
        for envelope in events {
            if let DeferredEvent::DeferredPaymentOpened(data) =
                envelope.decode::<DeferredEvent>().map_err(DomainError::from)?
            {
                ids.push(data.record_id);
            }
        }
        Ok(ids)
    }
}
