//! State shared by the services: repository, locks, knobs, and the
//! "which table or group holds this bill" resolution.

use std::future::Future;

use common::{AggregateId, TenantScope};
use domain::{
    Aggregate, BillOutcome, BillRef, DeferredPayment, DomainError, GroupEvent, Money, Order,
    Repository, Table, TableEvent, TableGroup, UnitOfWork,
};
use event_store::{EventQuery, EventStore};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::locks::{KeyedGuard, KeyedLocks, LockKey};
use crate::views::HolderView;

pub(crate) struct ServiceContext<S: EventStore> {
    pub repo: Repository<S>,
    pub locks: KeyedLocks,
    pub config: EngineConfig,
}

impl<S: EventStore> ServiceContext<S> {
    pub fn new(store: S, config: EngineConfig) -> Self {
        Self {
            repo: Repository::new(store),
            locks: KeyedLocks::new(),
            config,
        }
    }

    /// Runs `attempt` until it stops losing version races.
    ///
    /// Each attempt starts again from its read phase; nothing from a failed
    /// attempt was written.
    pub async fn retry<T, F, Fut>(&self, operation: &'static str, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retries = 0;
        loop {
            match attempt().await {
                Err(e) if e.is_retryable_conflict() => {
                    if retries >= self.config.max_conflict_retries {
                        tracing::warn!(operation, retries, "giving up after repeated conflicts");
                        return Err(EngineError::Conflict {
                            operation,
                            retries,
                        });
                    }
                    retries += 1;
                    metrics::counter!("concurrency_retries_total", "operation" => operation)
                        .increment(1);
                    tracing::debug!(operation, retries, "version conflict, re-reading state");
                }
                result => return result,
            }
        }
    }

    /// Locks the table or group that holds the bill of `target` and loads it.
    ///
    /// A table that belongs to an open group resolves to that group. The
    /// membership seen before locking is checked again under the lock.
    pub async fn lock_holder(&self, target: BillRef) -> Result<(Holder, KeyedGuard)> {
        match target {
            BillRef::Group(group_id) => {
                let guard = self.locks.acquire([LockKey::Group(group_id)]).await;
                let group: TableGroup = self.repo.get(group_id).await?;
                if !group.is_open() {
                    return Err(EngineError::unavailable(format!(
                        "group {group_id} is closed"
                    )));
                }
                Ok((Holder::Group(group), guard))
            }
            BillRef::Table(table_id) => {
                for _ in 0..=self.config.max_conflict_retries {
                    let peeked: Table = self.repo.get(table_id).await?;
                    let key = match peeked.group_id() {
                        Some(group_id) => LockKey::Group(group_id),
                        None => LockKey::Table(table_id),
                    };
                    let guard = self.locks.acquire([key]).await;

                    let table: Table = self.repo.get(table_id).await?;
                    if table.group_id() != peeked.group_id() {
                        tracing::debug!(
                            %table_id,
                            released = ?guard.keys(),
                            "group membership changed while locking, retrying"
                        );
                        continue;
                    }
                    table.check_consistency()?;

                    let Some(group_id) = table.group_id() else {
                        return Ok((Holder::Table(table), guard));
                    };
                    let group: TableGroup = self.repo.get(group_id).await?;
                    if !group.is_open() || !group.contains(table_id) {
                        return Err(EngineError::violation(format!(
                            "table {table_id} is grouped under {group_id}, which does not hold it"
                        )));
                    }
                    return Ok((Holder::Group(group), guard));
                }
                Err(EngineError::Conflict {
                    operation: "resolve target",
                    retries: self.config.max_conflict_retries,
                })
            }
        }
    }

    /// Locks exactly the key of `target`, without following group membership.
    pub async fn lock_exact(&self, target: BillRef) -> KeyedGuard {
        let key = match target {
            BillRef::Table(id) => LockKey::Table(id),
            BillRef::Group(id) => LockKey::Group(id),
        };
        self.locks.acquire([key]).await
    }

    /// Ids of every registered table, optionally limited to one branch.
    pub async fn table_ids(&self, scope: Option<TenantScope>) -> Result<Vec<AggregateId>> {
        let events = self
            .repo
            .store()
            .query_events(EventQuery::of(Table::aggregate_type(), "TableRegistered"))
            .await
            .map_err(DomainError::from)?;

        let mut ids = Vec::with_capacity(events.len());
        for envelope in events {
            let event = envelope.decode::<TableEvent>().map_err(DomainError::from)?;
            if let TableEvent::TableRegistered(data) = event
                && scope.is_none_or(|s| s == data.scope)
            {
                ids.push(data.table_id);
            }
        }
        Ok(ids)
    }

    /// Ids of every group ever opened, optionally limited to one branch.
    pub async fn group_ids(&self, scope: Option<TenantScope>) -> Result<Vec<AggregateId>> {
        let events = self
            .repo
            .store()
            .query_events(EventQuery::of(TableGroup::aggregate_type(), "GroupOpened"))
            .await
            .map_err(DomainError::from)?;

        let mut ids = Vec::with_capacity(events.len());
        for envelope in events {
            let event = envelope.decode::<GroupEvent>().map_err(DomainError::from)?;
            if let GroupEvent::GroupOpened(data) = event
                && scope.is_none_or(|s| s == data.scope)
            {
                ids.push(data.group_id);
            }
        }
        Ok(ids)
    }

    /// Loads the holder's running order, if any.
    pub async fn open_order(&self, holder: &Holder) -> Result<Option<Order>> {
        let Some(order_id) = holder.active_order_id() else {
            return Ok(None);
        };
        let order: Order = self.repo.get(order_id).await?;
        if !order.is_open() {
            return Err(EngineError::violation(format!(
                "{} references order {order_id}, which is {}",
                holder.target(),
                order.state()
            )));
        }
        Ok(Some(order))
    }

    /// Stages payment or cancellation of `order` and frees its holder.
    ///
    /// A deferred record attached to the order is resolved in the same
    /// commit.
    pub async fn stage_close(
        &self,
        uow: &mut UnitOfWork,
        holder: &mut Holder,
        order: &mut Order,
        outcome: BillOutcome,
        reason: Option<String>,
    ) -> Result<Option<DeferredPayment>> {
        let events = match outcome {
            BillOutcome::Paid => order.pay()?,
            BillOutcome::Cancelled => {
                order.cancel(reason.unwrap_or_else(|| "cancelled at terminal".to_string()))?
            }
        };
        uow.record_snapshotting(order, events)?;

        let deferred = match order.deferred_record() {
            Some(record_id) => {
                let mut record: DeferredPayment = self.repo.get(record_id).await?;
                if record.is_outstanding() {
                    let events = record.resolve(outcome)?;
                    uow.record_snapshotting(&mut record, events)?;
                }
                Some(record)
            }
            None => None,
        };

        holder.stage_close(uow, outcome)?;
        Ok(deferred)
    }
}

/// The aggregate a running bill is attached to.
#[derive(Debug, Clone)]
pub(crate) enum Holder {
    Table(Table),
    Group(TableGroup),
}

impl Holder {
    pub fn target(&self) -> BillRef {
        match self {
            Holder::Table(table) => BillRef::Table(table.id().unwrap_or_default()),
            Holder::Group(group) => BillRef::Group(group.id().unwrap_or_default()),
        }
    }

    pub fn scope(&self) -> Option<TenantScope> {
        match self {
            Holder::Table(table) => table.scope(),
            Holder::Group(group) => group.scope(),
        }
    }

    pub fn active_order_id(&self) -> Option<AggregateId> {
        match self {
            Holder::Table(table) => table.active_order_id(),
            Holder::Group(group) => group.active_order_id(),
        }
    }

    pub fn view(&self) -> HolderView {
        match self {
            Holder::Table(table) => HolderView::Table(table.into()),
            Holder::Group(group) => HolderView::Group(group.into()),
        }
    }

    /// Attaches a freshly opened order.
    pub fn stage_open(
        &mut self,
        uow: &mut UnitOfWork,
        order_id: AggregateId,
        server: &str,
    ) -> Result<()> {
        match self {
            Holder::Table(table) => {
                let events = table.occupy(order_id, server)?;
                uow.record_snapshotting(table, events)?;
            }
            Holder::Group(group) => {
                let events = group.start_bill(order_id)?;
                uow.record_snapshotting(group, events)?;
            }
        }
        Ok(())
    }

    pub fn stage_total(
        &mut self,
        uow: &mut UnitOfWork,
        order_id: AggregateId,
        total: Money,
    ) -> Result<()> {
        match self {
            Holder::Table(table) => {
                let events = table.update_total(order_id, total)?;
                uow.record_snapshotting(table, events)?;
            }
            Holder::Group(group) => {
                let events = group.update_total(order_id, total)?;
                uow.record_snapshotting(group, events)?;
            }
        }
        Ok(())
    }

    pub fn stage_collection(&mut self, uow: &mut UnitOfWork) -> Result<()> {
        match self {
            Holder::Table(table) => {
                let events = table.request_collection()?;
                uow.record_snapshotting(table, events)?;
            }
            Holder::Group(group) => {
                let events = group.request_collection()?;
                uow.record_snapshotting(group, events)?;
            }
        }
        Ok(())
    }

    /// A table goes through PAID (or voids its bill) and back to FREE; a
    /// group drops its bill and stays open with its tables GROUPED.
    fn stage_close(&mut self, uow: &mut UnitOfWork, outcome: BillOutcome) -> Result<()> {
        match self {
            Holder::Table(table) => {
                let events = match outcome {
                    BillOutcome::Paid => table.settle()?,
                    BillOutcome::Cancelled => table.void_bill()?,
                };
                uow.record_snapshotting(table, events)?;
                let events = table.release()?;
                uow.record_snapshotting(table, events)?;
            }
            Holder::Group(group) => {
                let events = group.close_bill(outcome)?;
                uow.record_snapshotting(group, events)?;
            }
        }
        Ok(())
    }
}
