//! Table Registry service: registration, availability, lookups.

use std::sync::Arc;

use common::{AggregateId, TenantScope};
use domain::{Table, UnitOfWork};
use event_store::EventStore;

use crate::commands::{RegisterTable, SetAvailability};
use crate::context::ServiceContext;
use crate::error::Result;
use crate::locks::LockKey;
use crate::views::TableView;

pub struct TableRegistry<S: EventStore> {
    ctx: Arc<ServiceContext<S>>,
}

impl<S: EventStore> TableRegistry<S> {
    pub(crate) fn new(ctx: Arc<ServiceContext<S>>) -> Self {
        Self { ctx }
    }

    /// Registers a table under its `(restaurant, branch, number)` key.
    #[tracing::instrument(skip(self, cmd), fields(scope = %cmd.scope, number = %cmd.number))]
    pub async fn register_table(&self, cmd: RegisterTable) -> Result<TableView> {
        self.ctx
            .retry("register_table", || self.try_register(&cmd))
            .await
    }

    async fn try_register(&self, cmd: &RegisterTable) -> Result<TableView> {
        let table_id = AggregateId::for_table(&cmd.scope, cmd.number);
        let _guard = self.ctx.locks.acquire([LockKey::Table(table_id)]).await;

        let mut table: Table = self.ctx.repo.load(table_id).await?;
        let events = table.register(table_id, cmd.scope, cmd.number, cmd.capacity)?;

        let mut uow = UnitOfWork::new();
        uow.record_snapshotting(&mut table, events)?;
        self.ctx.repo.commit(uow).await?;

        tracing::info!(%table_id, "table registered");
        Ok((&table).into())
    }

    /// Administrative switch between FREE, RESERVED and MAINTENANCE.
    #[tracing::instrument(skip(self, cmd), fields(table_id = %cmd.table_id, state = %cmd.state))]
    pub async fn set_availability(&self, cmd: SetAvailability) -> Result<TableView> {
        self.ctx
            .retry("set_availability", || self.try_set_availability(&cmd))
            .await
    }

    async fn try_set_availability(&self, cmd: &SetAvailability) -> Result<TableView> {
        let _guard = self
            .ctx
            .locks
            .acquire([LockKey::Table(cmd.table_id)])
            .await;

        let mut table: Table = self.ctx.repo.get(cmd.table_id).await?;
        table.check_consistency()?;
        let events = table.set_availability(cmd.state)?;
        if !events.is_empty() {
            let mut uow = UnitOfWork::new();
            uow.record_snapshotting(&mut table, events)?;
            self.ctx.repo.commit(uow).await?;
        }
        Ok((&table).into())
    }

    pub async fn get_table(&self, table_id: AggregateId) -> Result<TableView> {
        let table: Table = self.ctx.repo.get(table_id).await?;
        Ok((&table).into())
    }

    /// Ids of every registered table, optionally limited to one branch.
    pub async fn table_ids(&self, scope: Option<TenantScope>) -> Result<Vec<AggregateId>> {
        self.ctx.table_ids(scope).await
    }

    /// Every registered table of a branch, ordered by number.
    pub async fn list_tables(&self, scope: TenantScope) -> Result<Vec<TableView>> {
        let mut tables = Vec::new();
        for table_id in self.table_ids(Some(scope)).await? {
            let table: Table = self.ctx.repo.get(table_id).await?;
            tables.push(TableView::from(&table));
        }
        tables.sort_by_key(|t| t.number);
        Ok(tables)
    }
}

