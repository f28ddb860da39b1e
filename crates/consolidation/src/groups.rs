//! Table Group Manager: several tables under one running bill.
//!
//! Groups are only opened and closed. Removing a single table from an open
//! group is not offered; close the group and open a new one.

use std::sync::Arc;

use common::AggregateId;
use domain::{Aggregate, Table, TableGroup, UnitOfWork};
use event_store::EventStore;

use crate::collaborators::{Feature, FeatureGate};
use crate::commands::OpenGroup;
use crate::context::ServiceContext;
use crate::error::{EngineError, Result};
use crate::locks::LockKey;
use crate::views::GroupView;

pub struct GroupManager<S: EventStore> {
    ctx: Arc<ServiceContext<S>>,
    gate: Arc<dyn FeatureGate>,
}

impl<S: EventStore> GroupManager<S> {
    pub(crate) fn new(ctx: Arc<ServiceContext<S>>, gate: Arc<dyn FeatureGate>) -> Self {
        Self { ctx, gate }
    }

    /// Groups free tables of one branch under a new open group.
    #[tracing::instrument(skip(self, cmd), fields(scope = %cmd.scope, tables = cmd.tables.len()))]
    pub async fn open_group(&self, cmd: OpenGroup) -> Result<GroupView> {
        if cmd.server.trim().is_empty() {
            return Err(EngineError::invalid("server is required"));
        }
        if !self
            .gate
            .is_enabled(cmd.scope.restaurant_id, Feature::TableGrouping)
            .await?
        {
            tracing::info!(restaurant_id = cmd.scope.restaurant_id, "table grouping not in plan");
            return Err(EngineError::FeatureRestricted {
                feature: Feature::TableGrouping,
                restaurant_id: cmd.scope.restaurant_id,
            });
        }

        self.ctx
            .retry("open_group", || self.try_open(&cmd))
            .await
    }

    async fn try_open(&self, cmd: &OpenGroup) -> Result<GroupView> {
        let group_id = AggregateId::new();
        let mut group = TableGroup::default();
        let events = group.open(group_id, cmd.scope, &cmd.server, cmd.tables.clone())?;

        let keys = std::iter::once(LockKey::Group(group_id))
            .chain(cmd.tables.iter().map(|id| LockKey::Table(*id)));
        let _guard = self.ctx.locks.acquire(keys).await;

        let mut uow = UnitOfWork::new();
        uow.record_snapshotting(&mut group, events)?;

        for table_id in group.tables().to_vec() {
            let mut table: Table = self.ctx.repo.get(table_id).await?;
            if table.scope() != Some(cmd.scope) {
                return Err(EngineError::invalid(format!(
                    "table {table_id} does not belong to branch {}",
                    cmd.scope
                )));
            }
            table.check_consistency()?;
            let events = table.join_group(group_id)?;
            uow.record_snapshotting(&mut table, events)?;
        }

        self.ctx.repo.commit(uow).await?;

        metrics::counter!("groups_opened_total").increment(1);
        tracing::info!(%group_id, tables = group.tables().len(), "group opened");
        Ok((&group).into())
    }

    /// Closes a group with no running bill and frees its tables.
    #[tracing::instrument(skip(self))]
    pub async fn close_group(&self, group_id: AggregateId) -> Result<GroupView> {
        self.ctx
            .retry("close_group", || self.try_close(group_id))
            .await
    }

    async fn try_close(&self, group_id: AggregateId) -> Result<GroupView> {
        let peeked: TableGroup = self.ctx.repo.get(group_id).await?;
        let keys = std::iter::once(LockKey::Group(group_id))
            .chain(peeked.tables().iter().map(|id| LockKey::Table(*id)));
        let _guard = self.ctx.locks.acquire(keys).await;

        let mut group: TableGroup = self.ctx.repo.get(group_id).await?;
        let events = group.close()?;

        let mut uow = UnitOfWork::new();
        uow.record_snapshotting(&mut group, events)?;

        for table_id in group.tables().to_vec() {
            let mut table: Table = self.ctx.repo.get(table_id).await?;
            if table.group_id() != Some(group_id) {
                return Err(EngineError::violation(format!(
                    "group {group_id} lists table {table_id}, which is not a member"
                )));
            }
            let events = table.release()?;
            uow.record_snapshotting(&mut table, events)?;
        }

        self.ctx.repo.commit(uow).await?;

        tracing::info!(%group_id, version = group.version().as_i64(), "group closed");
        Ok((&group).into())
    }

    pub async fn get_group(&self, group_id: AggregateId) -> Result<GroupView> {
        let group: TableGroup = self.ctx.repo.get(group_id).await?;
        Ok((&group).into())
    }
}
