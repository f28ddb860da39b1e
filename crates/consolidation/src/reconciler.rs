//! Reconciliation scan: reports tables, groups and running orders whose
//! stored state breaks an invariant. Reports only; nothing is corrected.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{AggregateId, TableNumber, TenantScope};
use domain::{
    Aggregate, BillRef, ConsistencyIssue, Money, Order, Table, TableGroup, TableState,
};
use event_store::EventStore;
use serde::Serialize;

use crate::context::ServiceContext;
use crate::error::Result;

/// One broken invariant on one table or group.
#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    pub holder: BillRef,
    pub scope: Option<TenantScope>,
    /// Set for table findings.
    pub number: Option<TableNumber>,
    /// Set for table findings.
    pub state: Option<TableState>,
    pub issue: ConsistencyIssue,
}

impl Finding {
    fn table(table: &Table, issue: ConsistencyIssue) -> Self {
        Self {
            holder: BillRef::Table(table.id().unwrap_or_default()),
            scope: table.scope(),
            number: Some(table.number()),
            state: Some(table.state()),
            issue,
        }
    }

    fn group(group: &TableGroup, issue: ConsistencyIssue) -> Self {
        Self {
            holder: BillRef::Group(group.id().unwrap_or_default()),
            scope: group.scope(),
            number: None,
            state: None,
            issue,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationReport {
    /// Tables walked.
    pub scanned: usize,
    /// Open groups walked.
    pub groups_scanned: usize,
    pub findings: Vec<Finding>,
    pub scanned_at: DateTime<Utc>,
}

impl ReconciliationReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }
}

pub struct Reconciler<S: EventStore> {
    ctx: Arc<ServiceContext<S>>,
}

impl<S: EventStore> Reconciler<S> {
    pub(crate) fn new(ctx: Arc<ServiceContext<S>>) -> Self {
        Self { ctx }
    }

    /// Walks every registered table and every open group.
    #[tracing::instrument(skip(self))]
    pub async fn scan(&self) -> Result<ReconciliationReport> {
        let table_ids = self.ctx.table_ids(None).await?;
        let mut findings = Vec::new();

        for table_id in &table_ids {
            let table: Table = self.ctx.repo.get(*table_id).await?;
            for issue in self.inspect_table(&table).await? {
                findings.push(Finding::table(&table, issue));
            }
        }

        let mut groups_scanned = 0;
        for group_id in self.ctx.group_ids(None).await? {
            let group: TableGroup = self.ctx.repo.get(group_id).await?;
            if !group.is_open() {
                continue;
            }
            groups_scanned += 1;
            for issue in self.inspect_group(&group).await? {
                findings.push(Finding::group(&group, issue));
            }
        }

        for finding in &findings {
            metrics::counter!("consistency_violations_total").increment(1);
            tracing::error!(
                target: "reconciliation",
                holder = %finding.holder,
                issue = %finding.issue,
                "consistency violation"
            );
        }

        tracing::info!(
            scanned = table_ids.len(),
            groups_scanned,
            findings = findings.len(),
            "reconciliation scan complete"
        );
        Ok(ReconciliationReport {
            scanned: table_ids.len(),
            groups_scanned,
            findings,
            scanned_at: Utc::now(),
        })
    }

    async fn inspect_table(&self, table: &Table) -> Result<Vec<ConsistencyIssue>> {
        let mut issues = table.consistency_issues();
        let table_id = table.id().unwrap_or_default();

        if let Some(group_id) = table.group_id() {
            let group: Option<TableGroup> = self.ctx.repo.load_existing(group_id).await?;
            let held = group.is_some_and(|g| g.is_open() && g.contains(table_id));
            if !held {
                issues.push(ConsistencyIssue::OrphanedMembership {
                    group_id: Some(group_id),
                });
            }
        }

        if table.state().has_open_bill()
            && let Some(order_id) = table.active_order_id()
        {
            self.inspect_bill(order_id, table.accumulated_total(), &mut issues)
                .await?;
        }

        Ok(issues)
    }

    async fn inspect_group(&self, group: &TableGroup) -> Result<Vec<ConsistencyIssue>> {
        let mut issues = Vec::new();
        if let Some(order_id) = group.active_order_id() {
            self.inspect_bill(order_id, group.accumulated_total(), &mut issues)
                .await?;
        }
        Ok(issues)
    }

    /// Compares a holder's cached total with its running order, and the
    /// order's stored total with the sum of its lines.
    async fn inspect_bill(
        &self,
        order_id: AggregateId,
        cached: Money,
        issues: &mut Vec<ConsistencyIssue>,
    ) -> Result<()> {
        let order: Option<Order> = self.ctx.repo.load_existing(order_id).await?;
        let Some(order) = order.filter(|o| o.is_open()) else {
            issues.push(ConsistencyIssue::TotalMismatch {
                cached,
                actual: Money::zero(),
            });
            return Ok(());
        };

        if order.total() != cached {
            issues.push(ConsistencyIssue::TotalMismatch {
                cached,
                actual: order.total(),
            });
        }
        let computed = order.computed_total();
        if computed != Some(order.total()) {
            issues.push(ConsistencyIssue::LineSumMismatch {
                order_id,
                stored: order.total(),
                computed,
            });
        }
        Ok(())
    }
}
