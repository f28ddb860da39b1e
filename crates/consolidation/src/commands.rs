//! Commands accepted by the services.

use common::{AggregateId, TableNumber, TenantScope};
use domain::{BillOutcome, BillRef, NewLineItem, TableState};
use serde::{Deserialize, Serialize};

/// Items from a waiter terminal for a table or group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitItems {
    pub target: BillRef,
    pub server: String,
    pub items: Vec<NewLineItem>,
    /// Client-generated; a repeated token is applied once.
    #[serde(default)]
    pub submission_token: Option<String>,
}

impl SubmitItems {
    pub fn new(target: BillRef, server: impl Into<String>, items: Vec<NewLineItem>) -> Self {
        Self {
            target,
            server: server.into(),
            items,
            submission_token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.submission_token = Some(token.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettleBill {
    pub target: BillRef,
    pub outcome: BillOutcome,
    #[serde(default)]
    pub reason: Option<String>,
}

impl SettleBill {
    pub fn paid(target: BillRef) -> Self {
        Self {
            target,
            outcome: BillOutcome::Paid,
            reason: None,
        }
    }

    pub fn cancelled(target: BillRef, reason: impl Into<String>) -> Self {
        Self {
            target,
            outcome: BillOutcome::Cancelled,
            reason: Some(reason.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenGroup {
    pub scope: TenantScope,
    pub tables: Vec<AggregateId>,
    pub server: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterTable {
    pub scope: TenantScope,
    pub number: TableNumber,
    pub capacity: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetAvailability {
    pub table_id: AggregateId,
    pub state: TableState,
}
