//! Domain layer for the table/order consolidation engine.
//!
//! This crate provides:
//! - Aggregate and DomainEvent traits for event-sourced entities
//! - Table (registry), Order (ledger), TableGroup and DeferredPayment aggregates
//! - Repository and UnitOfWork for atomic commits across several aggregates

pub mod aggregate;
pub mod bill;
pub mod deferred;
pub mod error;
pub mod group;
pub mod money;
pub mod order;
pub mod repository;
pub mod table;

pub use aggregate::{Aggregate, DomainEvent, SnapshotCapable};
pub use bill::{BillOutcome, BillRef};
pub use deferred::{DeferredError, DeferredEvent, DeferredPayment, DeferredState};
pub use error::DomainError;
pub use group::{GroupError, GroupEvent, GroupState, TableGroup};
pub use money::Money;
pub use order::{
    LineItem, NewLineItem, Order, OrderError, OrderEvent, OrderState, ProductId,
};
pub use repository::{Repository, UnitOfWork};
pub use table::{ConsistencyIssue, Table, TableError, TableEvent, TableState};
