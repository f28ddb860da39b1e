//! Table/order consolidation for the restaurant point of sale.
//!
//! The services in this crate own every write to tables, orders, groups and
//! deferred payments:
//! 1. [`ConsolidationEngine`] merges submissions into the single open bill of
//!    a table or group, and closes bills
//! 2. [`GroupManager`] opens and closes table groups
//! 3. [`DeferredPaymentTracker`] handles "pay later" bills
//! 4. [`TableRegistry`] registers tables and flips their availability
//! 5. [`Reconciler`] reports broken invariants
//!
//! Each write runs under a per-table or per-group lock and commits all
//! touched streams atomically.

pub mod collaborators;
pub mod commands;
pub mod config;
mod context;
pub mod deferred;
pub mod engine;
pub mod error;
pub mod groups;
pub mod locks;
pub mod reconciler;
pub mod registry;
pub mod views;

use std::sync::Arc;

use event_store::EventStore;

pub use collaborators::{
    CollaboratorError, Feature, FeatureGate, InMemoryFeatureGate, InMemoryKitchenNotifier,
    KitchenNotifier, KitchenTicket, LoggingKitchenNotifier, TicketId,
};
pub use commands::{OpenGroup, RegisterTable, SetAvailability, SettleBill, SubmitItems};
pub use config::EngineConfig;
pub use deferred::DeferredPaymentTracker;
pub use engine::ConsolidationEngine;
pub use error::{EngineError, Result};
pub use groups::GroupManager;
pub use locks::{KeyedGuard, KeyedLocks, LockKey};
pub use reconciler::{Finding, Reconciler, ReconciliationReport};
pub use registry::TableRegistry;
pub use views::{
    ClosedBill, Deferral, DeferredView, GroupView, HolderView, OrderView, Prebill, Submission,
    TableView,
};

use context::ServiceContext;

/// Every service, sharing one repository and one lock map.
pub struct PosServices<S: EventStore> {
    pub engine: ConsolidationEngine<S>,
    pub registry: TableRegistry<S>,
    pub groups: GroupManager<S>,
    pub deferred: DeferredPaymentTracker<S>,
    pub reconciler: Reconciler<S>,
}

impl<S: EventStore> PosServices<S> {
    pub fn new(
        store: S,
        gate: Arc<dyn FeatureGate>,
        notifier: Arc<dyn KitchenNotifier>,
        config: EngineConfig,
    ) -> Self {
        let ctx = Arc::new(ServiceContext::new(store, config));
        Self {
            engine: ConsolidationEngine::new(Arc::clone(&ctx), notifier),
            registry: TableRegistry::new(Arc::clone(&ctx)),
            groups: GroupManager::new(Arc::clone(&ctx), gate),
            deferred: DeferredPaymentTracker::new(Arc::clone(&ctx)),
            reconciler: Reconciler::new(ctx),
        }
    }

    /// Every feature enabled; kitchen tickets are only logged.
    pub fn with_defaults(store: S) -> Self {
        Self::new(
            store,
            Arc::new(InMemoryFeatureGate::new()),
            Arc::new(LoggingKitchenNotifier),
            EngineConfig::default(),
        )
    }
}
