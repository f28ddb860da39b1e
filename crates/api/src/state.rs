//! Shared application state.

use std::sync::Arc;

use consolidation::{
    EngineConfig, FeatureGate, InMemoryFeatureGate, KitchenNotifier, LoggingKitchenNotifier,
    PosServices,
};
use event_store::EventStore;
use projections::{
    BillHistoryView, KitchenFeedView, Projection, ProjectionProcessor, TableFloorView,
};

use crate::error::ApiError;

/// Services for writes, read models for queries.
pub struct AppState<S: EventStore> {
    pub services: PosServices<S>,
    pub processor: Arc<ProjectionProcessor<S>>,
    pub kitchen_feed: KitchenFeedView,
    pub floor: TableFloorView,
    pub history: BillHistoryView,
}

impl<S: EventStore> AppState<S> {
    /// Brings the read models up to date before a query.
    pub async fn catch_up(&self) -> Result<(), ApiError> {
        self.processor.run_catch_up().await?;
        Ok(())
    }
}

/// Builds the state with the given collaborators.
pub fn create_state<S: EventStore + Clone + 'static>(
    event_store: S,
    gate: Arc<dyn FeatureGate>,
    notifier: Arc<dyn KitchenNotifier>,
    config: EngineConfig,
) -> Arc<AppState<S>> {
    let kitchen_feed = KitchenFeedView::new();
    let floor = TableFloorView::new();
    let history = BillHistoryView::new();

    let mut processor = ProjectionProcessor::new(event_store.clone());
    processor.register(Box::new(kitchen_feed.clone()) as Box<dyn Projection>);
    processor.register(Box::new(floor.clone()) as Box<dyn Projection>);
    processor.register(Box::new(history.clone()) as Box<dyn Projection>);

    Arc::new(AppState {
        services: PosServices::new(event_store, gate, notifier, config),
        processor: Arc::new(processor),
        kitchen_feed,
        floor,
        history,
    })
}

/// In-memory feature gate (everything enabled); kitchen tickets go to the
/// log and displays follow the Kitchen Feed.
pub fn create_default_state<S: EventStore + Clone + 'static>(
    event_store: S,
    config: EngineConfig,
) -> Arc<AppState<S>> {
    create_state(
        event_store,
        Arc::new(InMemoryFeatureGate::new()),
        Arc::new(LoggingKitchenNotifier),
        config,
    )
}
