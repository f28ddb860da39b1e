//! Operations endpoints: reconciliation and deferred payment sweeps.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use chrono::Utc;
use consolidation::{DeferredView, ReconciliationReport};
use event_store::EventStore;

use crate::error::ApiError;
use crate::state::AppState;

/// GET /reconciliation. Reports, never repairs.
#[tracing::instrument(skip(state))]
pub async fn reconcile<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<ReconciliationReport>, ApiError> {
    Ok(Json(state.services.reconciler.scan().await?))
}

/// GET /deferred: records not yet resolved.
#[tracing::instrument(skip(state))]
pub async fn outstanding<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<DeferredView>>, ApiError> {
    Ok(Json(state.services.deferred.outstanding().await?))
}

/// POST /deferred/expire: flags every record past its due date.
#[tracing::instrument(skip(state))]
pub async fn expire<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<DeferredView>>, ApiError> {
    Ok(Json(state.services.deferred.expire_overdue(Utc::now()).await?))
}
