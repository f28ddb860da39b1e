//! Waiter terminal endpoints: submissions, groups, checkout and payment.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use chrono::Duration;
use common::AggregateId;
use consolidation::{
    ClosedBill, Deferral, GroupView, HolderView, OpenGroup, SettleBill, SubmitItems, Submission,
};
use domain::{BillOutcome, BillRef};
use event_store::EventStore;
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct GroupRequest {
    pub group_id: AggregateId,
}

#[derive(Deserialize)]
pub struct TargetRequest {
    pub target: BillRef,
}

#[derive(Deserialize)]
pub struct DeferRequest {
    pub target: BillRef,
    /// Overrides the configured due period.
    #[serde(default)]
    pub due_in_hours: Option<i64>,
}

#[derive(Deserialize)]
pub struct ResolveRequest {
    pub record_id: AggregateId,
    pub outcome: BillOutcome,
}

/// POST /submit-items. 201 when the submission opened a bill.
#[tracing::instrument(skip(state, req), fields(target = %req.target))]
pub async fn submit_items<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<SubmitItems>,
) -> Result<(StatusCode, Json<Submission>), ApiError> {
    let submission = state.services.engine.submit_items(req).await?;
    let status = if submission.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(submission)))
}

/// POST /open-group
#[tracing::instrument(skip(state, req), fields(scope = %req.scope))]
pub async fn open_group<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<OpenGroup>,
) -> Result<(StatusCode, Json<GroupView>), ApiError> {
    let group = state.services.groups.open_group(req).await?;
    Ok((StatusCode::CREATED, Json(group)))
}

/// POST /close-group
#[tracing::instrument(skip(state, req), fields(group_id = %req.group_id))]
pub async fn close_group<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<GroupRequest>,
) -> Result<Json<GroupView>, ApiError> {
    Ok(Json(state.services.groups.close_group(req.group_id).await?))
}

/// POST /mark-deferred
#[tracing::instrument(skip(state, req), fields(target = %req.target))]
pub async fn mark_deferred<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<DeferRequest>,
) -> Result<Json<Deferral>, ApiError> {
    let due_in = match req.due_in_hours {
        Some(hours) if hours <= 0 => {
            return Err(ApiError::BadRequest(
                "due_in_hours must be positive".to_string(),
            ));
        }
        hours => hours.map(Duration::hours),
    };
    Ok(Json(
        state.services.deferred.mark_deferred(req.target, due_in).await?,
    ))
}

/// POST /resolve-deferred
#[tracing::instrument(skip(state, req), fields(record_id = %req.record_id))]
pub async fn resolve_deferred<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<ResolveRequest>,
) -> Result<Json<ClosedBill>, ApiError> {
    Ok(Json(
        state
            .services
            .deferred
            .resolve(req.record_id, req.outcome)
            .await?,
    ))
}

/// POST /request-checkout
#[tracing::instrument(skip(state, req), fields(target = %req.target))]
pub async fn request_checkout<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<TargetRequest>,
) -> Result<Json<HolderView>, ApiError> {
    Ok(Json(state.services.engine.request_checkout(req.target).await?))
}

/// POST /settle-bill
#[tracing::instrument(skip(state, req), fields(target = %req.target, outcome = %req.outcome))]
pub async fn settle_bill<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<SettleBill>,
) -> Result<Json<ClosedBill>, ApiError> {
    Ok(Json(state.services.engine.settle_bill(req).await?))
}
