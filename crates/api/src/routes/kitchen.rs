//! Kitchen display endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use consolidation::OrderView;
use domain::OrderState;
use event_store::EventStore;
use projections::KitchenOrder;
use serde::Deserialize;

use super::parse_aggregate_id;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct FeedQuery {
    #[serde(default)]
    pub include_ready: bool,
}

#[derive(Deserialize)]
pub struct StatusRequest {
    pub state: OrderState,
}

/// GET /kitchen/orders?include_ready=bool
#[tracing::instrument(skip(state, query), fields(include_ready = query.include_ready))]
pub async fn orders<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<FeedQuery>,
) -> Result<Json<Vec<KitchenOrder>>, ApiError> {
    state.catch_up().await?;
    Ok(Json(state.kitchen_feed.orders(query.include_ready).await))
}

/// GET /orders/{id}
#[tracing::instrument(skip(state))]
pub async fn get_order<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderView>, ApiError> {
    let order_id = parse_aggregate_id(&id)?;
    Ok(Json(state.services.engine.get_order(order_id).await?))
}

/// POST /orders/{id}/status
#[tracing::instrument(skip(state, req), fields(to = %req.state))]
pub async fn advance<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<StatusRequest>,
) -> Result<Json<OrderView>, ApiError> {
    let order_id = parse_aggregate_id(&id)?;
    Ok(Json(
        state.services.engine.advance_order(order_id, req.state).await?,
    ))
}
