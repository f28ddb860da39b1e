//! Table registry, floor board and bill history endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::TenantScope;
use consolidation::{GroupView, Prebill, RegisterTable, SetAvailability, TableView};
use domain::{BillRef, Money, TableState};
use event_store::EventStore;
use projections::{ClosedBill, GroupSummary, HistoryFilter, TableStats, TableSummary};
use serde::{Deserialize, Serialize};

use super::parse_aggregate_id;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct AvailabilityRequest {
    pub state: TableState,
}

#[derive(Debug, Default, Deserialize)]
pub struct FloorQuery {
    pub state: Option<TableState>,
}

#[derive(Serialize)]
pub struct RevenueResponse {
    pub paid_bills: usize,
    pub revenue: Money,
}

/// POST /tables
#[tracing::instrument(skip(state, req), fields(scope = %req.scope, number = %req.number))]
pub async fn register<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<RegisterTable>,
) -> Result<(StatusCode, Json<TableView>), ApiError> {
    let table = state.services.registry.register_table(req).await?;
    Ok((StatusCode::CREATED, Json(table)))
}

/// GET /tables/{id}: the authoritative table, not the floor projection.
#[tracing::instrument(skip(state))]
pub async fn get<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<TableView>, ApiError> {
    let table_id = parse_aggregate_id(&id)?;
    Ok(Json(state.services.registry.get_table(table_id).await?))
}

/// POST /tables/{id}/availability
#[tracing::instrument(skip(state, req), fields(to = %req.state))]
pub async fn set_availability<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<AvailabilityRequest>,
) -> Result<Json<TableView>, ApiError> {
    let table_id = parse_aggregate_id(&id)?;
    let table = state
        .services
        .registry
        .set_availability(SetAvailability {
            table_id,
            state: req.state,
        })
        .await?;
    Ok(Json(table))
}

/// GET /tables/{id}/prebill. A grouped table answers with its group's bill.
#[tracing::instrument(skip(state))]
pub async fn table_prebill<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Prebill>, ApiError> {
    let table_id = parse_aggregate_id(&id)?;
    Ok(Json(
        state.services.engine.prebill(BillRef::Table(table_id)).await?,
    ))
}

/// GET /groups/{id}
#[tracing::instrument(skip(state))]
pub async fn get_group<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<GroupView>, ApiError> {
    let group_id = parse_aggregate_id(&id)?;
    Ok(Json(state.services.groups.get_group(group_id).await?))
}

/// GET /groups/{id}/prebill
#[tracing::instrument(skip(state))]
pub async fn group_prebill<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Prebill>, ApiError> {
    let group_id = parse_aggregate_id(&id)?;
    Ok(Json(
        state.services.engine.prebill(BillRef::Group(group_id)).await?,
    ))
}

/// GET /branches/{restaurant}/{branch}/tables?state=..
#[tracing::instrument(skip(state))]
pub async fn branch_tables<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path((restaurant_id, branch_id)): Path<(i64, i64)>,
    Query(query): Query<FloorQuery>,
) -> Result<Json<Vec<TableSummary>>, ApiError> {
    state.catch_up().await?;
    let scope = TenantScope::new(restaurant_id, branch_id);
    let tables = match query.state {
        Some(table_state) => state.floor.tables_in_state(scope, table_state).await,
        None => state.floor.tables(scope).await,
    };
    Ok(Json(tables))
}

/// GET /branches/{restaurant}/{branch}/groups: open groups with their tables.
#[tracing::instrument(skip(state))]
pub async fn branch_groups<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path((restaurant_id, branch_id)): Path<(i64, i64)>,
) -> Result<Json<Vec<GroupSummary>>, ApiError> {
    state.catch_up().await?;
    let scope = TenantScope::new(restaurant_id, branch_id);
    Ok(Json(state.floor.open_groups(scope).await))
}

/// GET /branches/{restaurant}/{branch}/stats
#[tracing::instrument(skip(state))]
pub async fn branch_stats<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path((restaurant_id, branch_id)): Path<(i64, i64)>,
) -> Result<Json<TableStats>, ApiError> {
    state.catch_up().await?;
    let scope = TenantScope::new(restaurant_id, branch_id);
    Ok(Json(state.floor.stats(scope).await))
}

/// GET /history/tables/{id}?from=..&to=..
#[tracing::instrument(skip(state, filter))]
pub async fn history<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Query(filter): Query<HistoryFilter>,
) -> Result<Json<Vec<ClosedBill>>, ApiError> {
    let table_id = parse_aggregate_id(&id)?;
    state.catch_up().await?;
    Ok(Json(state.history.for_table(table_id, filter).await))
}

/// GET /history/bills/{order_id}
#[tracing::instrument(skip(state))]
pub async fn closed_bill<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<ClosedBill>, ApiError> {
    let order_id = parse_aggregate_id(&id)?;
    state.catch_up().await?;
    state
        .history
        .get_bill(order_id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no closed bill for order {order_id}")))
}

/// GET /history/revenue?from=..&to=..
#[tracing::instrument(skip(state, filter))]
pub async fn revenue<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(filter): Query<HistoryFilter>,
) -> Result<Json<RevenueResponse>, ApiError> {
    state.catch_up().await?;
    let (paid_bills, revenue) = state.history.revenue(filter).await;
    Ok(Json(RevenueResponse {
        paid_bills,
        revenue,
    }))
}
