//! HTTP server for the restaurant point of sale.
//!
//! Waiter terminals submit items and close bills, kitchen displays follow
//! open orders, and operations run reconciliation and expiry passes. Requests
//! are traced with `tower_http` and metrics are exposed for Prometheus.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use event_store::EventStore;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::{AppState, create_default_state, create_state};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: EventStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        // Waiter terminal
        .route("/submit-items", post(routes::waiter::submit_items::<S>))
        .route("/open-group", post(routes::waiter::open_group::<S>))
        .route("/close-group", post(routes::waiter::close_group::<S>))
        .route("/mark-deferred", post(routes::waiter::mark_deferred::<S>))
        .route("/resolve-deferred", post(routes::waiter::resolve_deferred::<S>))
        .route("/request-checkout", post(routes::waiter::request_checkout::<S>))
        .route("/settle-bill", post(routes::waiter::settle_bill::<S>))
        // Registry and floor
        .route("/tables", post(routes::tables::register::<S>))
        .route("/tables/{id}", get(routes::tables::get::<S>))
        .route(
            "/tables/{id}/availability",
            post(routes::tables::set_availability::<S>),
        )
        .route("/tables/{id}/prebill", get(routes::tables::table_prebill::<S>))
        .route("/groups/{id}", get(routes::tables::get_group::<S>))
        .route("/groups/{id}/prebill", get(routes::tables::group_prebill::<S>))
        .route(
            "/branches/{restaurant}/{branch}/tables",
            get(routes::tables::branch_tables::<S>),
        )
        .route(
            "/branches/{restaurant}/{branch}/groups",
            get(routes::tables::branch_groups::<S>),
        )
        .route(
            "/branches/{restaurant}/{branch}/stats",
            get(routes::tables::branch_stats::<S>),
        )
        .route("/history/tables/{id}", get(routes::tables::history::<S>))
        .route("/history/bills/{id}", get(routes::tables::closed_bill::<S>))
        .route("/history/revenue", get(routes::tables::revenue::<S>))
        // Kitchen
        .route("/kitchen/orders", get(routes::kitchen::orders::<S>))
        .route("/orders/{id}", get(routes::kitchen::get_order::<S>))
        .route("/orders/{id}/status", post(routes::kitchen::advance::<S>))
        // Operations
        .route("/reconciliation", get(routes::ops::reconcile::<S>))
        .route("/deferred", get(routes::ops::outstanding::<S>))
        .route("/deferred/expire", post(routes::ops::expire::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
