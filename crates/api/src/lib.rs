//! HTTP API server with observability for the purchase settlement engine.
//!
//! Provides REST endpoints for purchases, coupon validation, transaction
//! history and credit balances, with structured logging (tracing) and
//! Prometheus metrics.

pub mod config;
pub mod error;
pub mod extract;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use settlement::{SettlementConfig, SettlementCoordinator};
use store::SettlementStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state accessible from all handlers.
pub struct AppState<S: SettlementStore> {
    pub coordinator: SettlementCoordinator<S, S, S, S>,
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: SettlementStore>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<S>))
        .route(
            "/products/{id}/purchase",
            post(routes::purchases::purchase::<S>),
        )
        .route("/coupons/validate", post(routes::coupons::validate::<S>))
        .route("/transactions", get(routes::transactions::list::<S>))
        .route("/transactions/{id}", get(routes::transactions::get::<S>))
        .route("/credits", get(routes::credits::balance::<S>))
        .route("/credits/charge", post(routes::credits::charge::<S>))
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

/// Creates the application state around a store handle.
pub fn create_default_state<S: SettlementStore>(
    store: S,
    config: SettlementConfig,
) -> Arc<AppState<S>> {
    Arc::new(AppState {
        coordinator: SettlementCoordinator::from_store(store, config),
    })
}
