//! HTTP API server for the order and product services.
//!
//! Serves the product authority (`/product/*`), the order authority
//! (`/ordering/*`) and order push subscriptions (`/sse/*`) from one process,
//! with structured logging (tracing) and Prometheus metrics.

pub mod catalog_client;
pub mod config;
pub mod error;
pub mod extract;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::{AppState, create_default_state, create_state};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/product/detail/{id}", get(routes::products::detail))
        .route("/product/updatestock", put(routes::products::update_stock))
        .route("/ordering/create", post(routes::ordering::create))
        .route("/ordering/list", get(routes::ordering::list))
        .route("/ordering/myorders", get(routes::ordering::my_orders))
        .route("/sse/connect", get(routes::sse::connect))
        .route("/sse/unsubscribe", get(routes::sse::unsubscribe))
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
