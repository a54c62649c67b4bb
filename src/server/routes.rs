//! Route definitions for the API server

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers;
use super::state::AppState;
use crate::source::TableSource;

/// Creates the main application router with all routes and middleware
pub fn create_router<S: TableSource + 'static>(state: Arc<AppState<S>>) -> Router {
    // The presentation layer is served from another origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // View catalogue and render cycles
        .route("/views", get(handlers::list_views::<S>))
        .route("/views/:view/render", post(handlers::render_view::<S>))
        .route("/views/:view/export", post(handlers::export_view::<S>))
        // Raw tables and variant overview
        .route("/tables/:table", get(handlers::get_table::<S>))
        .route("/variants", get(handlers::list_variants::<S>))
        // Stateless diagram construction
        .route("/diagram", get(handlers::get_diagram))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
