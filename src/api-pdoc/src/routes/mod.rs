use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use core_pdoc::health_check;

use crate::state::AppState;

pub mod documents;
pub mod export;
pub mod generate;
pub mod logging_middleware;
pub mod logs;
pub mod upload;

//
// Router
//

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/upload", post(upload::post_upload))
        .route("/api/check_duplicate", post(upload::post_check_duplicate))
        .route("/api/generate", post(generate::post_generate))
        .route("/api/export", get(export::get_export).post(export::post_export))
        .route("/api/stats", get(export::get_stats))
        .route("/api/documents/{*path}", get(documents::get_document))
        .route("/api/logs", get(logs::get_logs).delete(logs::delete_logs))
        // Custom route access logging
        .layer(middleware::from_fn(logging_middleware::log_route_access))
        // Tracing middleware
        .layer(TraceLayer::new_for_http())
}
