//! API Routes
//!
//! Configures the Axum router with all admin endpoints.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    alerts_handler, delete_entry_handler, get_entry_handler, health_handler, invalidate_event_handler,
    invalidate_pattern_handler, invalidate_tag_handler, metrics_export_handler, metrics_handler,
    metrics_history_handler, put_entry_handler, recommendations_handler, resolve_alert_handler, stats_handler,
    trends_handler, ttl_handler, warming_handler,
};
use crate::engine::CacheEngine;

/// Creates the main router with all endpoints configured.
///
/// # Middleware
/// - CORS: Allows any origin (configurable for production)
/// - Tracing: Logs all requests
pub fn create_router(engine: CacheEngine) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(
            "/cache/:namespace/:key",
            get(get_entry_handler)
                .put(put_entry_handler)
                .delete(delete_entry_handler),
        )
        .route("/cache/:namespace/:key/ttl", get(ttl_handler))
        .route("/invalidate/tag/:tag", post(invalidate_tag_handler))
        .route("/invalidate/pattern", post(invalidate_pattern_handler))
        .route("/invalidate/event/:name", post(invalidate_event_handler))
        .route("/warming/:strategy", post(warming_handler))
        .route("/metrics", get(metrics_handler))
        .route("/metrics/history", get(metrics_history_handler))
        .route("/metrics/export", get(metrics_export_handler))
        .route("/alerts", get(alerts_handler))
        .route("/alerts/:id/resolve", post(resolve_alert_handler))
        .route("/trends", get(trends_handler))
        .route("/recommendations", get(recommendations_handler))
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}
