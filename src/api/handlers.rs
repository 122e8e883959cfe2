//! API Handlers
//!
//! HTTP request handlers for the admin endpoints. Every handler works on the
//! shared `CacheEngine`.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;

use crate::engine::CacheEngine;
use crate::error::{CacheError, Result};
use crate::invalidation::TriggerReport;
use crate::models::{
    AlertsQuery, EntryActionResponse, EntryResponse, ExportQuery, InvalidationResponse, PatternRequest,
    ResolveResponse, SetEntryRequest, StatsResponse, TtlResponse, WindowQuery,
};
use crate::monitoring::{Alert, ExportFormat, HealthState, MetricSample, Recommendation, Trend};
use crate::warming::{Strategy, WarmupReport};

/// Window used when a query omits `hours`.
const DEFAULT_WINDOW_HOURS: u64 = 1;
const MAX_LISTED_ALERTS: usize = 500;

// == Cache entries ==
/// Handler for PUT /cache/:namespace/:key
pub async fn put_entry_handler(
    State(engine): State<CacheEngine>,
    Path((namespace, key)): Path<(String, String)>,
    Json(req): Json<SetEntryRequest>,
) -> Result<Json<EntryActionResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::Validation(error_msg));
    }
    let size = serde_json::to_vec(&req.value)?.len();
    let max = engine.cache.settings().max_value_size;
    if size > max {
        return Err(CacheError::Validation(format!(
            "Value of {size} bytes exceeds maximum of {max} bytes"
        )));
    }

    if !engine
        .cache
        .set(&namespace, &key, &req.value, req.ttl, &req.tags)
        .await
    {
        return Err(CacheError::Internal(format!("Failed to store '{namespace}:{key}'")));
    }
    Ok(Json(EntryActionResponse::stored(namespace, key)))
}

/// Handler for GET /cache/:namespace/:key
///
/// Reads the full envelope. Admin reads do not count towards hit/miss
/// statistics.
pub async fn get_entry_handler(
    State(engine): State<CacheEngine>,
    Path((namespace, key)): Path<(String, String)>,
) -> Result<Json<EntryResponse>> {
    engine
        .cache
        .get_entry(&namespace, &key)
        .await
        .map(|entry| Json(entry.into()))
        .ok_or_else(|| CacheError::NotFound(format!("{namespace}:{key}")))
}

/// Handler for DELETE /cache/:namespace/:key
pub async fn delete_entry_handler(
    State(engine): State<CacheEngine>,
    Path((namespace, key)): Path<(String, String)>,
) -> Result<Json<EntryActionResponse>> {
    if !engine.cache.delete(&namespace, &key).await {
        return Err(CacheError::NotFound(format!("{namespace}:{key}")));
    }
    Ok(Json(EntryActionResponse::deleted(namespace, key)))
}

/// Handler for GET /cache/:namespace/:key/ttl
pub async fn ttl_handler(
    State(engine): State<CacheEngine>,
    Path((namespace, key)): Path<(String, String)>,
) -> Result<Json<TtlResponse>> {
    let ttl = engine.cache.ttl(&namespace, &key).await;
    if ttl < 0 && !engine.cache.exists(&namespace, &key).await {
        return Err(CacheError::NotFound(format!("{namespace}:{key}")));
    }
    Ok(Json(TtlResponse { namespace, key, ttl }))
}

// == Invalidation ==
/// Handler for POST /invalidate/tag/:tag
pub async fn invalidate_tag_handler(
    State(engine): State<CacheEngine>,
    Path(tag): Path<String>,
) -> Json<InvalidationResponse> {
    let removed = engine.cache.invalidate_by_tag(&tag).await;
    Json(InvalidationResponse {
        target: format!("tag:{tag}"),
        removed,
    })
}

/// Handler for POST /invalidate/pattern
pub async fn invalidate_pattern_handler(
    State(engine): State<CacheEngine>,
    Json(req): Json<PatternRequest>,
) -> Result<Json<InvalidationResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::Validation(error_msg));
    }
    let removed = engine.cache.invalidate_by_pattern(&req.pattern).await;
    Ok(Json(InvalidationResponse {
        target: format!("pattern:{}", req.pattern),
        removed,
    }))
}

/// Handler for POST /invalidate/event/:name
///
/// The optional JSON body is the event payload rules are matched against.
pub async fn invalidate_event_handler(
    State(engine): State<CacheEngine>,
    Path(name): Path<String>,
    payload: Option<Json<Value>>,
) -> Json<TriggerReport> {
    let payload = payload.map(|Json(v)| v).unwrap_or(Value::Null);
    Json(engine.invalidation.invalidate_by_event(&name, &payload).await)
}

// == Warming ==
/// Handler for POST /warming/:strategy
pub async fn warming_handler(
    State(engine): State<CacheEngine>,
    Path(strategy): Path<String>,
) -> Result<Json<WarmupReport>> {
    let strategy: Strategy = strategy.parse()?;
    Ok(Json(engine.warming.execute_strategy(strategy).await))
}

// == Monitoring ==
/// Handler for GET /metrics
pub async fn metrics_handler(State(engine): State<CacheEngine>) -> Json<MetricSample> {
    Json(engine.monitor.get_current_metrics().await)
}

/// Handler for GET /metrics/history
pub async fn metrics_history_handler(
    State(engine): State<CacheEngine>,
    Query(query): Query<WindowQuery>,
) -> Json<Vec<MetricSample>> {
    let hours = query.hours.unwrap_or(DEFAULT_WINDOW_HOURS);
    Json(engine.monitor.get_metrics_history(hours))
}

/// Handler for GET /metrics/export
pub async fn metrics_export_handler(
    State(engine): State<CacheEngine>,
    Query(query): Query<ExportQuery>,
) -> Result<Response> {
    let format = match query.format.as_deref() {
        Some(name) => name.parse()?,
        None => ExportFormat::Json,
    };
    let body = engine.monitor.export_metrics(
        query.from.unwrap_or(0),
        query.to.unwrap_or(u64::MAX),
        format,
    )?;
    Ok(([(header::CONTENT_TYPE, format.content_type())], body).into_response())
}

/// Handler for GET /alerts
pub async fn alerts_handler(
    State(engine): State<CacheEngine>,
    Query(query): Query<AlertsQuery>,
) -> Json<Vec<Alert>> {
    if query.all {
        Json(engine.monitor.alerts(MAX_LISTED_ALERTS))
    } else {
        Json(engine.monitor.get_active_alerts())
    }
}

/// Handler for POST /alerts/:id/resolve
pub async fn resolve_alert_handler(
    State(engine): State<CacheEngine>,
    Path(id): Path<String>,
) -> Result<Json<ResolveResponse>> {
    if !engine.monitor.resolve_alert(&id) {
        return Err(CacheError::NotFound(format!("active alert {id}")));
    }
    Ok(Json(ResolveResponse { id, resolved: true }))
}

/// Handler for GET /trends
pub async fn trends_handler(
    State(engine): State<CacheEngine>,
    Query(query): Query<WindowQuery>,
) -> Json<Vec<Trend>> {
    Json(engine.monitor.get_trends(query.hours.unwrap_or(DEFAULT_WINDOW_HOURS)))
}

/// Handler for GET /recommendations
pub async fn recommendations_handler(State(engine): State<CacheEngine>) -> Json<Vec<Recommendation>> {
    Json(engine.monitor.recommendations())
}

/// Handler for GET /stats
pub async fn stats_handler(State(engine): State<CacheEngine>) -> Json<StatsResponse> {
    Json(StatsResponse {
        cache: engine.cache.stats(),
        invalidation: engine.invalidation.stats(),
        warming: engine.warming.stats(),
        store: engine.store.info().await.ok(),
    })
}

/// Handler for GET /health
///
/// 503 when the store is unreachable, 200 otherwise.
pub async fn health_handler(State(engine): State<CacheEngine>) -> Response {
    let report = engine.monitor.health().await;
    let status = match report.status {
        HealthState::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        HealthState::Healthy | HealthState::Degraded => StatusCode::OK,
    };
    (status, Json(report)).into_response()
}
