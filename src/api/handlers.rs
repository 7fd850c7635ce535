//! API Handlers
//!
//! HTTP request handlers for each cache server endpoint.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use regex::Regex;
use serde_json::Value;

use crate::cache::EntryMetadata;
use crate::error::{CacheError, Result};
use crate::manager::AdvancedCache;
use crate::models::{
    ClusterResponse, CounterResponse, DeleteResponse, ExpireRequest, ExpireResponse, GetResponse,
    HealthResponse, IncrementRequest, InvalidateRequest, InvalidateResponse, SetRequest,
    SetResponse, StatsResponse, TtlResponse,
};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<AdvancedCache<Value>>,
}

impl AppState {
    pub fn new(cache: AdvancedCache<Value>) -> Self {
        Self {
            cache: Arc::new(cache),
        }
    }
}

/// Handler for PUT /set
///
/// Stores a JSON value in the cache with optional TTL (ms) and tags.
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let metadata = (!req.tags.is_empty()).then(|| EntryMetadata {
        tags: req.tags,
        source: Some("http".to_string()),
        ..EntryMetadata::default()
    });
    state
        .cache
        .set_with_metadata(req.key.clone(), req.value, req.ttl, metadata)
        .await?;

    Ok(Json(SetResponse::new(req.key)))
}

/// Handler for GET /get/:key
///
/// A miss (absent, expired or undecodable) maps to 404.
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<GetResponse>> {
    match state.cache.get(&key).await? {
        Some(value) => Ok(Json(GetResponse::new(key, value))),
        None => Err(CacheError::NotFound(key)),
    }
}

/// Handler for DELETE /del/:key
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<DeleteResponse>> {
    let deleted = state.cache.delete(&key).await?;
    Ok(Json(DeleteResponse::new(key, deleted)))
}

/// Handler for POST /expire/:key
pub async fn expire_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(req): Json<ExpireRequest>,
) -> Result<Json<ExpireResponse>> {
    if req.ttl == 0 {
        return Err(CacheError::InvalidRequest("TTL must be positive".to_string()));
    }
    let updated = state.cache.expire(&key, req.ttl).await?;
    Ok(Json(ExpireResponse { key, updated }))
}

/// Handler for GET /ttl/:key
pub async fn ttl_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<TtlResponse>> {
    let ttl_ms = state.cache.ttl(&key).await?;
    Ok(Json(TtlResponse { key, ttl_ms }))
}

/// Handler for POST /incr/:key
pub async fn increment_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    body: Option<Json<IncrementRequest>>,
) -> Result<Json<CounterResponse>> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let value = state.cache.increment(&key, req.amount).await?;
    Ok(Json(CounterResponse { key, value }))
}

/// Handler for POST /invalidate
pub async fn invalidate_handler(
    State(state): State<AppState>,
    Json(req): Json<InvalidateRequest>,
) -> Result<Json<InvalidateResponse>> {
    let pattern = Regex::new(&req.pattern)
        .map_err(|e| CacheError::InvalidRequest(format!("Invalid pattern: {}", e)))?;
    let removed = state.cache.invalidate_pattern(&pattern).await?;
    Ok(Json(InvalidateResponse {
        pattern: req.pattern,
        removed,
    }))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Result<Json<StatsResponse>> {
    let stats = state.cache.stats().await?;
    Ok(Json(StatsResponse::from(stats)))
}

/// Handler for GET /cluster/nodes
pub async fn cluster_handler(State(state): State<AppState>) -> Json<ClusterResponse> {
    Json(ClusterResponse {
        node_id: state.cache.node_id().map(str::to_string),
        is_leader: state.cache.is_leader(),
        nodes: state.cache.cluster_nodes(),
    })
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
