//! # Cache Admin Interface
//!
//! Admin endpoints for cache inspection, invalidation and warm-up.
//!
//! | Route | Effect |
//! |---|---|
//! | `GET /cache/stats` | cache statistics, health and policy lists |
//! | `GET /cache/keys` | fresh keys, optionally `?entity=` filtered |
//! | `DELETE /cache/keys/:key` | drop one key |
//! | `DELETE /cache/entities/:entity` | drop every key of an entity |
//! | `POST /cache/flush` | drop everything |
//! | `GET /cache/warmup` | last warm-up report |
//! | `POST /cache/warmup` | run a warm-up now |
//! | `GET /gateway/stats` | aggregated gateway statistics |
//!
//! Deletions are idempotent and never reach the upstream.

use super::cache_manager::CacheStats;
use super::key_generator::CacheKey;
use super::policy::PolicySnapshot;
use super::warmer::WarmUpReport;
use crate::core::error::GatewayError;
use crate::gateway::{Gateway, GatewayStats};
use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{delete, get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Cache admin state
#[derive(Clone)]
pub struct CacheAdminState {
    pub gateway: Arc<Gateway>,
}

impl CacheAdminState {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }
}

/// Cache admin router
pub struct CacheAdminRouter;

impl CacheAdminRouter {
    /// Create cache admin router
    pub fn create_router(state: CacheAdminState) -> Router {
        Router::new()
            .route("/cache/stats", get(get_cache_stats))
            .route("/cache/keys", get(list_cache_keys))
            .route("/cache/keys/:key", delete(delete_cache_key))
            .route("/cache/entities/:entity", delete(invalidate_entity))
            .route("/cache/flush", post(flush_cache))
            .route("/cache/warmup", get(get_warmup_status).post(trigger_warmup))
            .route("/gateway/stats", get(get_gateway_stats))
            .with_state(state)
    }
}

/// Cache statistics response
#[derive(Debug, Serialize)]
pub struct CacheStatsResponse {
    pub stats: CacheStats,
    pub healthy: bool,
    pub policy: PolicySnapshot,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CacheKeysQuery {
    pub entity: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CacheKeysResponse {
    pub count: usize,
    pub keys: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Cache invalidation response
#[derive(Debug, Serialize)]
pub struct CacheInvalidationResponse {
    pub success: bool,
    pub message: String,
    pub invalidated_count: usize,
    pub timestamp: DateTime<Utc>,
}

impl CacheInvalidationResponse {
    fn new(message: String, invalidated_count: usize) -> Self {
        Self {
            success: true,
            message,
            invalidated_count,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WarmupStatusResponse {
    pub enabled: bool,
    pub entities: Vec<String>,
    pub last_report: Option<WarmUpReport>,
}

/// Optional body of `POST /cache/warmup`; defaults to the configured entities
#[derive(Debug, Default, Deserialize)]
pub struct WarmupRequest {
    pub entities: Option<Vec<String>>,
}

/// Get cache statistics
pub async fn get_cache_stats(
    State(state): State<CacheAdminState>,
) -> Result<Json<CacheStatsResponse>, GatewayError> {
    let cache = state.gateway.cache();
    let stats = cache.stats().await;

    info!(
        "Cache stats requested - entries: {}, hit_ratio: {:.2}%",
        stats.count,
        stats.hit_ratio * 100.0
    );

    Ok(Json(CacheStatsResponse {
        stats,
        healthy: cache.health_check().await,
        policy: cache.policy().snapshot(),
        timestamp: Utc::now(),
    }))
}

/// List fresh cache keys
pub async fn list_cache_keys(
    State(state): State<CacheAdminState>,
    Query(query): Query<CacheKeysQuery>,
) -> Result<Json<CacheKeysResponse>, GatewayError> {
    let mut keys = state.gateway.cache().keys().await;

    if let Some(entity) = &query.entity {
        keys.retain(|key| CacheKey::entity_of(key) == Some(entity.as_str()));
    }

    Ok(Json(CacheKeysResponse {
        count: keys.len(),
        keys,
        timestamp: Utc::now(),
    }))
}

/// Delete one cache key
pub async fn delete_cache_key(
    State(state): State<CacheAdminState>,
    Path(key): Path<String>,
) -> Result<Json<CacheInvalidationResponse>, GatewayError> {
    let deleted = state.gateway.cache().delete(&key).await;
    info!("Cache key {} deleted via admin API (existed: {})", key, deleted);

    Ok(Json(CacheInvalidationResponse::new(
        format!("Cache key {} deleted", key),
        usize::from(deleted),
    )))
}

/// Delete every cached read of one entity
pub async fn invalidate_entity(
    State(state): State<CacheAdminState>,
    Path(entity): Path<String>,
) -> Result<Json<CacheInvalidationResponse>, GatewayError> {
    if entity.trim().is_empty() {
        return Err(GatewayError::invalid_request("entity name must not be empty"));
    }

    let removed = state.gateway.cache().delete_by_entity(&entity).await;

    Ok(Json(CacheInvalidationResponse::new(
        format!("Cache invalidated for entity {}", entity),
        removed,
    )))
}

/// Clear all cache entries
pub async fn flush_cache(
    State(state): State<CacheAdminState>,
) -> Result<Json<CacheInvalidationResponse>, GatewayError> {
    let removed = state.gateway.cache().flush_all().await;
    info!("Cache flushed via admin API");

    Ok(Json(CacheInvalidationResponse::new(
        "Cache flushed".to_string(),
        removed,
    )))
}

pub async fn get_warmup_status(
    State(state): State<CacheAdminState>,
) -> Result<Json<WarmupStatusResponse>, GatewayError> {
    let warmer = state.gateway.warmer();

    Ok(Json(WarmupStatusResponse {
        enabled: warmer.config().enabled,
        entities: warmer.config().entities.clone(),
        last_report: warmer.last_report(),
    }))
}

/// Run a warm-up and return its report
pub async fn trigger_warmup(
    State(state): State<CacheAdminState>,
    request: Option<Json<WarmupRequest>>,
) -> Result<Json<WarmUpReport>, GatewayError> {
    let warmer = state.gateway.warmer();
    let entities = request
        .and_then(|Json(request)| request.entities)
        .unwrap_or_else(|| warmer.config().entities.clone());

    info!("Cache warm-up triggered via admin API for {:?}", entities);
    Ok(Json(warmer.warm_up(&entities).await))
}

pub async fn get_gateway_stats(
    State(state): State<CacheAdminState>,
) -> Result<Json<GatewayStats>, GatewayError> {
    Ok(Json(state.gateway.stats().await))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::GatewayConfig;
    use crate::core::error::GatewayResult;
    use crate::core::types::{Payload, UpstreamRequest};
    use crate::upstream::UpstreamClient;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    struct CountingCrm(AtomicUsize);

    #[async_trait]
    impl UpstreamClient for CountingCrm {
        async fn execute(&self, _request: &UpstreamRequest) -> GatewayResult<Value> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"list": [{"id": "1"}], "total": 1}))
        }
    }

    async fn seeded() -> (Router, Arc<Gateway>, Arc<CountingCrm>) {
        let mut config = GatewayConfig::default();
        config.upstream.base_url = Some(url::Url::parse("http://crm.test").unwrap());
        config.warmup.entities = vec!["Account".to_string()];

        let crm = Arc::new(CountingCrm(AtomicUsize::new(0)));
        let gateway = Arc::new(Gateway::from_parts(config, crm.clone()));

        let payload: Payload = Arc::new(json!({}));
        let cache = gateway.cache();
        cache.set(&CacheKey::list_all("Product"), payload.clone(), None).await;
        cache.set(&CacheKey::by_id("Product", "1"), payload.clone(), None).await;
        cache.set(&CacheKey::list_all("Account"), payload, None).await;

        let router = CacheAdminRouter::create_router(CacheAdminState::new(Arc::clone(&gateway)));
        (router, gateway, crm)
    }

    async fn call(router: &Router, method: Method, uri: &str) -> (StatusCode, Value) {
        let response = router
            .clone()
            .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_stats_and_keys() {
        let (router, _, _) = seeded().await;

        let (status, body) = call(&router, Method::GET, "/cache/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["stats"]["count"], 3);
        assert_eq!(body["healthy"], true);

        let (_, body) = call(&router, Method::GET, "/cache/keys?entity=Product").await;
        assert_eq!(body["count"], 2);
        assert_eq!(body["keys"], json!(["Product:id:1", "Product:list"]));
    }

    #[tokio::test]
    async fn test_deletions_are_idempotent_and_offline() {
        let (router, gateway, crm) = seeded().await;

        let (status, body) = call(&router, Method::DELETE, "/cache/keys/Product:id:1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["invalidated_count"], 1);
        let (_, body) = call(&router, Method::DELETE, "/cache/keys/Product:id:1").await;
        assert_eq!(body["invalidated_count"], 0);

        let (_, body) = call(&router, Method::DELETE, "/cache/entities/Product").await;
        assert_eq!(body["invalidated_count"], 1);
        let (_, body) = call(&router, Method::DELETE, "/cache/entities/Product").await;
        assert_eq!(body["invalidated_count"], 0);

        let (_, body) = call(&router, Method::POST, "/cache/flush").await;
        assert_eq!(body["invalidated_count"], 1);
        assert!(gateway.cache().keys().await.is_empty());

        assert_eq!(crm.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_warmup_trigger_and_status() {
        let (router, _, crm) = seeded().await;

        let (_, body) = call(&router, Method::GET, "/cache/warmup").await;
        assert_eq!(body["last_report"], Value::Null);

        let (status, body) = call(&router, Method::POST, "/cache/warmup").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["entities"][0]["entity"], "Account");
        assert_eq!(body["entities"][0]["status"], "warmed");
        assert_eq!(crm.0.load(Ordering::SeqCst), 1);

        let (_, body) = call(&router, Method::GET, "/cache/warmup").await;
        assert_eq!(body["last_report"]["entities"][0]["records"], 1);

        let (_, body) = call(&router, Method::GET, "/gateway/stats").await;
        assert_eq!(body["admission"]["admitted"], 1);
    }
}
