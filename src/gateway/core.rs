//! # Gateway Core
//!
//! Composition root of the traffic-shaping core. A read for a cacheable entity flows
//!
//! ```text
//! cache lookup -> single-flight join -> admission -> retry(attempt with timeout) -> cache store
//! ```
//!
//! and every caller that joined the same in-flight call receives the same payload or
//! error. Entities whose cache policy is disabled skip the cache and single-flight and
//! go straight to the upstream. Writes are admitted and retried like reads, and a
//! successful write invalidates every cached read of its entity. A read that was
//! already in flight when the write landed is served to its callers but not cached.
//!
//! The default list-all read of an entity pages through the whole collection within the
//! warm-up bounds, so a cold read and a warmed entry hold the same payload.

use crate::caching::cache_manager::{CacheManager, CacheStats};
use crate::caching::deduplication::{InFlightRegistry, InFlightStats};
use crate::caching::key_generator::CacheKey;
use crate::caching::warmer::{CacheWarmer, WarmUpReport};
use crate::core::config::GatewayConfig;
use crate::core::error::GatewayResult;
use crate::core::error_recovery::RetryExecutor;
use crate::core::types::{
    params, split_entity_path, EntityRequest, Payload, RecordQuery, RequestOptions,
    UpstreamRequest,
};
use crate::traffic::admission::{AdmissionController, AdmissionStats};
use crate::upstream::{HttpUpstreamClient, UpstreamClient, UpstreamDispatcher};
use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Aggregated runtime statistics
#[derive(Debug, Clone, Serialize)]
pub struct GatewayStats {
    pub cache: CacheStats,
    pub admission: AdmissionStats,
    pub in_flight: InFlightStats,
    pub last_warmup: Option<WarmUpReport>,
}

/// Loads one payload from the upstream; the flag says whether to take an admission slot
type Loader = Box<dyn FnOnce(bool) -> BoxFuture<'static, GatewayResult<Value>> + Send>;

/// CRM gateway core
pub struct Gateway {
    config: GatewayConfig,
    cache: Arc<CacheManager>,
    in_flight: Arc<InFlightRegistry<GatewayResult<Payload>>>,
    dispatcher: Arc<UpstreamDispatcher>,
    warmer: Arc<CacheWarmer>,
}

impl Gateway {
    /// Build a gateway talking HTTP to the configured upstream
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: GatewayConfig) -> GatewayResult<Self> {
        config.validate()?;
        let client = HttpUpstreamClient::new(&config.upstream)?;
        Ok(Self::from_parts(config, Arc::new(client)))
    }

    /// Build a gateway around an arbitrary upstream client
    ///
    /// Must be called from within a Tokio runtime.
    pub fn from_parts(config: GatewayConfig, client: Arc<dyn UpstreamClient>) -> Self {
        let admission = Arc::new(AdmissionController::new(&config.admission));
        let dispatcher = Arc::new(UpstreamDispatcher::new(
            client,
            admission,
            RetryExecutor::new(config.retry.clone()),
            config.upstream.timeout,
        ));
        let cache = Arc::new(CacheManager::new(config.cache.clone()));
        let in_flight = Arc::new(InFlightRegistry::new(config.cache.deduplicate));
        let warmer = Arc::new(CacheWarmer::new(
            config.warmup.clone(),
            Arc::clone(&cache),
            Arc::clone(&dispatcher),
        ));

        info!(
            "Gateway ready: {} requests per {:?}, {} attempts per call, {:?} timeout",
            config.admission.max_requests,
            config.admission.window,
            config.retry.max_attempts,
            config.upstream.timeout
        );

        Self {
            config,
            cache,
            in_flight,
            dispatcher,
            warmer,
        }
    }

    /// Perform a request against the upstream
    ///
    /// `path` is relative to the API prefix, e.g. `/Product` or `/Product/{id}`.
    pub async fn perform_request(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> GatewayResult<Payload> {
        let request = UpstreamRequest::from_options(path, options);

        if !request.is_read() {
            return self.write(request).await;
        }

        let key = CacheKey::for_request(&request)?;
        let loader = self.loader_for(&key, request);
        self.read_through(key, loader).await
    }

    /// Perform a typed read
    pub async fn fetch(&self, request: EntityRequest) -> GatewayResult<Payload> {
        let key = CacheKey::for_entity_request(&request);

        let loader = match &request.query {
            RecordQuery::UniqueValues { field } => {
                self.unique_values_loader(request.entity.clone(), field.clone())
            }
            _ => self.loader_for(&key, request.to_upstream()),
        };

        self.read_through(key, loader).await
    }

    pub async fn get_by_id(&self, entity: &str, id: &str) -> GatewayResult<Payload> {
        self.fetch(EntityRequest::by_id(entity, id)).await
    }

    pub async fn list_all(&self, entity: &str) -> GatewayResult<Payload> {
        self.fetch(EntityRequest::list_all(entity)).await
    }

    pub async fn unique_values(&self, entity: &str, field: &str) -> GatewayResult<Payload> {
        self.fetch(EntityRequest::unique_values(entity, field)).await
    }

    async fn read_through(&self, key: CacheKey, load: Loader) -> GatewayResult<Payload> {
        if let Some(hit) = self.cache.get(&key).await {
            return Ok(hit);
        }

        if !self.cache.is_cacheable(key.entity()) {
            debug!("Caching disabled for {}, fetching live", key.entity());
            return load(self.config.admission.limit_uncached).await.map(Arc::new);
        }

        let cache = Arc::clone(&self.cache);
        let flight_key = key.as_str().to_string();

        self.in_flight
            .join(&flight_key, move || {
                let generation = cache.generation(key.entity());
                async move {
                    let payload: Payload = Arc::new(load(true).await?);
                    cache
                        .set_if_current(&key, Arc::clone(&payload), None, generation)
                        .await;
                    Ok(payload)
                }
            })
            .await
    }

    fn loader_for(&self, key: &CacheKey, request: UpstreamRequest) -> Loader {
        if *key == CacheKey::list_all(key.entity()) {
            self.collection_loader(key.entity().to_string())
        } else {
            self.request_loader(request)
        }
    }

    fn request_loader(&self, request: UpstreamRequest) -> Loader {
        let dispatcher = Arc::clone(&self.dispatcher);
        Box::new(move |admit| {
            async move { dispatcher.dispatch(&request, admit).await }.boxed()
        })
    }

    /// Same paging and payload shape as the warmer
    fn collection_loader(&self, entity: String) -> Loader {
        let dispatcher = Arc::clone(&self.dispatcher);
        let page_size = self.config.warmup.page_size;
        let max_records = self.config.warmup.max_records;

        Box::new(move |admit| {
            async move {
                let paged = dispatcher
                    .fetch_all_pages(&UpstreamRequest::get(entity), page_size, max_records, admit)
                    .await?;
                Ok(paged.into_collection())
            }
            .boxed()
        })
    }

    fn unique_values_loader(&self, entity: String, field: String) -> Loader {
        let dispatcher = Arc::clone(&self.dispatcher);
        let page_size = self.config.warmup.page_size;
        let max_records = self.config.warmup.max_records;

        Box::new(move |admit| {
            async move {
                let request = UpstreamRequest::get(entity.as_str())
                    .with_query(params::SELECT, field.as_str());
                let paged = dispatcher
                    .fetch_all_pages(&request, page_size, max_records, admit)
                    .await?;

                Ok(json!({
                    "field": field,
                    "values": distinct_values(&paged.records, &field),
                }))
            }
            .boxed()
        })
    }

    async fn write(&self, request: UpstreamRequest) -> GatewayResult<Payload> {
        let entity = split_entity_path(&request.path)?.0.to_string();

        let value = self.dispatcher.dispatch(&request, true).await?;

        let removed = self.cache.delete_by_entity(&entity).await;
        debug!("{} succeeded, invalidated {} cached reads", request, removed);

        Ok(Arc::new(value))
    }

    /// Warm the entities listed in the configuration
    pub async fn warm_up_configured(&self) -> WarmUpReport {
        self.warmer.warm_up(&self.config.warmup.entities).await
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    pub fn warmer(&self) -> &Arc<CacheWarmer> {
        &self.warmer
    }

    pub fn admission(&self) -> &Arc<AdmissionController> {
        self.dispatcher.admission()
    }

    pub fn in_flight(&self) -> &Arc<InFlightRegistry<GatewayResult<Payload>>> {
        &self.in_flight
    }

    pub fn dispatcher(&self) -> &Arc<UpstreamDispatcher> {
        &self.dispatcher
    }

    pub async fn stats(&self) -> GatewayStats {
        GatewayStats {
            cache: self.cache.stats().await,
            admission: self.admission().stats(),
            in_flight: self.in_flight.stats(),
            last_warmup: self.warmer.last_report(),
        }
    }
}

/// Distinct non-null values of `field`, in first-seen order
fn distinct_values(records: &[Value], field: &str) -> Vec<Value> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter_map(|record| record.get(field))
        .filter(|value| !value.is_null())
        .filter(|value| seen.insert(value.to_string()))
        .cloned()
        .collect()
}
