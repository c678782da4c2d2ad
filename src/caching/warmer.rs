//! # Cache Warm-up
//!
//! Preloads whole entity collections so the first reads after start (or after a
//! refresh) are served from the cache. Each entity is fetched page by page through the
//! dispatcher, stored as its default list-all payload, and every record carrying an
//! `id` is stored under its by-id key as well.
//!
//! One failing entity never aborts the run; its error is recorded in the report and the
//! remaining entities are still warmed.

use super::cache_manager::CacheManager;
use super::key_generator::CacheKey;
use crate::core::error::GatewayError;
use crate::core::types::UpstreamRequest;
use crate::observability::metrics;
use crate::upstream::UpstreamDispatcher;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Warm-up configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WarmupConfig {
    /// Run a warm-up at start and keep refreshing
    pub enabled: bool,

    /// Entities to preload
    pub entities: Vec<String>,

    /// Records requested per page
    pub page_size: u32,

    /// Stop paging an entity once this many records are loaded
    pub max_records: usize,

    #[serde(with = "humantime_serde")]
    pub refresh_interval: Duration,
}

impl Default for WarmupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            entities: Vec::new(),
            page_size: 200,
            max_records: 5000,
            refresh_interval: Duration::from_secs(6 * 60 * 60),
        }
    }
}

/// Result of warming one entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WarmUpOutcome {
    Warmed {
        records: usize,
        pages: u32,
        elapsed_ms: u64,
    },
    Failed {
        error_type: String,
        error: String,
    },
    Skipped {
        reason: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityWarmUp {
    pub entity: String,
    #[serde(flatten)]
    pub outcome: WarmUpOutcome,
}

/// Per-entity results of one warm-up run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WarmUpReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub entities: Vec<EntityWarmUp>,
}

impl WarmUpReport {
    pub fn outcome(&self, entity: &str) -> Option<&WarmUpOutcome> {
        self.entities
            .iter()
            .find(|e| e.entity == entity)
            .map(|e| &e.outcome)
    }

    pub fn warmed(&self) -> impl Iterator<Item = &str> {
        self.entities
            .iter()
            .filter(|e| matches!(e.outcome, WarmUpOutcome::Warmed { .. }))
            .map(|e| e.entity.as_str())
    }

    pub fn failed(&self) -> impl Iterator<Item = &str> {
        self.entities
            .iter()
            .filter(|e| matches!(e.outcome, WarmUpOutcome::Failed { .. }))
            .map(|e| e.entity.as_str())
    }

    pub fn total_records(&self) -> usize {
        self.entities
            .iter()
            .map(|e| match e.outcome {
                WarmUpOutcome::Warmed { records, .. } => records,
                _ => 0,
            })
            .sum()
    }
}

/// Preloads entity collections into the cache
pub struct CacheWarmer {
    config: WarmupConfig,
    cache: Arc<CacheManager>,
    dispatcher: Arc<UpstreamDispatcher>,
    last_report: RwLock<Option<WarmUpReport>>,
}

impl CacheWarmer {
    pub fn new(
        config: WarmupConfig,
        cache: Arc<CacheManager>,
        dispatcher: Arc<UpstreamDispatcher>,
    ) -> Self {
        Self {
            config,
            cache,
            dispatcher,
            last_report: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &WarmupConfig {
        &self.config
    }

    /// Report of the most recent completed run
    pub fn last_report(&self) -> Option<WarmUpReport> {
        self.last_report.read().clone()
    }

    /// Warm every entity, isolating failures per entity
    pub async fn warm_up(&self, entities: &[String]) -> WarmUpReport {
        let started_at = Utc::now();
        info!("Starting cache warm-up for {} entities", entities.len());

        let mut results = Vec::with_capacity(entities.len());
        for entity in entities {
            let outcome = if !self.cache.is_cacheable(entity) {
                WarmUpOutcome::Skipped {
                    reason: "caching disabled for entity".to_string(),
                }
            } else {
                match self.warm_entity(entity).await {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        warn!("Cache warm-up failed for {}: {}", entity, err);
                        WarmUpOutcome::Failed {
                            error_type: err.error_type().to_string(),
                            error: err.to_string(),
                        }
                    }
                }
            };

            results.push(EntityWarmUp {
                entity: entity.clone(),
                outcome,
            });
        }

        let report = WarmUpReport {
            started_at,
            finished_at: Utc::now(),
            entities: results,
        };

        info!(
            "Cache warm-up finished: {} records, {} entities failed",
            report.total_records(),
            report.failed().count()
        );

        *self.last_report.write() = Some(report.clone());
        report
    }

    async fn warm_entity(&self, entity: &str) -> Result<WarmUpOutcome, GatewayError> {
        let started = Instant::now();
        let generation = self.cache.generation(entity);

        let paged = self
            .dispatcher
            .fetch_all_pages(
                &UpstreamRequest::get(entity),
                self.config.page_size,
                self.config.max_records,
                true,
            )
            .await?;

        let records = paged.records.len();
        let pages = paged.pages;

        for record in &paged.records {
            if let Some(id) = record_id(record) {
                let key = CacheKey::by_id(entity, &id);
                self.cache
                    .set_if_current(&key, Arc::new(record.clone()), None, generation)
                    .await;
            }
        }

        let collection = Arc::new(paged.into_collection());
        self.cache
            .set_if_current(&CacheKey::list_all(entity), collection, None, generation)
            .await;

        metrics::record_warmup_records(entity, records);
        info!("Warmed {} with {} records in {} pages", entity, records, pages);

        Ok(WarmUpOutcome::Warmed {
            records,
            pages,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Re-run [`warm_up`](Self::warm_up) every `interval` until `shutdown` fires
    ///
    /// The first run happens one interval after the call.
    pub fn schedule_refresh(
        self: &Arc<Self>,
        entities: Vec<String>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let warmer = Arc::clone(self);
        let period = interval.max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = warmer.warm_up(&entities) => {}
                }
            }

            info!("Cache refresh stopped");
        })
    }
}

fn record_id(record: &Value) -> Option<String> {
    match record.get("id")? {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caching::cache_manager::CacheConfig;
    use crate::core::error::GatewayResult;
    use crate::core::error_recovery::{RetryConfig, RetryExecutor};
    use crate::traffic::admission::{AdmissionConfig, AdmissionController};
    use crate::upstream::UpstreamClient;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves `Account` from a fixed record set and fails `Broken` with a 500
    struct FakeCrm {
        accounts: Vec<Value>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl UpstreamClient for FakeCrm {
        async fn execute(&self, request: &UpstreamRequest) -> GatewayResult<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match request.path.as_str() {
                "/Account" => {
                    let offset: usize = request.query["offset"].parse().unwrap();
                    let size: usize = request.query["maxSize"].parse().unwrap();
                    let page: Vec<Value> =
                        self.accounts.iter().skip(offset).take(size).cloned().collect();
                    Ok(json!({"list": page, "total": self.accounts.len()}))
                }
                _ => Err(GatewayError::from_status(500, json!({"message": "boom"}))),
            }
        }
    }

    fn warmer(
        accounts: usize,
        no_cache: Vec<String>,
    ) -> (Arc<CacheWarmer>, Arc<CacheManager>, Arc<FakeCrm>) {
        let crm = Arc::new(FakeCrm {
            accounts: (0..accounts).map(|i| json!({"id": format!("a{}", i)})).collect(),
            calls: AtomicUsize::new(0),
        });
        let dispatcher = Arc::new(UpstreamDispatcher::new(
            crm.clone(),
            Arc::new(AdmissionController::new(&AdmissionConfig::default())),
            RetryExecutor::new(RetryConfig {
                max_attempts: 1,
                ..Default::default()
            }),
            Duration::from_secs(30),
        ));
        let cache = Arc::new(CacheManager::new(CacheConfig {
            no_cache,
            ..Default::default()
        }));
        let config = WarmupConfig {
            page_size: 2,
            ..Default::default()
        };
        (
            Arc::new(CacheWarmer::new(config, Arc::clone(&cache), dispatcher)),
            cache,
            crm,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_entity_does_not_abort_the_run() {
        let (warmer, cache, _) = warmer(5, Vec::new());

        let report = warmer
            .warm_up(&["Broken".to_string(), "Account".to_string()])
            .await;

        assert!(matches!(
            report.outcome("Account"),
            Some(WarmUpOutcome::Warmed { records: 5, pages: 3, .. })
        ));
        assert!(matches!(
            report.outcome("Broken"),
            Some(WarmUpOutcome::Failed { error_type, .. }) if error_type == "server_error"
        ));

        let list = cache.get(&CacheKey::list_all("Account")).await.unwrap();
        assert_eq!(list["total"], 5);
        assert_eq!(list["list"].as_array().unwrap().len(), 5);
        assert!(cache.get(&CacheKey::by_id("Account", "a3")).await.is_some());
        assert!(cache.keys().await.iter().all(|k| !k.starts_with("Broken:")));
        assert_eq!(warmer.last_report(), Some(report));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_entity_is_skipped() {
        let (warmer, _, crm) = warmer(1, vec!["Account".to_string()]);

        let report = warmer.warm_up(&["Account".to_string()]).await;

        assert!(matches!(report.outcome("Account"), Some(WarmUpOutcome::Skipped { .. })));
        assert_eq!(crm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_runs_until_cancelled() {
        let (warmer, _, crm) = warmer(1, Vec::new());
        let shutdown = CancellationToken::new();

        let handle = warmer.schedule_refresh(
            vec!["Account".to_string()],
            Duration::from_secs(60),
            shutdown.clone(),
        );

        tokio::time::sleep(Duration::from_secs(150)).await;
        assert_eq!(crm.calls.load(Ordering::SeqCst), 2);

        shutdown.cancel();
        handle.await.unwrap();

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(crm.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_record_id() {
        assert_eq!(record_id(&json!({"id": "abc"})), Some("abc".to_string()));
        assert_eq!(record_id(&json!({"id": 42})), Some("42".to_string()));
        assert_eq!(record_id(&json!({"id": ""})), None);
        assert_eq!(record_id(&json!({"name": "x"})), None);
    }
}
