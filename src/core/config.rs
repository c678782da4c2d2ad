//! # Configuration Module
//!
//! Configuration structures and loading for the gateway.
//!
//! ## Key Features
//! - YAML/JSON configuration parsing with serde
//! - Human readable durations (`30s`, `6h`) via `humantime`
//! - Environment variable overrides (`CRM_GATEWAY_*`)
//! - Validation that reports every problem at once
//!
//! Every section falls back to its defaults, so a minimal file only needs
//! `upstream.base_url`.

use crate::caching::cache_manager::CacheConfig;
use crate::caching::warmer::WarmupConfig;
use crate::core::error::{GatewayError, GatewayResult};
use crate::core::error_recovery::RetryConfig;
use crate::observability::{LogConfig, LogFormat, MetricsConfig};
use crate::traffic::admission::AdmissionConfig;
use crate::upstream::UpstreamConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Main gateway configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// CRM REST API location and credentials
    pub upstream: UpstreamConfig,

    /// Outbound rate limit
    pub admission: AdmissionConfig,

    /// Retry policy for upstream calls
    pub retry: RetryConfig,

    /// Response cache
    pub cache: CacheConfig,

    /// Cache warm-up and periodic refresh
    pub warmup: WarmupConfig,

    pub logging: LogConfig,

    pub metrics: MetricsConfig,

    /// Cache administration API
    pub admin: AdminConfig,
}

/// Cache administration API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub bind_address: SocketAddr,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 9090)),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from a YAML file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> GatewayResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| GatewayError::config(format!("Failed to read config file: {}", e)))?;

        let mut config: GatewayConfig = serde_yaml::from_str(&content)
            .map_err(|e| GatewayError::config(format!("Failed to parse config: {}", e)))?;

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from JSON
    pub async fn load_from_json<P: AsRef<Path>>(path: P) -> GatewayResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| GatewayError::config(format!("Failed to read config file: {}", e)))?;

        let mut config: GatewayConfig = serde_json::from_str(&content)
            .map_err(|e| GatewayError::config(format!("Failed to parse JSON config: {}", e)))?;

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    ///
    /// Variables follow the pattern `CRM_GATEWAY_<SETTING>`, for example
    /// `CRM_GATEWAY_CACHE_TTL=12h`.
    pub fn apply_env_overrides(&mut self) -> GatewayResult<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable source
    pub fn apply_overrides<F>(&mut self, lookup: F) -> GatewayResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("CRM_GATEWAY_BASE_URL") {
            self.upstream.base_url = Some(Url::parse(&url).map_err(|e| {
                GatewayError::config(format!("Invalid CRM_GATEWAY_BASE_URL: {}", e))
            })?);
        }

        if let Some(key) = lookup("CRM_GATEWAY_API_KEY") {
            self.upstream.api_key = key;
        }

        if let Some(timeout) = lookup("CRM_GATEWAY_TIMEOUT") {
            self.upstream.timeout = parse_duration("CRM_GATEWAY_TIMEOUT", &timeout)?;
        }

        // Admission and retry
        if let Some(max) = lookup("CRM_GATEWAY_MAX_REQUESTS") {
            self.admission.max_requests = max.parse().map_err(|e| {
                GatewayError::config(format!("Invalid CRM_GATEWAY_MAX_REQUESTS: {}", e))
            })?;
        }

        if let Some(window) = lookup("CRM_GATEWAY_RATE_WINDOW") {
            self.admission.window = parse_duration("CRM_GATEWAY_RATE_WINDOW", &window)?;
        }

        if let Some(attempts) = lookup("CRM_GATEWAY_RETRY_ATTEMPTS") {
            self.retry.max_attempts = attempts.parse().map_err(|e| {
                GatewayError::config(format!("Invalid CRM_GATEWAY_RETRY_ATTEMPTS: {}", e))
            })?;
        }

        if let Some(delay) = lookup("CRM_GATEWAY_RETRY_BASE_DELAY") {
            self.retry.base_delay = parse_duration("CRM_GATEWAY_RETRY_BASE_DELAY", &delay)?;
        }

        // Cache
        if let Some(ttl) = lookup("CRM_GATEWAY_CACHE_TTL") {
            self.cache.default_ttl = parse_duration("CRM_GATEWAY_CACHE_TTL", &ttl)?;
        }

        if let Some(entities) = lookup("CRM_GATEWAY_NO_CACHE") {
            self.cache.no_cache = parse_list(&entities);
        }

        if let Some(entities) = lookup("CRM_GATEWAY_CACHE_ONLY") {
            self.cache.cache_only = parse_list(&entities);
        }

        // Logging and admin
        if let Some(level) = lookup("CRM_GATEWAY_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Some(format) = lookup("CRM_GATEWAY_LOG_FORMAT") {
            self.logging.format = LogFormat::from_str(&format).map_err(|e| {
                GatewayError::config(format!("Invalid CRM_GATEWAY_LOG_FORMAT: {}", e))
            })?;
        }

        if let Some(addr) = lookup("CRM_GATEWAY_ADMIN_BIND") {
            self.admin.bind_address = addr.parse().map_err(|e| {
                GatewayError::config(format!("Invalid CRM_GATEWAY_ADMIN_BIND: {}", e))
            })?;
        }

        Ok(())
    }

    /// Validate every section, reporting all problems together
    pub fn validate(&self) -> GatewayResult<()> {
        let mut errors = Vec::new();

        collect(&mut errors, self.upstream.validate());
        collect(&mut errors, self.admission.validate());
        collect(&mut errors, self.retry.validate());

        if self.cache.default_ttl.is_zero() {
            errors.push("cache.default_ttl must be greater than 0".to_string());
        }

        if self.cache.sweep_interval.is_zero() {
            errors.push("cache.sweep_interval must be greater than 0".to_string());
        }

        if self.warmup.page_size == 0 {
            errors.push("warmup.page_size must be greater than 0".to_string());
        }

        if self.warmup.max_records == 0 {
            errors.push("warmup.max_records must be greater than 0".to_string());
        }

        if self.warmup.enabled && self.warmup.refresh_interval.is_zero() {
            errors.push("warmup.refresh_interval must be greater than 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(GatewayError::config(format!(
                "Configuration validation failed:\n{}",
                errors.join("\n")
            )))
        }
    }
}

fn collect(errors: &mut Vec<String>, result: GatewayResult<()>) {
    match result {
        Ok(()) => {}
        Err(GatewayError::Configuration { message }) => errors.push(message),
        Err(other) => errors.push(other.to_string()),
    }
}

fn parse_duration(name: &str, value: &str) -> GatewayResult<Duration> {
    humantime::parse_duration(value)
        .map_err(|e| GatewayError::config(format!("Invalid {}: {}", name, e)))
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
