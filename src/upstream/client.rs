//! # Upstream Client
//!
//! One HTTP round trip against the CRM REST API. Rate limiting, retry and timeouts
//! live in the dispatcher; this layer only builds the request and classifies the
//! response.

use crate::core::error::{GatewayError, GatewayResult};
use crate::core::types::UpstreamRequest;
use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Upstream API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Scheme, host and optional port of the CRM, e.g. `https://crm.example.com`
    pub base_url: Option<Url>,

    /// Path prefix of the REST API
    pub path_prefix: String,

    pub api_key: String,

    pub api_key_header: String,

    /// Deadline for a single attempt
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    pub user_agent: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            path_prefix: "/api/v1".to_string(),
            api_key: String::new(),
            api_key_header: "X-Api-Key".to_string(),
            timeout: Duration::from_secs(30),
            user_agent: concat!("crm-gateway/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl UpstreamConfig {
    pub fn validate(&self) -> GatewayResult<()> {
        let base_url = self
            .base_url
            .as_ref()
            .ok_or_else(|| GatewayError::config("upstream.base_url is required"))?;

        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(GatewayError::config(format!(
                "upstream.base_url must be http or https, got {}",
                base_url.scheme()
            )));
        }
        if self.timeout.is_zero() {
            return Err(GatewayError::config("upstream.timeout must be greater than zero"));
        }
        HeaderName::from_bytes(self.api_key_header.as_bytes()).map_err(|e| {
            GatewayError::config(format!(
                "Invalid upstream.api_key_header '{}': {}",
                self.api_key_header, e
            ))
        })?;
        Ok(())
    }

    /// Root every request path is appended to: base URL plus path prefix, no trailing `/`
    pub fn api_root(&self) -> GatewayResult<String> {
        let base_url = self
            .base_url
            .as_ref()
            .ok_or_else(|| GatewayError::config("upstream.base_url is required"))?;

        let prefix = self.path_prefix.trim_matches('/');
        let base = base_url.as_str().trim_end_matches('/');
        Ok(if prefix.is_empty() {
            base.to_string()
        } else {
            format!("{}/{}", base, prefix)
        })
    }
}

/// Performs a single upstream round trip
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn execute(&self, request: &UpstreamRequest) -> GatewayResult<Value>;
}

/// `reqwest`-backed upstream client
#[derive(Debug, Clone)]
pub struct HttpUpstreamClient {
    client: Client,
    api_root: String,
    api_key_header: HeaderName,
    api_key: Option<HeaderValue>,
}

impl HttpUpstreamClient {
    pub fn new(config: &UpstreamConfig) -> GatewayResult<Self> {
        config.validate()?;

        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| GatewayError::config(format!("Failed to build HTTP client: {}", e)))?;

        let api_key_header = HeaderName::from_bytes(config.api_key_header.as_bytes())
            .map_err(|e| GatewayError::config(format!("Invalid API key header: {}", e)))?;

        let api_key = if config.api_key.is_empty() {
            None
        } else {
            let mut value = HeaderValue::from_str(&config.api_key)
                .map_err(|e| GatewayError::config(format!("Invalid API key: {}", e)))?;
            value.set_sensitive(true);
            Some(value)
        };

        Ok(Self {
            client,
            api_root: config.api_root()?,
            api_key_header,
            api_key,
        })
    }

    pub fn url_for(&self, request: &UpstreamRequest) -> String {
        format!("{}{}", self.api_root, request.path)
    }
}

#[async_trait]
impl UpstreamClient for HttpUpstreamClient {
    async fn execute(&self, request: &UpstreamRequest) -> GatewayResult<Value> {
        let url = self.url_for(request);
        debug!("Upstream {} {}", request.method, url);

        let mut builder = self.client.request(request.method.clone(), &url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(api_key) = &self.api_key {
            builder = builder.header(self.api_key_header.clone(), api_key.clone());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        if status.is_success() {
            return decode_body(&bytes);
        }

        Err(GatewayError::from_status(status.as_u16(), error_detail(&bytes)))
    }
}

/// Decode a 2xx body; an empty body is JSON `null`
fn decode_body(bytes: &[u8]) -> GatewayResult<Value> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_slice(bytes)?)
}

/// Error detail of a non-2xx body: JSON when it parses, the raw text otherwise
fn error_detail(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}
