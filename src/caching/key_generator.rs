//! # Cache Key Generator
//!
//! Deterministic cache keys for upstream read operations.
//!
//! A key is rendered as `{entity}:{kind}[:{id}][?{params}]`. Parameters are sorted by
//! name and percent-encoded, so two logically identical requests always produce the
//! same key no matter how their parameters were assembled. Every key of an entity
//! starts with `{entity}:`, which is what per-entity invalidation matches on.
//!
//! Long parameter sections are replaced with a SHA-256 digest to keep keys bounded.

use crate::core::error::GatewayResult;
use crate::core::types::{
    params, split_entity_path, EntityRequest, QueryParams, RecordQuery, UpstreamRequest,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Parameter sections longer than this are hashed
pub const MAX_PARAM_SECTION_LEN: usize = 200;

/// Kind of read operation a key was derived from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    ListAll,
    ById,
    FieldFilter,
    UniqueValues,
    Search,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::ListAll => "list",
            OperationKind::ById => "id",
            OperationKind::FieldFilter => "filter",
            OperationKind::UniqueValues => "unique",
            OperationKind::Search => "search",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cache key for one logical read
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    entity: String,
    kind: OperationKind,
    rendered: String,
}

impl CacheKey {
    pub fn new(entity: &str, kind: OperationKind, id: Option<&str>, query: &QueryParams) -> Self {
        let mut rendered = format!("{}:{}", entity, kind.as_str());

        if let Some(id) = id {
            rendered.push(':');
            rendered.push_str(&urlencoding::encode(id));
        }

        if !query.is_empty() {
            let section = query
                .iter()
                .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
                .collect::<Vec<_>>()
                .join("&");

            if section.len() > MAX_PARAM_SECTION_LEN {
                let digest = Sha256::digest(section.as_bytes());
                rendered.push('#');
                rendered.push_str(&hex::encode(digest));
            } else {
                rendered.push('?');
                rendered.push_str(&section);
            }
        }

        Self {
            entity: entity.to_string(),
            kind,
            rendered,
        }
    }

    /// The default "list all" key of an entity: no paging, ordering or projection
    pub fn list_all(entity: &str) -> Self {
        Self::new(entity, OperationKind::ListAll, None, &QueryParams::new())
    }

    /// The plain "single by id" key of a record
    pub fn by_id(entity: &str, id: &str) -> Self {
        Self::new(entity, OperationKind::ById, Some(id), &QueryParams::new())
    }

    pub fn for_entity_request(request: &EntityRequest) -> Self {
        match &request.query {
            RecordQuery::ById { id, .. } => Self::new(
                &request.entity,
                OperationKind::ById,
                Some(id),
                &request.query_params(),
            ),
            RecordQuery::UniqueValues { field } => {
                let mut query = QueryParams::new();
                query.insert("field".to_string(), field.clone());
                Self::new(&request.entity, OperationKind::UniqueValues, None, &query)
            }
            _ => Self::new(&request.entity, request.kind(), None, &request.query_params()),
        }
    }

    /// Classify a raw read into the key space shared with typed requests
    ///
    /// `/{Entity}/{id}` is a single-record read; a listing carrying `where[...]`
    /// parameters is a field filter, one carrying `textFilter` a search, anything else
    /// a list-all.
    pub fn for_request(request: &UpstreamRequest) -> GatewayResult<Self> {
        let (entity, id) = split_entity_path(&request.path)?;

        let kind = if id.is_some() {
            OperationKind::ById
        } else if request.query.keys().any(|k| k.starts_with(params::WHERE_PREFIX)) {
            OperationKind::FieldFilter
        } else if request.query.contains_key(params::TEXT_FILTER) {
            OperationKind::Search
        } else {
            OperationKind::ListAll
        };

        Ok(Self::new(entity, kind, id, &request.query))
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn as_str(&self) -> &str {
        &self.rendered
    }

    /// Prefix shared by every key of `entity`
    pub fn entity_prefix(entity: &str) -> String {
        format!("{}:", entity)
    }

    /// Entity part of a rendered key
    pub fn entity_of(key: &str) -> Option<&str> {
        key.split_once(':')
            .map(|(entity, _)| entity)
            .filter(|entity| !entity.is_empty())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rendered)
    }
}
