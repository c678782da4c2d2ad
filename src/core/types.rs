//! # Core Types Module
//!
//! Request descriptions shared by the gateway, the cache key generator and the upstream
//! client. Payloads are opaque JSON: nothing in the core knows an entity's fields.
//!
//! Two ways of describing an upstream operation exist:
//! - [`RequestOptions`] plus a path, which is what external collaborators hand to
//!   `Gateway::perform_request`.
//! - [`EntityRequest`], a typed description of the five read operations the cache
//!   understands (list-all, single-by-id, field-filter, unique-values, search).
//!
//! Both end up as an [`UpstreamRequest`] and both map into the same cache key space.

use crate::caching::key_generator::OperationKind;
use crate::core::error::{GatewayError, GatewayResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub use reqwest::Method;

/// Opaque upstream payload, shared between cache entries and single-flight joiners
pub type Payload = Arc<Value>;

/// Query parameters, kept sorted so identical requests serialize identically
pub type QueryParams = BTreeMap<String, String>;

/// Upstream query parameter names
pub mod params {
    pub const MAX_SIZE: &str = "maxSize";
    pub const OFFSET: &str = "offset";
    pub const ORDER_BY: &str = "orderBy";
    pub const ORDER: &str = "order";
    pub const SELECT: &str = "select";
    pub const TEXT_FILTER: &str = "textFilter";
    pub const WHERE_PREFIX: &str = "where[";
}

/// Options accompanying a raw `perform_request` call
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOptions {
    pub method: Method,
    pub query: QueryParams,
    pub body: Option<Value>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            query: QueryParams::new(),
            body: None,
        }
    }
}

impl RequestOptions {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            ..Default::default()
        }
    }

    pub fn get() -> Self {
        Self::default()
    }

    pub fn with_query<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// A fully resolved request against the upstream API
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamRequest {
    pub method: Method,
    /// Path relative to the configured prefix, always starting with `/`
    pub path: String,
    pub query: QueryParams,
    pub body: Option<Value>,
}

impl UpstreamRequest {
    pub fn get<P: Into<String>>(path: P) -> Self {
        Self {
            method: Method::GET,
            path: normalize_path(&path.into()),
            query: QueryParams::new(),
            body: None,
        }
    }

    pub fn from_options(path: &str, options: RequestOptions) -> Self {
        Self {
            method: options.method,
            path: normalize_path(path),
            query: options.query,
            body: options.body,
        }
    }

    pub fn with_query<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn is_read(&self) -> bool {
        self.method == Method::GET
    }
}

impl fmt::Display for UpstreamRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

fn normalize_path(path: &str) -> String {
    format!("/{}", path.trim_matches('/'))
}

/// Split a request path into `(entity, optional record id)`
///
/// `/Product` → `("Product", None)`, `/Product/abc/` → `("Product", Some("abc"))`.
/// Deeper paths keep everything after the entity as the id segment.
pub fn split_entity_path(path: &str) -> GatewayResult<(&str, Option<&str>)> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Err(GatewayError::invalid_request("path does not name an entity"));
    }

    match trimmed.split_once('/') {
        Some((entity, rest)) if !entity.is_empty() && !rest.is_empty() => {
            Ok((entity, Some(rest)))
        }
        Some(_) => Err(GatewayError::invalid_request(format!(
            "malformed entity path: {}",
            path
        ))),
        None => Ok((trimmed, None)),
    }
}

/// Sort direction for ordered listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

/// Ordering of a listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ordering {
    pub order_by: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl Ordering {
    pub fn asc<S: Into<String>>(field: S) -> Self {
        Self {
            order_by: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc<S: Into<String>>(field: S) -> Self {
        Self {
            order_by: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Paging window of a listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Paging {
    pub max_size: Option<u32>,
    pub offset: Option<u32>,
}

impl Paging {
    pub fn new(max_size: u32, offset: u32) -> Self {
        Self {
            max_size: Some(max_size),
            offset: Some(offset),
        }
    }
}

/// The read operations the gateway knows how to cache
#[derive(Debug, Clone, PartialEq)]
pub enum RecordQuery {
    ListAll {
        paging: Paging,
        ordering: Option<Ordering>,
        select: Vec<String>,
    },
    ById {
        id: String,
        select: Vec<String>,
    },
    FieldFilter {
        field: String,
        value: Value,
        paging: Paging,
        ordering: Option<Ordering>,
    },
    UniqueValues {
        field: String,
    },
    Search {
        text: String,
        paging: Paging,
        ordering: Option<Ordering>,
    },
}

/// Typed read request against one entity
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRequest {
    pub entity: String,
    pub query: RecordQuery,
}

impl EntityRequest {
    pub fn list_all<S: Into<String>>(entity: S) -> Self {
        Self {
            entity: entity.into(),
            query: RecordQuery::ListAll {
                paging: Paging::default(),
                ordering: None,
                select: Vec::new(),
            },
        }
    }

    pub fn by_id<S: Into<String>, I: Into<String>>(entity: S, id: I) -> Self {
        Self {
            entity: entity.into(),
            query: RecordQuery::ById {
                id: id.into(),
                select: Vec::new(),
            },
        }
    }

    pub fn field_filter<S, F>(entity: S, field: F, value: Value) -> Self
    where
        S: Into<String>,
        F: Into<String>,
    {
        Self {
            entity: entity.into(),
            query: RecordQuery::FieldFilter {
                field: field.into(),
                value,
                paging: Paging::default(),
                ordering: None,
            },
        }
    }

    pub fn unique_values<S: Into<String>, F: Into<String>>(entity: S, field: F) -> Self {
        Self {
            entity: entity.into(),
            query: RecordQuery::UniqueValues {
                field: field.into(),
            },
        }
    }

    pub fn search<S: Into<String>, T: Into<String>>(entity: S, text: T) -> Self {
        Self {
            entity: entity.into(),
            query: RecordQuery::Search {
                text: text.into(),
                paging: Paging::default(),
                ordering: None,
            },
        }
    }

    /// Replace the paging window (ignored by single-record and unique-value queries)
    pub fn with_paging(mut self, new_paging: Paging) -> Self {
        match &mut self.query {
            RecordQuery::ListAll { paging, .. }
            | RecordQuery::FieldFilter { paging, .. }
            | RecordQuery::Search { paging, .. } => *paging = new_paging,
            RecordQuery::ById { .. } | RecordQuery::UniqueValues { .. } => {}
        }
        self
    }

    /// Replace the ordering (ignored by single-record and unique-value queries)
    pub fn with_ordering(mut self, new_ordering: Ordering) -> Self {
        match &mut self.query {
            RecordQuery::ListAll { ordering, .. }
            | RecordQuery::FieldFilter { ordering, .. }
            | RecordQuery::Search { ordering, .. } => *ordering = Some(new_ordering),
            RecordQuery::ById { .. } | RecordQuery::UniqueValues { .. } => {}
        }
        self
    }

    /// Project the result onto a set of fields
    pub fn with_select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        match &mut self.query {
            RecordQuery::ListAll { select, .. } | RecordQuery::ById { select, .. } => {
                *select = fields
            }
            _ => {}
        }
        self
    }

    pub fn kind(&self) -> OperationKind {
        match &self.query {
            RecordQuery::ListAll { .. } => OperationKind::ListAll,
            RecordQuery::ById { .. } => OperationKind::ById,
            RecordQuery::FieldFilter { .. } => OperationKind::FieldFilter,
            RecordQuery::UniqueValues { .. } => OperationKind::UniqueValues,
            RecordQuery::Search { .. } => OperationKind::Search,
        }
    }

    /// Upstream path for this request
    pub fn path(&self) -> String {
        match &self.query {
            RecordQuery::ById { id, .. } => format!("/{}/{}", self.entity, id),
            _ => format!("/{}", self.entity),
        }
    }

    /// Upstream query parameters for this request
    ///
    /// Unique-value queries only carry the projection here; the gateway pages through
    /// the entity itself and adds `maxSize`/`offset` per page.
    pub fn query_params(&self) -> QueryParams {
        let mut query = QueryParams::new();
        match &self.query {
            RecordQuery::ListAll {
                paging,
                ordering,
                select,
            } => {
                push_paging(&mut query, paging);
                push_ordering(&mut query, ordering.as_ref());
                push_select(&mut query, select);
            }
            RecordQuery::ById { select, .. } => push_select(&mut query, select),
            RecordQuery::FieldFilter {
                field,
                value,
                paging,
                ordering,
            } => {
                query.insert("where[0][type]".to_string(), "equals".to_string());
                query.insert("where[0][attribute]".to_string(), field.clone());
                query.insert("where[0][value]".to_string(), filter_value(value));
                push_paging(&mut query, paging);
                push_ordering(&mut query, ordering.as_ref());
            }
            RecordQuery::UniqueValues { field } => {
                query.insert(params::SELECT.to_string(), field.clone());
            }
            RecordQuery::Search {
                text,
                paging,
                ordering,
            } => {
                query.insert(params::TEXT_FILTER.to_string(), text.clone());
                push_paging(&mut query, paging);
                push_ordering(&mut query, ordering.as_ref());
            }
        }
        query
    }

    pub fn to_upstream(&self) -> UpstreamRequest {
        UpstreamRequest {
            method: Method::GET,
            path: self.path(),
            query: self.query_params(),
            body: None,
        }
    }
}

fn push_paging(query: &mut QueryParams, paging: &Paging) {
    if let Some(max_size) = paging.max_size {
        query.insert(params::MAX_SIZE.to_string(), max_size.to_string());
    }
    if let Some(offset) = paging.offset {
        query.insert(params::OFFSET.to_string(), offset.to_string());
    }
}

fn push_ordering(query: &mut QueryParams, ordering: Option<&Ordering>) {
    if let Some(ordering) = ordering {
        query.insert(params::ORDER_BY.to_string(), ordering.order_by.clone());
        query.insert(params::ORDER.to_string(), ordering.direction.as_str().to_string());
    }
}

fn push_select(query: &mut QueryParams, select: &[String]) {
    if !select.is_empty() {
        query.insert(params::SELECT.to_string(), select.join(","));
    }
}

fn filter_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
