//! Document store: the persistence seam for every entity in the tracker.
//!
//! Entities are JSON documents grouped in named collections. The trait exposes
//! exactly the primitives the services rely on:
//! - point and batched reads, field queries, paginated scans
//! - create-if-absent (`create`), overwrite/deep-merge (`set`)
//! - field-path scoped updates with an optional version precondition (`update`)
//!
//! Uniqueness of natural keys is enforced by the services (query-then-write,
//! backed by create-if-absent on derived ids), not by the store.
//!
//! Backends: `MemoryStore` (tests, local runs) and `PgDocumentStore` (JSONB).

pub mod fieldpath;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

pub use memory::MemoryStore;
pub use postgres::PgDocumentStore;

/// Maximum number of ids in a `get_many` call or values in an `In` filter.
pub const IN_QUERY_LIMIT: usize = 30;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document {collection}/{id} not found")]
    NotFound { collection: String, id: String },

    #[error("document {collection}/{id} already exists")]
    AlreadyExists { collection: String, id: String },

    #[error("document {collection}/{id} is at version {actual}, expected {expected}")]
    VersionMismatch {
        collection: String,
        id: String,
        expected: u64,
        actual: u64,
    },

    #[error("batch of {requested} exceeds limit of {limit}")]
    LimitExceeded { limit: usize, requested: usize },

    #[error("invalid field path '{0}'")]
    InvalidPath(String),

    #[error("document codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("backend error: {0}")]
    Backend(#[from] sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

// ────────────────────────────────────────────────────────────────────────────
// Documents, queries and updates
// ────────────────────────────────────────────────────────────────────────────

/// A stored document. `version` starts at 1 and increases on every write.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub version: u64,
    pub data: Value,
}

impl Document {
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        Ok(serde_json::from_value(self.data.clone())?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    In,
    ArrayContains,
    Gte,
    Lte,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// Conjunction of field filters with optional ordering and limit.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(
        mut self,
        field: impl Into<String>,
        op: FilterOp,
        value: impl Into<Value>,
    ) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(field, FilterOp::Eq, value)
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some((field.into(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Rejects `In` filters above the store's IN limit.
    pub fn validate(&self) -> Result<(), StoreError> {
        for filter in &self.filters {
            if filter.op == FilterOp::In {
                let requested = filter.value.as_array().map(Vec::len).unwrap_or(0);
                if requested > IN_QUERY_LIMIT {
                    return Err(StoreError::LimitExceeded {
                        limit: IN_QUERY_LIMIT,
                        requested,
                    });
                }
            }
            fieldpath::split(&filter.field)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetMode {
    Overwrite,
    /// Deep-merge objects into the existing document; scalars and arrays replace.
    Merge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    Set(Value),
    /// Append each value not already present; creates the array if missing.
    ArrayUnion(Vec<Value>),
}

/// One field-path scoped write, e.g. `snapshotLinks.4611686018` := link.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldUpdate {
    pub path: String,
    pub op: FieldOp,
}

impl FieldUpdate {
    pub fn set(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            path: path.into(),
            op: FieldOp::Set(value.into()),
        }
    }

    pub fn array_union<I, V>(path: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            path: path.into(),
            op: FieldOp::ArrayUnion(values.into_iter().map(Into::into).collect()),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Trait definition
// ────────────────────────────────────────────────────────────────────────────

/// Keyed JSON document collections. Each call is atomic on a single document.
///
/// Carried by every service as `Arc<dyn DocumentStore>`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    /// Batched point lookup of at most `IN_QUERY_LIMIT` ids. Missing ids are
    /// omitted; result order is unspecified.
    async fn get_many(&self, collection: &str, ids: &[String]) -> Result<Vec<Document>, StoreError>;

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError>;

    /// Documents ordered by id, strictly after `after`.
    async fn scan(
        &self,
        collection: &str,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Document>, StoreError>;

    /// Create-if-absent. Fails with `AlreadyExists` when the id is taken.
    async fn create(&self, collection: &str, id: &str, data: Value) -> Result<Document, StoreError>;

    async fn set(
        &self,
        collection: &str,
        id: &str,
        data: Value,
        mode: SetMode,
    ) -> Result<Document, StoreError>;

    /// Applies all updates atomically. With `expected_version`, fails with
    /// `VersionMismatch` unless the stored version matches.
    async fn update(
        &self,
        collection: &str,
        id: &str,
        updates: &[FieldUpdate],
        expected_version: Option<u64>,
    ) -> Result<Document, StoreError>;

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Chunked batch helpers
// ────────────────────────────────────────────────────────────────────────────

/// `get_many` over any number of ids, chunked at the IN limit.
pub async fn get_many_chunked(
    store: &dyn DocumentStore,
    collection: &str,
    ids: &[String],
) -> Result<Vec<Document>, StoreError> {
    let mut docs = Vec::with_capacity(ids.len());
    for chunk in ids.chunks(IN_QUERY_LIMIT) {
        docs.extend(store.get_many(collection, chunk).await?);
    }
    Ok(docs)
}

/// `field IN values` over any number of values, chunked at the IN limit.
pub async fn query_in_chunked(
    store: &dyn DocumentStore,
    collection: &str,
    field: &str,
    values: &[String],
) -> Result<Vec<Document>, StoreError> {
    let mut docs = Vec::new();
    for chunk in values.chunks(IN_QUERY_LIMIT) {
        let query = Query::new().filter(field, FilterOp::In, chunk.to_vec());
        docs.extend(store.query(collection, &query).await?);
    }
    Ok(docs)
}
