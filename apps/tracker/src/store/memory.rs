use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{
    fieldpath, Direction, Document, DocumentStore, FieldUpdate, Query, SetMode, StoreError,
    IN_QUERY_LIMIT,
};

type Collections = HashMap<String, BTreeMap<String, Document>>;

/// In-process document store. A single lock over all collections makes every
/// call atomic, which is the same guarantee the PostgreSQL backend gives per row.
#[derive(Clone, Default)]
pub struct MemoryStore {
    collections: Arc<RwLock<Collections>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in a collection.
    pub async fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }
}

fn not_found(collection: &str, id: &str) -> StoreError {
    StoreError::NotFound {
        collection: collection.to_string(),
        id: id.to_string(),
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections.get(collection).and_then(|c| c.get(id)).cloned())
    }

    async fn get_many(
        &self,
        collection: &str,
        ids: &[String],
    ) -> Result<Vec<Document>, StoreError> {
        if ids.len() > IN_QUERY_LIMIT {
            return Err(StoreError::LimitExceeded {
                limit: IN_QUERY_LIMIT,
                requested: ids.len(),
            });
        }
        let collections = self.collections.read().await;
        let Some(docs) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(ids.iter().filter_map(|id| docs.get(id)).cloned().collect())
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError> {
        query.validate()?;
        let collections = self.collections.read().await;
        let Some(docs) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut results: Vec<Document> = docs
            .values()
            .filter(|doc| query.filters.iter().all(|f| fieldpath::matches(&doc.data, f)))
            .cloned()
            .collect();

        if let Some((field, direction)) = &query.order_by {
            results.sort_by(|a, b| {
                let lhs = fieldpath::get(&a.data, field);
                let rhs = fieldpath::get(&b.data, field);
                let ordering = match (lhs, rhs) {
                    (Some(x), Some(y)) => fieldpath::compare(x, y).unwrap_or(Ordering::Equal),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                };
                match direction {
                    Direction::Asc => ordering,
                    Direction::Desc => ordering.reverse(),
                }
            });
        }
        if let Some(limit) = query.limit {
            results.truncate(limit);
        }
        Ok(results)
    }

    async fn scan(
        &self,
        collection: &str,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Document>, StoreError> {
        let collections = self.collections.read().await;
        let Some(docs) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(docs
            .values()
            .filter(|doc| after.map_or(true, |cursor| doc.id.as_str() > cursor))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn create(
        &self,
        collection: &str,
        id: &str,
        data: Value,
    ) -> Result<Document, StoreError> {
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();
        if docs.contains_key(id) {
            return Err(StoreError::AlreadyExists {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }
        let doc = Document {
            id: id.to_string(),
            version: 1,
            data,
        };
        docs.insert(id.to_string(), doc.clone());
        Ok(doc)
    }

    async fn set(
        &self,
        collection: &str,
        id: &str,
        data: Value,
        mode: SetMode,
    ) -> Result<Document, StoreError> {
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();
        let doc = match docs.get(id) {
            Some(existing) => {
                let data = match mode {
                    SetMode::Overwrite => data,
                    SetMode::Merge => {
                        let mut merged = existing.data.clone();
                        fieldpath::merge(&mut merged, data);
                        merged
                    }
                };
                Document {
                    id: id.to_string(),
                    version: existing.version + 1,
                    data,
                }
            }
            None => Document {
                id: id.to_string(),
                version: 1,
                data,
            },
        };
        docs.insert(id.to_string(), doc.clone());
        Ok(doc)
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        updates: &[FieldUpdate],
        expected_version: Option<u64>,
    ) -> Result<Document, StoreError> {
        let mut collections = self.collections.write().await;
        let existing = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| not_found(collection, id))?;

        if let Some(expected) = expected_version {
            if existing.version != expected {
                return Err(StoreError::VersionMismatch {
                    collection: collection.to_string(),
                    id: id.to_string(),
                    expected,
                    actual: existing.version,
                });
            }
        }

        // Apply to a copy so a bad path leaves the stored document untouched.
        let mut data = existing.data.clone();
        fieldpath::apply_all(&mut data, updates)?;
        existing.data = data;
        existing.version += 1;
        Ok(existing.clone())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        if let Some(docs) = collections.get_mut(collection) {
            docs.remove(id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::store::FilterOp;

    #[tokio::test]
    async fn test_create_is_create_if_absent() {
        let store = MemoryStore::new();
        store.create("snapshots", "s1", json!({ "n": 1 })).await.unwrap();
        let second = store.create("snapshots", "s1", json!({ "n": 2 })).await;
        assert!(matches!(second, Err(StoreError::AlreadyExists { .. })));

        let doc = store.get("snapshots", "s1").await.unwrap().unwrap();
        assert_eq!(doc.data["n"], json!(1));
    }

    #[tokio::test]
    async fn test_update_with_stale_version_is_rejected() {
        let store = MemoryStore::new();
        store.create("aggregates", "a1", json!({})).await.unwrap();
        store
            .update("aggregates", "a1", &[FieldUpdate::set("x", 1)], Some(1))
            .await
            .unwrap();

        let stale = store
            .update("aggregates", "a1", &[FieldUpdate::set("x", 2)], Some(1))
            .await;
        assert!(matches!(
            stale,
            Err(StoreError::VersionMismatch { expected: 1, actual: 2, .. })
        ));
        let doc = store.get("aggregates", "a1").await.unwrap().unwrap();
        assert_eq!(doc.data["x"], json!(1));
    }

    #[tokio::test]
    async fn test_update_missing_document_is_not_found() {
        let store = MemoryStore::new();
        let result = store.update("aggregates", "nope", &[], None).await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_invalid_path_leaves_document_unchanged() {
        let store = MemoryStore::new();
        store.create("c", "d", json!({ "a": 1, "s": "x" })).await.unwrap();
        let updates = [FieldUpdate::set("a", 2), FieldUpdate::set("s.inner", 3)];
        assert!(store.update("c", "d", &updates, None).await.is_err());

        let doc = store.get("c", "d").await.unwrap().unwrap();
        assert_eq!(doc.data["a"], json!(1));
        assert_eq!(doc.version, 1);
    }

    #[tokio::test]
    async fn test_query_filters_orders_and_limits() {
        let store = MemoryStore::new();
        for (id, created) in [("s1", 100), ("s2", 300), ("s3", 200)] {
            store
                .create("snapshots", id, json!({ "characterId": "c1", "createdAt": created }))
                .await
                .unwrap();
        }
        store
            .create("snapshots", "s4", json!({ "characterId": "c2", "createdAt": 400 }))
            .await
            .unwrap();

        let query = Query::new()
            .eq("characterId", "c1")
            .order_by("createdAt", Direction::Desc)
            .limit(2);
        let docs = store.query("snapshots", &query).await.unwrap();
        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["s2", "s3"]);
    }

    #[tokio::test]
    async fn test_query_in_filter() {
        let store = MemoryStore::new();
        for id in ["a", "b", "c"] {
            store.create("x", id, json!({ "key": id })).await.unwrap();
        }
        let query = Query::new().filter("key", FilterOp::In, vec!["a", "c"]);
        assert_eq!(store.query("x", &query).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_scan_paginates_by_id() {
        let store = MemoryStore::new();
        for id in ["a", "b", "c", "d", "e"] {
            store.create("x", id, json!({})).await.unwrap();
        }
        let first = store.scan("x", None, 2).await.unwrap();
        assert_eq!(first.iter().map(|d| d.id.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);
        let next = store.scan("x", Some("b"), 2).await.unwrap();
        assert_eq!(next.iter().map(|d| d.id.as_str()).collect::<Vec<_>>(), vec!["c", "d"]);
    }

    #[tokio::test]
    async fn test_set_merge_keeps_untouched_fields() {
        let store = MemoryStore::new();
        store
            .create("x", "d", json!({ "a": { "b": 1, "c": 2 } }))
            .await
            .unwrap();
        let doc = store
            .set("x", "d", json!({ "a": { "c": 3 } }), SetMode::Merge)
            .await
            .unwrap();
        assert_eq!(doc.data, json!({ "a": { "b": 1, "c": 3 } }));
        assert_eq!(doc.version, 2);
    }
}
