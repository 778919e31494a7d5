//! PostgreSQL backend: one `documents` table, JSONB payloads, a version column
//! for optimistic concurrency. Field updates run inside a transaction holding a
//! row lock (`SELECT … FOR UPDATE`), so concurrent per-character merges into the
//! same aggregate serialize instead of overwriting each other.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::Postgres;
use sqlx::types::Json;
use sqlx::{PgPool, QueryBuilder};
use tracing::debug;

use super::{
    fieldpath, Direction, Document, DocumentStore, FieldUpdate, FilterOp, Query, SetMode,
    StoreError, IN_QUERY_LIMIT,
};

type DocumentRow = (String, i64, Json<Value>);

fn into_document((id, version, Json(data)): DocumentRow) -> Document {
    Document {
        id,
        version: version.max(0) as u64,
        data,
    }
}

fn path_segments(path: &str) -> Result<Vec<String>, StoreError> {
    Ok(fieldpath::split(path)?
        .into_iter()
        .map(String::from)
        .collect())
}

#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let row: Option<DocumentRow> = sqlx::query_as(
            "SELECT id, version, data FROM documents WHERE collection = $1 AND id = $2",
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(into_document))
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
        let rows: Vec<DocumentRow> = sqlx::query_as(
            "SELECT id, version, data FROM documents WHERE collection = $1 AND id = ANY($2)",
        )
        .bind(collection)
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(into_document).collect())
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError> {
        query.validate()?;

        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT id, version, data FROM documents WHERE collection = ");
        qb.push_bind(collection.to_string());

        for filter in &query.filters {
            let path = path_segments(&filter.field)?;
            match filter.op {
                FilterOp::Eq => {
                    qb.push(" AND data #> ");
                    qb.push_bind(path);
                    qb.push(" = ");
                    qb.push_bind(Json(filter.value.clone()));
                }
                FilterOp::In => {
                    let candidates = filter.value.as_array().cloned().unwrap_or_default();
                    if candidates.is_empty() {
                        return Ok(Vec::new());
                    }
                    qb.push(" AND data #> ");
                    qb.push_bind(path);
                    qb.push(" IN (");
                    let mut separated = qb.separated(", ");
                    for candidate in candidates {
                        separated.push_bind(Json(candidate));
                    }
                    separated.push_unseparated(")");
                }
                FilterOp::ArrayContains => {
                    qb.push(" AND data #> ");
                    qb.push_bind(path);
                    qb.push(" @> ");
                    qb.push_bind(Json(Value::Array(vec![filter.value.clone()])));
                }
                FilterOp::Gte | FilterOp::Lte => {
                    let operator = if filter.op == FilterOp::Gte { ">=" } else { "<=" };
                    match &filter.value {
                        Value::Number(n) => {
                            qb.push(" AND (data #>> ");
                            qb.push_bind(path);
                            qb.push(format!(")::float8 {operator} "));
                            qb.push_bind(n.as_f64().unwrap_or_default());
                        }
                        other => {
                            qb.push(" AND data #>> ");
                            qb.push_bind(path);
                            qb.push(format!(" {operator} "));
                            qb.push_bind(other.as_str().unwrap_or_default().to_string());
                        }
                    }
                }
            }
        }

        if let Some((field, direction)) = &query.order_by {
            qb.push(" ORDER BY data #> ");
            qb.push_bind(path_segments(field)?);
            qb.push(match direction {
                Direction::Asc => " ASC",
                Direction::Desc => " DESC",
            });
            qb.push(", id ASC");
        }
        if let Some(limit) = query.limit {
            qb.push(" LIMIT ");
            qb.push_bind(limit as i64);
        }

        let rows = qb.build_query_as::<DocumentRow>().fetch_all(&self.pool).await?;
        debug!("Query on {collection} returned {} documents", rows.len());
        Ok(rows.into_iter().map(into_document).collect())
    }

    async fn scan(
        &self,
        collection: &str,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Document>, StoreError> {
        let rows: Vec<DocumentRow> = sqlx::query_as(
            r#"
            SELECT id, version, data FROM documents
            WHERE collection = $1 AND ($2::text IS NULL OR id > $2)
            ORDER BY id ASC
            LIMIT $3
            "#,
        )
        .bind(collection)
        .bind(after)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(into_document).collect())
    }

    async fn create(
        &self,
        collection: &str,
        id: &str,
        data: Value,
    ) -> Result<Document, StoreError> {
        let inserted: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO documents (collection, id, version, data)
            VALUES ($1, $2, 1, $3)
            ON CONFLICT (collection, id) DO NOTHING
            RETURNING version
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(Json(&data))
        .fetch_optional(&self.pool)
        .await?;

        match inserted {
            Some(version) => Ok(Document {
                id: id.to_string(),
                version: version as u64,
                data,
            }),
            None => Err(StoreError::AlreadyExists {
                collection: collection.to_string(),
                id: id.to_string(),
            }),
        }
    }

    async fn set(
        &self,
        collection: &str,
        id: &str,
        data: Value,
        mode: SetMode,
    ) -> Result<Document, StoreError> {
        let mut tx = self.pool.begin().await?;
        let existing: Option<Json<Value>> = sqlx::query_scalar(
            "SELECT data FROM documents WHERE collection = $1 AND id = $2 FOR UPDATE",
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let data = match (mode, existing) {
            (SetMode::Merge, Some(Json(mut current))) => {
                fieldpath::merge(&mut current, data);
                current
            }
            _ => data,
        };

        let version: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO documents (collection, id, version, data)
            VALUES ($1, $2, 1, $3)
            ON CONFLICT (collection, id) DO UPDATE
              SET data = excluded.data,
                  version = documents.version + 1,
                  updated_at = now()
            RETURNING version
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(Json(&data))
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(Document {
            id: id.to_string(),
            version: version as u64,
            data,
        })
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        updates: &[FieldUpdate],
        expected_version: Option<u64>,
    ) -> Result<Document, StoreError> {
        let mut tx = self.pool.begin().await?;
        let row: Option<(i64, Json<Value>)> = sqlx::query_as(
            "SELECT version, data FROM documents WHERE collection = $1 AND id = $2 FOR UPDATE",
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let (version, Json(mut data)) = row.ok_or_else(|| StoreError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        })?;
        let version = version as u64;

        if let Some(expected) = expected_version {
            if version != expected {
                return Err(StoreError::VersionMismatch {
                    collection: collection.to_string(),
                    id: id.to_string(),
                    expected,
                    actual: version,
                });
            }
        }

        fieldpath::apply_all(&mut data, updates)?;

        sqlx::query(
            r#"
            UPDATE documents SET data = $3, version = version + 1, updated_at = now()
            WHERE collection = $1 AND id = $2
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(Json(&data))
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(Document {
            id: id.to_string(),
            version: version + 1,
            data,
        })
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
