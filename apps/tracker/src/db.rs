use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

/// Statements are idempotent; `ensure_schema` runs on every startup.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS documents (
        collection TEXT NOT NULL,
        id TEXT NOT NULL,
        version BIGINT NOT NULL DEFAULT 1,
        data JSONB NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        PRIMARY KEY (collection, id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS documents_data_idx ON documents USING GIN (data jsonb_path_ops)",
    r#"
    CREATE INDEX IF NOT EXISTS documents_activity_idx
        ON documents ((data ->> 'activityId')) WHERE collection = 'aggregates'
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS documents_hash_idx
        ON documents ((data ->> 'hash')) WHERE collection = 'snapshots'
    "#,
];

/// Creates and returns a PostgreSQL connection pool.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<PgPool> {
    info!("Connecting to PostgreSQL...");

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    info!("PostgreSQL connection pool established");
    Ok(pool)
}

/// Creates the `documents` table and its indexes if they are missing.
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to apply schema statement: {}", statement.trim()))?;
    }
    info!("Document schema ready");
    Ok(())
}
