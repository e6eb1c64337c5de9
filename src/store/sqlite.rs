//! SQLite-backed [`VectorIndex`].
//!
//! All collections share one database file, normally
//! `<index_path>/index.sqlite`:
//!
//! ```sql
//! collections(name PRIMARY KEY, vector_size, distance, created_at)
//! points(collection, id, vector BLOB, payload JSON, PRIMARY KEY(collection, id))
//! ```
//!
//! A connection is opened per operation and closed before returning, so the
//! storage directory can be copied, restored or removed between calls
//! without a live handle pinning the file. Read-only operations never create
//! the file or its tables: listing an absent or schema-less database yields
//! nothing. Only writers that may create a collection run migrations.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::models::{ChunkPayload, VectorRecord};

use super::{check_dimensions, CollectionDescription, Distance, ScoredRecord, VectorIndex};

/// File name of the database inside an index storage directory.
pub const DB_FILE_NAME: &str = "index.sqlite";

pub struct SqliteIndex {
    path: PathBuf,
}

impl SqliteIndex {
    /// Index stored at an explicit database file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Index stored as [`DB_FILE_NAME`] inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(DB_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a pool on the database file. With `create` unset, a missing file
    /// or one without the index tables yields `None` and nothing is written.
    async fn open(&self, create: bool) -> Result<Option<SqlitePool>> {
        if !create && !self.path.is_file() {
            return Ok(None);
        }
        if create {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(&self.path)
            .create_if_missing(create)
            .journal_mode(SqliteJournalMode::Delete);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open {}", self.path.display()))?;

        if create {
            migrate(&pool).await?;
        } else if !has_schema(&pool).await? {
            pool.close().await;
            return Ok(None);
        }
        Ok(Some(pool))
    }
}

async fn has_schema(pool: &SqlitePool) -> Result<bool> {
    let tables: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('collections', 'points')",
    )
    .fetch_one(pool)
    .await?;
    Ok(tables == 2)
}

async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS collections (
            name TEXT PRIMARY KEY,
            vector_size INTEGER NOT NULL,
            distance TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS points (
            collection TEXT NOT NULL,
            id TEXT NOT NULL,
            vector BLOB NOT NULL,
            payload TEXT NOT NULL,
            PRIMARY KEY (collection, id),
            FOREIGN KEY (collection) REFERENCES collections(name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn collection_size(
    conn: &mut sqlx::SqliteConnection,
    name: &str,
) -> Result<Option<usize>> {
    let size: Option<i64> =
        sqlx::query_scalar("SELECT vector_size FROM collections WHERE name = ?")
            .bind(name)
            .fetch_optional(&mut *conn)
            .await?;
    Ok(size.map(|s| s as usize))
}

async fn insert_points(
    conn: &mut sqlx::SqliteConnection,
    name: &str,
    records: &[VectorRecord],
) -> Result<()> {
    for record in records {
        let payload = serde_json::to_string(&record.payload)?;
        sqlx::query(
            r#"
            INSERT INTO points (collection, id, vector, payload)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(collection, id) DO UPDATE SET
                vector = excluded.vector,
                payload = excluded.payload
            "#,
        )
        .bind(name)
        .bind(&record.id)
        .bind(vec_to_blob(&record.vector))
        .bind(payload)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    async fn list_collections(&self) -> Result<Vec<String>> {
        let Some(pool) = self.open(false).await? else {
            return Ok(Vec::new());
        };
        let names: Vec<String> = sqlx::query_scalar("SELECT name FROM collections ORDER BY name")
            .fetch_all(&pool)
            .await?;
        pool.close().await;
        Ok(names)
    }

    async fn get_collection(&self, name: &str) -> Result<Option<CollectionDescription>> {
        let Some(pool) = self.open(false).await? else {
            return Ok(None);
        };
        let row: Option<(i64, String)> =
            sqlx::query_as("SELECT vector_size, distance FROM collections WHERE name = ?")
                .bind(name)
                .fetch_optional(&pool)
                .await?;

        let description = match row {
            Some((vector_size, distance)) => {
                let count: i64 =
                    sqlx::query_scalar("SELECT COUNT(*) FROM points WHERE collection = ?")
                        .bind(name)
                        .fetch_one(&pool)
                        .await?;
                Some(CollectionDescription {
                    name: name.to_string(),
                    record_count: count as usize,
                    vector_size: vector_size as usize,
                    distance: Distance::parse(&distance).unwrap_or(Distance::Cosine),
                })
            }
            None => None,
        };
        pool.close().await;
        Ok(description)
    }

    async fn create_collection(
        &self,
        name: &str,
        vector_size: usize,
        distance: Distance,
    ) -> Result<()> {
        let Some(pool) = self.open(true).await? else {
            bail!("cannot open {}", self.path.display());
        };
        let result = sqlx::query(
            "INSERT INTO collections (name, vector_size, distance, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(name)
        .bind(vector_size as i64)
        .bind(distance.as_str())
        .bind(chrono::Utc::now().timestamp())
        .execute(&pool)
        .await;
        pool.close().await;

        result.with_context(|| format!("collection '{}' already exists", name))?;
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<bool> {
        let Some(pool) = self.open(false).await? else {
            return Ok(false);
        };
        let mut tx = pool.begin().await?;
        sqlx::query("DELETE FROM points WHERE collection = ?")
            .bind(name)
            .execute(&mut *tx)
            .await?;
        let removed = sqlx::query("DELETE FROM collections WHERE name = ?")
            .bind(name)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        pool.close().await;
        Ok(removed > 0)
    }

    async fn upsert(&self, name: &str, records: &[VectorRecord]) -> Result<()> {
        let Some(pool) = self.open(false).await? else {
            bail!("collection '{}' does not exist", name);
        };
        let mut tx = pool.begin().await?;
        let Some(vector_size) = collection_size(&mut *tx, name).await? else {
            bail!("collection '{}' does not exist", name);
        };
        check_dimensions(name, vector_size, records)?;
        insert_points(&mut *tx, name, records).await?;
        tx.commit().await?;
        pool.close().await;
        Ok(())
    }

    async fn search(&self, name: &str, vector: &[f32], limit: usize) -> Result<Vec<ScoredRecord>> {
        let Some(pool) = self.open(false).await? else {
            bail!("collection '{}' does not exist", name);
        };
        let mut conn = pool.acquire().await?;
        if collection_size(&mut *conn, name).await?.is_none() {
            bail!("collection '{}' does not exist", name);
        }

        let rows: Vec<(String, Vec<u8>, String)> = sqlx::query_as(
            "SELECT id, vector, payload FROM points WHERE collection = ? ORDER BY rowid",
        )
        .bind(name)
        .fetch_all(&mut *conn)
        .await?;
        drop(conn);
        pool.close().await;

        let mut scored = Vec::with_capacity(rows.len());
        for (id, blob, payload) in rows {
            let stored = blob_to_vec(&blob);
            let payload: ChunkPayload = serde_json::from_str(&payload)
                .with_context(|| format!("corrupt payload for record {}", id))?;
            scored.push(ScoredRecord {
                id,
                score: cosine_similarity(vector, &stored),
                vector: stored,
                payload,
            });
        }

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit);
        Ok(scored)
    }

    /// Drop, recreate and fill the collection inside one transaction, so a
    /// failure part-way leaves the previous contents in place.
    async fn replace_collection(
        &self,
        name: &str,
        vector_size: usize,
        records: &[VectorRecord],
    ) -> Result<()> {
        check_dimensions(name, vector_size, records)?;
        let Some(pool) = self.open(true).await? else {
            bail!("cannot open {}", self.path.display());
        };

        let mut tx = pool.begin().await?;
        sqlx::query("DELETE FROM points WHERE collection = ?")
            .bind(name)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM collections WHERE name = ?")
            .bind(name)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO collections (name, vector_size, distance, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(name)
        .bind(vector_size as i64)
        .bind(Distance::Cosine.as_str())
        .bind(chrono::Utc::now().timestamp())
        .execute(&mut *tx)
        .await?;
        insert_points(&mut *tx, name, records).await?;
        tx.commit().await?;
        pool.close().await;

        tracing::debug!(collection = name, records = records.len(), "collection replaced");
        Ok(())
    }
}
