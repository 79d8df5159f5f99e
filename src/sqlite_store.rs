//! SQLite-backed [`VectorStore`] implementation.
//!
//! Vectors are stored as little-endian `f32` BLOBs and searched by
//! brute-force cosine similarity over the target collection. A collection
//! is a row in `collections`; its passages are rows in `records`.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::path::Path;
use uuid::Uuid;

use qa_harness_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use qa_harness_core::models::{Passage, UnitMetadata};
use qa_harness_core::store::{rank, NewRecord, ScoredRecord, VectorStore};

use crate::{db, migrate};

/// SQLite implementation of the [`VectorStore`] trait.
pub struct SqliteVectorStore {
    pool: SqlitePool,
}

impl SqliteVectorStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the database at `path` and ensure the schema exists.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect(path).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    async fn dims_of(&self, collection: &str) -> Result<Option<usize>> {
        let dims: Option<i64> = sqlx::query_scalar("SELECT dims FROM collections WHERE name = ?")
            .bind(collection)
            .fetch_optional(&self.pool)
            .await?;
        Ok(dims.map(|d| d as usize))
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn create_collection(&self, name: &str, dims: usize) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            "INSERT INTO collections (name, dims, created_at) VALUES (?, ?, ?) ON CONFLICT(name) DO NOTHING",
        )
        .bind(name)
        .bind(dims as i64)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn has_collection(&self, name: &str) -> Result<bool> {
        Ok(self.dims_of(name).await?.is_some())
    }

    async fn insert(&self, collection: &str, records: Vec<NewRecord>) -> Result<Vec<String>> {
        let dims = self
            .dims_of(collection)
            .await?
            .with_context(|| format!("collection not found: {}", collection))?;

        if let Some(bad) = records.iter().find(|r| r.vector.len() != dims) {
            bail!(
                "vector has {} dims, collection {} expects {}",
                bad.vector.len(),
                collection,
                dims
            );
        }

        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(records.len());

        for record in &records {
            let id = Uuid::new_v4().to_string();
            let metadata_json = serde_json::to_string(&record.passage.metadata)?;
            sqlx::query(
                r#"
                INSERT INTO records (id, collection, passage_index, start_offset, text, metadata_json, vector)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&id)
            .bind(collection)
            .bind(record.passage.index as i64)
            .bind(record.passage.start as i64)
            .bind(&record.passage.text)
            .bind(&metadata_json)
            .bind(vec_to_blob(&record.vector))
            .execute(&mut *tx)
            .await?;
            ids.push(id);
        }

        tx.commit().await?;
        Ok(ids)
    }

    async fn search(&self, collection: &str, query: &[f32], k: usize) -> Result<Vec<ScoredRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, passage_index, start_offset, text, metadata_json, vector
            FROM records
            WHERE collection = ?
            ORDER BY seq ASC
            "#,
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;

        let mut candidates = Vec::with_capacity(rows.len());
        for row in &rows {
            let blob: Vec<u8> = row.get("vector");
            let metadata_json: String = row.get("metadata_json");
            let metadata: UnitMetadata = serde_json::from_str(&metadata_json)
                .with_context(|| format!("corrupt metadata in collection {}", collection))?;
            let passage_index: i64 = row.get("passage_index");
            let start_offset: i64 = row.get("start_offset");

            candidates.push(ScoredRecord {
                id: row.get("id"),
                passage: Passage {
                    text: row.get("text"),
                    index: passage_index as usize,
                    start: start_offset as usize,
                    metadata,
                },
                score: cosine_similarity(query, &blob_to_vec(&blob)) as f64,
            });
        }

        rank(&mut candidates, k);
        Ok(candidates)
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE collection = ?")
            .bind(collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(n as usize)
    }

    async fn drop_collection(&self, name: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM records WHERE collection = ?")
            .bind(name)
            .execute(&mut *tx)
            .await?;
        let dropped = sqlx::query("DELETE FROM collections WHERE name = ?")
            .bind(name)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(dropped > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qa_harness_core::models::{SessionId, UnitKind};
    use tempfile::TempDir;

    fn record(session: &SessionId, text: &str, index: usize, vector: Vec<f32>) -> NewRecord {
        NewRecord {
            passage: Passage {
                text: text.to_string(),
                index,
                start: index * 10,
                metadata: UnitMetadata::new("notes.txt", session, UnitKind::Document),
            },
            vector,
        }
    }

    async fn open_store(tmp: &TempDir) -> SqliteVectorStore {
        SqliteVectorStore::open(&tmp.path().join("data").join("vectors.sqlite"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_insert_search_and_drop() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        let session = SessionId::parse("s1").unwrap();
        let name = session.collection_name();

        store.create_collection(&name, 2).await.unwrap();
        store.create_collection(&name, 2).await.unwrap();
        let ids = store
            .insert(
                &name,
                vec![
                    record(&session, "east", 0, vec![1.0, 0.0]),
                    record(&session, "north", 1, vec![0.0, 1.0]),
                    record(&session, "north-east", 2, vec![0.7, 0.7]),
                ],
            )
            .await
            .unwrap();
        assert_eq!(ids.len(), 3);
        assert_eq!(store.count(&name).await.unwrap(), 3);

        let hits = store.search(&name, &[0.0, 1.0], 2).await.unwrap();
        let texts: Vec<&str> = hits.iter().map(|h| h.passage.text.as_str()).collect();
        assert_eq!(texts, vec!["north", "north-east"]);
        assert_eq!(hits[0].passage.metadata.source, "notes.txt");
        assert_eq!(hits[0].passage.start, 10);

        assert!(store.drop_collection(&name).await.unwrap());
        assert!(!store.drop_collection(&name).await.unwrap());
        assert!(!store.has_collection(&name).await.unwrap());
        assert!(store.search(&name, &[0.0, 1.0], 2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ties_keep_insertion_order() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        let session = SessionId::parse("ties").unwrap();
        let name = session.collection_name();
        store.create_collection(&name, 2).await.unwrap();
        store
            .insert(
                &name,
                vec![
                    record(&session, "first", 0, vec![1.0, 0.0]),
                    record(&session, "second", 1, vec![1.0, 0.0]),
                ],
            )
            .await
            .unwrap();

        let hits = store.search(&name, &[1.0, 0.0], 5).await.unwrap();
        assert_eq!(hits[0].passage.text, "first");
        assert_eq!(hits[1].passage.text, "second");
    }

    #[tokio::test]
    async fn test_insert_rejects_wrong_dims_and_missing_collection() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        let session = SessionId::parse("dims").unwrap();
        let name = session.collection_name();

        assert!(store
            .insert(&name, vec![record(&session, "x", 0, vec![1.0, 0.0])])
            .await
            .is_err());

        store.create_collection(&name, 3).await.unwrap();
        assert!(store
            .insert(&name, vec![record(&session, "x", 0, vec![1.0, 0.0])])
            .await
            .is_err());
        assert_eq!(store.count(&name).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_collections_are_isolated_and_persist() {
        let tmp = TempDir::new().unwrap();
        let a = SessionId::parse("a").unwrap();
        let b = SessionId::parse("b").unwrap();
        {
            let store = open_store(&tmp).await;
            for s in [&a, &b] {
                store.create_collection(&s.collection_name(), 2).await.unwrap();
                store
                    .insert(
                        &s.collection_name(),
                        vec![record(s, s.as_str(), 0, vec![1.0, 0.0])],
                    )
                    .await
                    .unwrap();
            }
            store.drop_collection(&a.collection_name()).await.unwrap();
        }

        let store = open_store(&tmp).await;
        assert_eq!(store.count(&a.collection_name()).await.unwrap(), 0);
        let hits = store
            .search(&b.collection_name(), &[1.0, 0.0], 3)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].passage.text, "b");
    }
}
