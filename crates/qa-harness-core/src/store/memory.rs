//! In-memory [`VectorStore`] implementation for tests and offline runs.
//!
//! Collections live in a `HashMap` behind `std::sync::RwLock`. Search is
//! brute-force cosine similarity over every vector in the collection.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use uuid::Uuid;

use crate::embedding::cosine_similarity;
use crate::models::Passage;

use super::{rank, NewRecord, ScoredRecord, VectorStore};

struct StoredVector {
    id: String,
    passage: Passage,
    vector: Vec<f32>,
}

struct Collection {
    dims: usize,
    records: Vec<StoredVector>,
}

/// In-memory vector store.
#[derive(Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Collection>>> {
        self.collections
            .read()
            .map_err(|_| anyhow!("in-memory vector store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Collection>>> {
        self.collections
            .write()
            .map_err(|_| anyhow!("in-memory vector store lock poisoned"))
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn create_collection(&self, name: &str, dims: usize) -> Result<()> {
        self.write()?
            .entry(name.to_string())
            .or_insert_with(|| Collection {
                dims,
                records: Vec::new(),
            });
        Ok(())
    }

    async fn has_collection(&self, name: &str) -> Result<bool> {
        Ok(self.read()?.contains_key(name))
    }

    async fn insert(&self, collection: &str, records: Vec<NewRecord>) -> Result<Vec<String>> {
        let mut collections = self.write()?;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| anyhow!("collection not found: {}", collection))?;

        if let Some(bad) = records.iter().find(|r| r.vector.len() != target.dims) {
            bail!(
                "vector has {} dims, collection {} expects {}",
                bad.vector.len(),
                collection,
                target.dims
            );
        }

        let mut ids = Vec::with_capacity(records.len());
        for record in records {
            let id = Uuid::new_v4().to_string();
            ids.push(id.clone());
            target.records.push(StoredVector {
                id,
                passage: record.passage,
                vector: record.vector,
            });
        }
        Ok(ids)
    }

    async fn search(&self, collection: &str, query: &[f32], k: usize) -> Result<Vec<ScoredRecord>> {
        let collections = self.read()?;
        let Some(target) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut candidates: Vec<ScoredRecord> = target
            .records
            .iter()
            .map(|sv| ScoredRecord {
                id: sv.id.clone(),
                passage: sv.passage.clone(),
                score: cosine_similarity(query, &sv.vector) as f64,
            })
            .collect();
        rank(&mut candidates, k);
        Ok(candidates)
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        Ok(self
            .read()?
            .get(collection)
            .map(|c| c.records.len())
            .unwrap_or(0))
    }

    async fn drop_collection(&self, name: &str) -> Result<bool> {
        Ok(self.write()?.remove(name).is_some())
    }
}
