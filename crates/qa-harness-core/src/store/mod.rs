//! Vector storage abstraction for QA Harness.
//!
//! The [`VectorStore`] trait is the only view the pipeline has of the
//! vector database: named collections of embedded passages, appended to and
//! searched by similarity, dropped as a whole on session teardown.
//!
//! Implementations must be `Send + Sync`; one handle is shared by every
//! concurrent request.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::Passage;

/// A passage and its embedding, ready for insertion.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub passage: Passage,
    pub vector: Vec<f32>,
}

/// A stored passage returned from a similarity search.
#[derive(Debug, Clone)]
pub struct ScoredRecord {
    /// Store-generated record id (UUID v4).
    pub id: String,
    pub passage: Passage,
    /// Cosine similarity to the query vector.
    pub score: f64,
}

/// Abstract vector database.
///
/// Records are never updated in place; re-ingesting a file appends new
/// records.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`create_collection`](VectorStore::create_collection) | Create a collection if absent (idempotent) |
/// | [`has_collection`](VectorStore::has_collection) | Check whether a collection exists |
/// | [`insert`](VectorStore::insert) | Append records, preserving their order |
/// | [`search`](VectorStore::search) | Top-k cosine search, most similar first |
/// | [`count`](VectorStore::count) | Number of records in a collection |
/// | [`drop_collection`](VectorStore::drop_collection) | Delete a collection and all its records |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create `name` with vectors of `dims` length. No-op if it exists.
    async fn create_collection(&self, name: &str, dims: usize) -> Result<()>;

    async fn has_collection(&self, name: &str) -> Result<bool>;

    /// Append records and return their generated ids, in input order.
    ///
    /// Fails if the collection does not exist or a vector has the wrong
    /// dimensionality.
    async fn insert(&self, collection: &str, records: Vec<NewRecord>) -> Result<Vec<String>>;

    /// Return at most `k` records ranked by similarity to `query`.
    ///
    /// Ties keep insertion order. An absent collection yields an empty list.
    async fn search(&self, collection: &str, query: &[f32], k: usize) -> Result<Vec<ScoredRecord>>;

    /// Record count; `0` for an absent collection.
    async fn count(&self, collection: &str) -> Result<usize>;

    /// Drop the collection. Returns `false` if it did not exist.
    async fn drop_collection(&self, name: &str) -> Result<bool>;
}

/// Sort candidates by descending score, keeping insertion order for ties.
pub fn rank(candidates: &mut Vec<ScoredRecord>, k: usize) {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates.truncate(k);
}
