//! Session-scoped similarity retrieval.

use std::collections::HashSet;
use std::sync::Arc;

use qa_harness_core::embedding::{embed_query, Embedder};
use qa_harness_core::store::{ScoredRecord, VectorStore};
use qa_harness_core::{Passage, RagError, Upstream};

/// Embeds a query and searches one collection.
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    vectors: Arc<dyn VectorStore>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, vectors: Arc<dyn VectorStore>) -> Self {
        Self { embedder, vectors }
    }

    /// Up to `k` passages, most similar first, with no record returned twice.
    ///
    /// An absent or empty collection yields an empty list.
    pub async fn top_k(&self, collection: &str, query: &str, k: usize) -> Result<Vec<Passage>, RagError> {
        Ok(self
            .search(collection, query, k)
            .await?
            .into_iter()
            .map(|r| r.passage)
            .collect())
    }

    /// Raw-text variant of [`top_k`](Self::top_k): passage texts only.
    pub async fn similarity_search_by_text(
        &self,
        collection: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<String>, RagError> {
        Ok(self
            .search(collection, query, k)
            .await?
            .into_iter()
            .map(|r| r.passage.text)
            .collect())
    }

    async fn search(&self, collection: &str, query: &str, k: usize) -> Result<Vec<ScoredRecord>, RagError> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let vector = embed_query(self.embedder.as_ref(), query)
            .await
            .map_err(|e| RagError::upstream(Upstream::Embedding, e))?;
        let hits = self
            .vectors
            .search(collection, &vector, k)
            .await
            .map_err(|e| RagError::upstream(Upstream::VectorStore, e))?;

        let mut seen = HashSet::new();
        let hits: Vec<ScoredRecord> = hits.into_iter().filter(|r| seen.insert(r.id.clone())).collect();
        tracing::debug!(collection, k, hits = hits.len(), "retrieved");
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qa_harness_core::embedding::HashingEmbedder;
    use qa_harness_core::models::{SessionId, UnitKind, UnitMetadata};
    use qa_harness_core::store::memory::InMemoryVectorStore;
    use qa_harness_core::store::NewRecord;

    async fn seeded(texts: &[&str]) -> (Retriever, String) {
        let embedder = Arc::new(HashingEmbedder::new(128));
        let store = Arc::new(InMemoryVectorStore::new());
        let session = SessionId::parse("r").unwrap();
        let name = session.collection_name();
        store.create_collection(&name, 128).await.unwrap();

        let owned: Vec<String> = texts.iter().map(|t| t.to_string()).collect();
        let vectors = embedder.embed(&owned).await.unwrap();
        let records = owned
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(i, (text, vector))| NewRecord {
                passage: Passage {
                    text,
                    index: i,
                    start: 0,
                    metadata: UnitMetadata::new("doc.txt", &session, UnitKind::Document),
                },
                vector,
            })
            .collect();
        store.insert(&name, records).await.unwrap();
        (Retriever::new(embedder, store), name)
    }

    #[tokio::test]
    async fn test_top_k_ranks_by_similarity() {
        let (retriever, name) = seeded(&[
            "shipping is free over fifty dollars",
            "discount code SAVE15 gives fifteen percent off",
            "the footer shows the copyright",
        ])
        .await;

        let hits = retriever.top_k(&name, "discount code", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].text.contains("SAVE15"));
    }

    #[tokio::test]
    async fn test_absent_collection_is_empty() {
        let (retriever, _) = seeded(&["anything"]).await;
        assert!(retriever.top_k("session_nobody", "q", 5).await.unwrap().is_empty());
        assert!(retriever
            .similarity_search_by_text("session_nobody", "q", 3)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_k_larger_than_collection() {
        let (retriever, name) = seeded(&["one", "two"]).await;
        assert_eq!(retriever.top_k(&name, "one", 10).await.unwrap().len(), 2);
        assert!(retriever.top_k(&name, "one", 0).await.unwrap().is_empty());
    }
}
