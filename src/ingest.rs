//! Ingestion pipeline orchestration.
//!
//! Coordinates one upload: converter lookup → (HTML) raw asset persistence →
//! conversion → chunking → embedding → insertion into the session's
//! collection. Records are appended in derivation order; nothing is rolled
//! back if a later step fails.

use std::sync::Arc;

use serde::Serialize;

use qa_harness_core::chunk::Chunker;
use qa_harness_core::embedding::Embedder;
use qa_harness_core::store::NewRecord;
use qa_harness_core::{RagError, SessionId, Upstream};

use crate::convert::ConverterRegistry;
use crate::session::{asset_name, SessionStore};

/// An uploaded file.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl SourceFile {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestStatus {
    Success,
    Error,
}

/// Per-file result of a batch upload.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub filename: String,
    pub status: IngestStatus,
    pub chunks_count: usize,
    pub message: String,
}

pub struct Ingestor {
    converters: ConverterRegistry,
    chunker: Chunker,
    embedder: Arc<dyn Embedder>,
    sessions: Arc<SessionStore>,
}

impl Ingestor {
    pub fn new(
        converters: ConverterRegistry,
        chunker: Chunker,
        embedder: Arc<dyn Embedder>,
        sessions: Arc<SessionStore>,
    ) -> Self {
        Self {
            converters,
            chunker,
            embedder,
            sessions,
        }
    }

    /// Ingest one file into `session_id` and return the number of passages stored.
    ///
    /// A file yielding no passages is a success with `0`.
    pub async fn ingest(&self, file: SourceFile, session_id: &SessionId) -> Result<usize, RagError> {
        let converter = self.converters.find(&file.filename)?;
        // Passage sources and stored assets share the bare file name.
        let filename = asset_name(&file.filename)?.to_string();
        let session = self.sessions.get_or_create(session_id).await;
        let _guard = session.write_lock.lock().await;

        if converter.persists_raw() {
            self.sessions
                .persist_asset(&session, &filename, &file.bytes)
                .await?;
        }

        let name = filename.clone();
        let owner = session_id.clone();
        let units = tokio::task::spawn_blocking(move || converter.load(&name, &file.bytes, &owner))
            .await
            .map_err(|e| RagError::Conversion {
                filename: filename.clone(),
                reason: format!("converter task failed: {}", e),
            })??;

        let passages = self.chunker.split(&units);
        if passages.is_empty() {
            tracing::warn!(session = %session_id, file = %filename, "no content extracted");
            return Ok(0);
        }

        let texts: Vec<String> = passages.iter().map(|p| p.text.clone()).collect();
        let vectors = self
            .embedder
            .embed(&texts)
            .await
            .map_err(|e| RagError::upstream(Upstream::Embedding, e))?;
        if vectors.len() != passages.len() {
            return Err(RagError::upstream(
                Upstream::Embedding,
                format!(
                    "{} vectors returned for {} passages",
                    vectors.len(),
                    passages.len()
                ),
            ));
        }

        let store = self.sessions.vectors();
        store
            .create_collection(&session.collection, self.embedder.dims())
            .await
            .map_err(|e| RagError::upstream(Upstream::VectorStore, e))?;

        let records: Vec<NewRecord> = passages
            .into_iter()
            .zip(vectors)
            .map(|(passage, vector)| NewRecord { passage, vector })
            .collect();
        let ids = store
            .insert(&session.collection, records)
            .await
            .map_err(|e| RagError::upstream(Upstream::VectorStore, e))?;

        tracing::info!(
            session = %session_id,
            file = %filename,
            chunks = ids.len(),
            "ingested"
        );
        Ok(ids.len())
    }

    /// Ingest every file, reporting each outcome separately. One failing
    /// file never prevents the others from being ingested.
    pub async fn ingest_batch(&self, files: Vec<SourceFile>, session_id: &SessionId) -> Vec<IngestReport> {
        let mut reports = Vec::with_capacity(files.len());
        for file in files {
            let filename = file.filename.clone();
            let report = match self.ingest(file, session_id).await {
                Ok(0) => IngestReport {
                    filename,
                    status: IngestStatus::Success,
                    chunks_count: 0,
                    message: "No content extracted".to_string(),
                },
                Ok(n) => IngestReport {
                    filename,
                    status: IngestStatus::Success,
                    chunks_count: n,
                    message: "Successfully ingested".to_string(),
                },
                Err(e) => {
                    tracing::error!(session = %session_id, file = %filename, error = %e, "ingest failed");
                    IngestReport {
                        filename,
                        status: IngestStatus::Error,
                        chunks_count: 0,
                        message: e.to_string(),
                    }
                }
            };
            reports.push(report);
        }
        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use qa_harness_core::embedding::HashingEmbedder;
    use qa_harness_core::store::memory::InMemoryVectorStore;
    use qa_harness_core::store::VectorStore;
    use tempfile::TempDir;
    use tokio::sync::Semaphore;

    /// Holds every `embed` call until a permit is released and records how
    /// many calls were in flight at once.
    struct GatedEmbedder {
        inner: HashingEmbedder,
        gate: Semaphore,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl GatedEmbedder {
        fn new() -> Self {
            Self {
                inner: HashingEmbedder::new(32),
                gate: Semaphore::new(0),
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Embedder for GatedEmbedder {
        fn model_name(&self) -> &str {
            "gated"
        }

        fn dims(&self) -> usize {
            self.inner.dims()
        }

        async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.gate.acquire().await?.forget();
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.inner.embed(texts).await
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    async fn wait_for_calls(embedder: &GatedEmbedder, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while embedder.calls() < n {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("embed call never started");
    }

    fn ingestor(tmp: &TempDir) -> (Ingestor, Arc<SessionStore>) {
        let vectors: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
        let sessions = Arc::new(SessionStore::new(tmp.path().join("sessions"), vectors));
        let ingestor = Ingestor::new(
            ConverterRegistry::with_builtins(),
            Chunker::default(),
            Arc::new(HashingEmbedder::new(32)),
            sessions.clone(),
        );
        (ingestor, sessions)
    }

    #[tokio::test]
    async fn test_unsupported_file_does_not_abort_batch() {
        let tmp = TempDir::new().unwrap();
        let (ingestor, sessions) = ingestor(&tmp);
        let id = SessionId::parse("batch").unwrap();

        let reports = ingestor
            .ingest_batch(
                vec![
                    SourceFile::new("slides.pptx", b"PK".to_vec()),
                    SourceFile::new("notes.txt", b"Checkout accepts discount codes.".to_vec()),
                    SourceFile::new("blank.txt", b"   \n".to_vec()),
                ],
                &id,
            )
            .await;

        assert_eq!(reports.len(), 3);
        assert_eq!(reports[0].status, IngestStatus::Error);
        assert!(reports[0].message.contains(".pptx"));
        assert_eq!(reports[1].status, IngestStatus::Success);
        assert_eq!(reports[1].chunks_count, 1);
        assert_eq!(reports[2].status, IngestStatus::Success);
        assert_eq!(reports[2].chunks_count, 0);

        assert_eq!(
            sessions.vectors().count(&id.collection_name()).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_html_is_persisted_verbatim() {
        let tmp = TempDir::new().unwrap();
        let (ingestor, sessions) = ingestor(&tmp);
        let id = SessionId::parse("html").unwrap();
        let html = b"<html><body><button id=\"pay\">Pay</button></body></html>".to_vec();

        let n = ingestor
            .ingest(SourceFile::new("checkout.html", html.clone()), &id)
            .await
            .unwrap();
        assert_eq!(n, 1);

        let assets: Vec<_> = sessions.list_assets(&id, ".html").collect();
        assert_eq!(assets.len(), 1);
        assert_eq!(std::fs::read(&assets[0]).unwrap(), html);
    }

    #[tokio::test]
    async fn test_reingest_appends_records() {
        let tmp = TempDir::new().unwrap();
        let (ingestor, sessions) = ingestor(&tmp);
        let id = SessionId::parse("again").unwrap();
        let file = SourceFile::new("notes.txt", b"same content".to_vec());

        ingestor.ingest(file.clone(), &id).await.unwrap();
        ingestor.ingest(file, &id).await.unwrap();
        assert_eq!(
            sessions.vectors().count(&id.collection_name()).await.unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn test_path_in_upload_name_is_reduced_to_file_name() {
        let tmp = TempDir::new().unwrap();
        let (ingestor, sessions) = ingestor(&tmp);
        let id = SessionId::parse("paths").unwrap();

        ingestor
            .ingest(
                SourceFile::new("exports/site/checkout.html", b"<form id=\"pay\"></form>".to_vec()),
                &id,
            )
            .await
            .unwrap();

        let records = sessions
            .vectors()
            .search(&id.collection_name(), &[0.0; 32], 10)
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].passage.metadata.source, "checkout.html");

        let assets = sessions.collect_assets(&id, ".html").await.unwrap();
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].file_name().unwrap(), "checkout.html");
    }

    #[tokio::test]
    async fn test_writes_stay_serialised_across_teardown() {
        let tmp = TempDir::new().unwrap();
        let vectors: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
        let sessions = Arc::new(SessionStore::new(tmp.path().join("sessions"), vectors));
        let embedder = Arc::new(GatedEmbedder::new());
        let ingestor = Arc::new(Ingestor::new(
            ConverterRegistry::with_builtins(),
            Chunker::default(),
            embedder.clone(),
            sessions.clone(),
        ));
        let id = SessionId::parse("s").unwrap();

        let spawn_ingest = |name: &'static str| {
            let ingestor = ingestor.clone();
            let id = id.clone();
            tokio::spawn(async move {
                ingestor
                    .ingest(SourceFile::new(name, b"Checkout accepts SAVE15.".to_vec()), &id)
                    .await
            })
        };

        // First writer holds the lock inside embed.
        let first = spawn_ingest("a.txt");
        wait_for_calls(&embedder, 1).await;

        // Teardown, then a second writer, queue behind it.
        let teardown = {
            let sessions = sessions.clone();
            let id = id.clone();
            tokio::spawn(async move { sessions.teardown(&id).await })
        };
        settle().await;
        let second = spawn_ingest("c.txt");
        settle().await;
        assert_eq!(embedder.calls(), 1);

        // Release the first writer: teardown runs, then the second writer
        // reaches embed and holds the lock.
        embedder.gate.add_permits(1);
        first.await.unwrap().unwrap();
        teardown.await.unwrap().unwrap();
        wait_for_calls(&embedder, 2).await;

        // A writer arriving after teardown must wait for the second one.
        let third = spawn_ingest("d.txt");
        settle().await;
        assert_eq!(embedder.calls(), 2);

        embedder.gate.add_permits(2);
        assert_eq!(second.await.unwrap().unwrap(), 1);
        assert_eq!(third.await.unwrap().unwrap(), 1);

        assert_eq!(embedder.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(
            sessions.vectors().count(&id.collection_name()).await.unwrap(),
            2
        );
    }
}
