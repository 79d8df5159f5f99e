//! The pipeline facade consumed by the HTTP server and the CLI.
//!
//! [`QaService`] wires the converter registry, chunker, embedder, vector
//! store, session store, and language model together. Session tokens enter
//! as raw strings and are validated here before any I/O happens.

use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;

use qa_harness_core::chunk::Chunker;
use qa_harness_core::embedding::Embedder;
use qa_harness_core::llm::LanguageModel;
use qa_harness_core::store::memory::InMemoryVectorStore;
use qa_harness_core::store::VectorStore;
use qa_harness_core::{RagError, SessionId, TestCase};

use crate::config::Config;
use crate::convert::ConverterRegistry;
use crate::embedding::create_embedder;
use crate::generate::{GeneratedScript, Generator};
use crate::ingest::{IngestReport, Ingestor, SourceFile};
use crate::llm::create_model;
use crate::retrieve::Retriever;
use crate::session::{SessionStore, TeardownOutcome};
use crate::sqlite_store::SqliteVectorStore;

pub struct QaService {
    sessions: Arc<SessionStore>,
    ingestor: Ingestor,
    generator: Generator,
}

impl QaService {
    /// Build every backend named in `config`.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let vectors: Arc<dyn VectorStore> = match config.vector_store.backend.as_str() {
            "memory" => Arc::new(InMemoryVectorStore::new()),
            _ => Arc::new(SqliteVectorStore::open(&config.vector_store.path).await?),
        };
        let embedder = create_embedder(&config.embedding)?;
        let model = create_model(&config.llm)?;

        tracing::info!(
            backend = %config.vector_store.backend,
            embedder = embedder.model_name(),
            llm = model.model_name(),
            "pipeline ready"
        );
        Self::with_components(config, vectors, embedder, model)
    }

    /// Assemble the pipeline around caller-supplied backends.
    pub fn with_components(
        config: &Config,
        vectors: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn LanguageModel>,
    ) -> Result<Self> {
        let chunker = Chunker::new(config.chunking.max_chars, config.chunking.overlap_chars)?;
        let sessions = Arc::new(SessionStore::new(config.sessions.root.clone(), vectors.clone()));
        let retriever = Retriever::new(embedder.clone(), vectors);

        let ingestor = Ingestor::new(
            ConverterRegistry::with_builtins(),
            chunker,
            embedder,
            sessions.clone(),
        );
        let generator = Generator::new(
            retriever,
            sessions.clone(),
            model,
            config.retrieval.test_case_k,
            config.retrieval.script_k,
        );

        Ok(Self {
            sessions,
            ingestor,
            generator,
        })
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub async fn ingest(&self, file: SourceFile, session_id: &str) -> Result<usize, RagError> {
        let session = SessionId::parse(session_id)?;
        self.ingestor.ingest(file, &session).await
    }

    pub async fn ingest_batch(
        &self,
        files: Vec<SourceFile>,
        session_id: &str,
    ) -> Result<Vec<IngestReport>, RagError> {
        let session = SessionId::parse(session_id)?;
        Ok(self.ingestor.ingest_batch(files, &session).await)
    }

    pub async fn generate_test_cases(&self, query: &str, session_id: &str) -> Result<Vec<TestCase>, RagError> {
        let session = SessionId::parse(session_id)?;
        self.generator.generate_test_cases(query, &session).await
    }

    pub async fn generate_script(&self, test_case: &Value, session_id: &str) -> Result<GeneratedScript, RagError> {
        let session = SessionId::parse(session_id)?;
        self.generator.generate_script(test_case, &session).await
    }

    pub async fn teardown(&self, session_id: &str) -> Result<TeardownOutcome, RagError> {
        let session = SessionId::parse(session_id)?;
        self.sessions.teardown(&session).await
    }
}
