//! Test-case and script generation.
//!
//! Both operations are single-shot: assemble context from the session,
//! render a fixed prompt, call the model once, and clean or parse the
//! answer. Failures are returned to the caller without retry.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use qa_harness_core::llm::LanguageModel;
use qa_harness_core::models::test_id_of;
use qa_harness_core::output::{clean_script, parse_test_cases};
use qa_harness_core::prompts::{PromptTemplate, SELENIUM_SCRIPT_PROMPT, TEST_CASE_PROMPT};
use qa_harness_core::{Passage, RagError, SessionId, TestCase, Upstream};

use crate::retrieve::Retriever;
use crate::session::SessionStore;

/// Query used to find page markup when the session has no stored HTML asset.
pub const HTML_FALLBACK_QUERY: &str = "checkout.html HTML structure form inputs buttons";

/// Where a script's page markup came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HtmlSource {
    /// Full HTML files stored in the session asset directory.
    Assets,
    /// Similarity search over the collection with [`HTML_FALLBACK_QUERY`].
    SimilarityFallback,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneratedScript {
    pub test_id: String,
    pub script: String,
    pub html_source: HtmlSource,
}

pub struct Generator {
    retriever: Retriever,
    sessions: Arc<SessionStore>,
    model: Arc<dyn LanguageModel>,
    test_case_k: usize,
    script_k: usize,
}

impl Generator {
    pub fn new(
        retriever: Retriever,
        sessions: Arc<SessionStore>,
        model: Arc<dyn LanguageModel>,
        test_case_k: usize,
        script_k: usize,
    ) -> Self {
        Self {
            retriever,
            sessions,
            model,
            test_case_k,
            script_k,
        }
    }

    /// Generate test cases for `query` from the session's documents.
    ///
    /// An empty session still reaches the model with empty context.
    pub async fn generate_test_cases(&self, query: &str, session: &SessionId) -> Result<Vec<TestCase>, RagError> {
        tracing::info!(session = %session, query, "generating test cases");

        let passages = self
            .retriever
            .top_k(&session.collection_name(), query, self.test_case_k)
            .await?;
        let context = format_context(&passages);

        let prompt = render(&TEST_CASE_PROMPT, &[("context", context.as_str()), ("question", query)])?;
        let raw = self.complete(&prompt).await?;

        let cases = parse_test_cases(&raw)?;
        tracing::info!(session = %session, count = cases.len(), "generated test cases");
        Ok(cases)
    }

    /// Generate a browser-automation script for one caller-supplied test case.
    pub async fn generate_script(&self, test_case: &Value, session: &SessionId) -> Result<GeneratedScript, RagError> {
        let test_id = test_id_of(test_case).to_string();
        tracing::info!(session = %session, test_id = %test_id, "generating script");
        let collection = session.collection_name();

        let (html_context, html_source) = match self.read_html_assets(session).await? {
            Some(html) => (html, HtmlSource::Assets),
            None => {
                tracing::warn!(session = %session, "no HTML assets stored, falling back to similarity search");
                let texts = self
                    .retriever
                    .similarity_search_by_text(&collection, HTML_FALLBACK_QUERY, self.script_k)
                    .await?;
                (texts.join("\n\n"), HtmlSource::SimilarityFallback)
            }
        };

        let doc_context = self
            .retriever
            .similarity_search_by_text(&collection, &test_case.to_string(), self.script_k)
            .await?
            .join("\n\n");

        let pretty = serde_json::to_string_pretty(test_case).map_err(|e| RagError::GenerationParse {
            reason: format!("test case is not serialisable: {}", e),
            raw: test_case.to_string(),
        })?;
        let prompt = render(
            &SELENIUM_SCRIPT_PROMPT,
            &[
                ("test_case", pretty.as_str()),
                ("html_context", html_context.as_str()),
                ("doc_context", doc_context.as_str()),
            ],
        )?;

        let raw = self.complete(&prompt).await?;
        Ok(GeneratedScript {
            test_id,
            script: clean_script(&raw),
            html_source,
        })
    }

    async fn complete(&self, prompt: &str) -> Result<String, RagError> {
        self.model
            .complete(prompt)
            .await
            .map_err(|e| RagError::upstream(Upstream::Llm, e))
    }

    /// Concatenate every stored `.html` asset, each behind a file marker.
    /// Unreadable files are logged and skipped.
    async fn read_html_assets(&self, session: &SessionId) -> Result<Option<String>, RagError> {
        let paths = self.sessions.collect_assets(session, ".html").await?;
        let mut html = String::new();
        for path in paths {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            match tokio::fs::read_to_string(&path).await {
                Ok(content) => {
                    html.push_str(&format!("\n\n--- FILE: {} ---\n{}", name, content));
                }
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "failed to read HTML asset");
                }
            }
        }
        Ok((!html.is_empty()).then_some(html))
    }
}

/// The model is never reached when a template fails to render.
fn render(template: &PromptTemplate, values: &[(&str, &str)]) -> Result<String, RagError> {
    template
        .render(values)
        .map_err(|e| RagError::Internal(format!("prompt rendering failed: {}", e)))
}

/// Label each passage with its source so the model can fill `grounded_in`.
fn format_context(passages: &[Passage]) -> String {
    passages
        .iter()
        .map(|p| format!("[source: {}]\n{}", p.metadata.source, p.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}
