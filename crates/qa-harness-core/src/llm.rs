//! Language-model capability.
//!
//! The pipeline only needs "prompt in, text out". Backends (OpenAI-compatible
//! chat completions, Groq) are implemented in the `qa-harness` app crate.

use anyhow::Result;
use async_trait::async_trait;

/// A single-shot text completion backend.
///
/// Implementations are expected to sample deterministically (temperature 0)
/// and hold no conversation state between calls.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Returns the model identifier (e.g. `"openai/gpt-oss-20b"`).
    fn model_name(&self) -> &str;
    /// Complete `prompt` and return the raw response text.
    async fn complete(&self, prompt: &str) -> Result<String>;
}
