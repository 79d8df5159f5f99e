//! Chat-completions language-model backends.
//!
//! Groq, OpenAI, and Ollama all speak the OpenAI `POST /chat/completions`
//! protocol, so one client covers them; only the base URL and API-key
//! variable differ. The key is read from the environment at call time so a
//! long-running server picks up rotated credentials.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use qa_harness_core::llm::LanguageModel;

use crate::config::LlmConfig;

/// Build the language model named by `config.provider`.
pub fn create_model(config: &LlmConfig) -> Result<Arc<dyn LanguageModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledModel)),
        "groq" | "openai" | "ollama" => Ok(Arc::new(ChatCompletionsModel::new(config))),
        other => bail!("Unknown llm provider: {}", other),
    }
}

/// Client for an OpenAI-compatible chat-completions endpoint.
pub struct ChatCompletionsModel {
    base_url: String,
    model: String,
    api_key_env: Option<String>,
    temperature: f32,
    timeout: Duration,
}

impl ChatCompletionsModel {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            base_url: config.resolved_base_url(),
            model: config.model.clone(),
            api_key_env: config.resolved_api_key_env(),
            temperature: config.temperature,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    fn request_body(&self, prompt: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                { "role": "user", "content": prompt }
            ],
        })
    }
}

#[async_trait]
impl LanguageModel for ChatCompletionsModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        // TODO: share one reqwest::Client across calls once the server owns a single model handle.
        let client = reqwest::Client::builder().timeout(self.timeout).build()?;

        let mut request = client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&self.request_body(prompt));

        if let Some(var) = &self.api_key_env {
            let key = std::env::var(var)
                .map_err(|_| anyhow!("{} environment variable not set", var))?;
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("chat completions error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        parse_completion(&json)
    }
}

/// Extract `choices[0].message.content`.
fn parse_completion(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Invalid chat completions response: missing choices[0].message.content"))
}

/// Placeholder used when `[llm].provider = "disabled"`; every call fails.
pub struct DisabledModel;

#[async_trait]
impl LanguageModel for DisabledModel {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, _prompt: &str) -> Result<String> {
        bail!("language model is disabled; set [llm].provider in config")
    }
}
