//! Error taxonomy for the ingestion and generation pipeline.
//!
//! Two outcomes that look like failures are deliberately *not* errors:
//! a file that yields zero passages is reported as a successful ingestion
//! with `chunks_count = 0`, and tearing down an unknown session succeeds
//! with a `TeardownOutcome` that records nothing existed.

use std::fmt;

/// External capability that failed during a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upstream {
    Embedding,
    VectorStore,
    Llm,
}

impl fmt::Display for Upstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Upstream::Embedding => "embedding",
            Upstream::VectorStore => "vector store",
            Upstream::Llm => "llm",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by the core pipeline.
///
/// Every variant carries enough detail (offending filename, extension, or
/// raw model output) to diagnose a failure without server-side logs.
#[derive(Debug, thiserror::Error)]
pub enum RagError {
    /// The file extension has no registered converter.
    #[error("unsupported file format: '{extension}'")]
    UnsupportedFormat { extension: String },

    /// A supported format whose bytes could not be decoded.
    #[error("failed to convert {filename}: {reason}")]
    Conversion { filename: String, reason: String },

    /// The session token cannot be used as a collection or directory name.
    #[error("invalid session id '{0}': use 1-128 ASCII letters, digits, '-' or '_'")]
    InvalidSession(String),

    /// Model output could not be parsed into the expected shape.
    #[error("could not parse model output: {reason}; raw output: {raw}")]
    GenerationParse { reason: String, raw: String },

    /// An embedding, vector-store, or LLM call failed. Never retried here.
    #[error("{service} call failed: {message}")]
    Upstream { service: Upstream, message: String },

    /// A fault inside this process, such as a prompt template that fails
    /// to render or a worker task that panicked.
    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RagError {
    /// Wrap any error from an external capability.
    pub fn upstream(service: Upstream, err: impl fmt::Display) -> Self {
        RagError::Upstream {
            service,
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_diagnostic_detail() {
        let err = RagError::UnsupportedFormat {
            extension: ".docx".to_string(),
        };
        assert!(err.to_string().contains(".docx"));

        let err = RagError::GenerationParse {
            reason: "expected value".to_string(),
            raw: "Sure! Here are your tests".to_string(),
        };
        assert!(err.to_string().contains("Sure! Here are your tests"));

        let err = RagError::upstream(Upstream::Llm, "HTTP 503");
        assert_eq!(err.to_string(), "llm call failed: HTTP 503");
    }
}
