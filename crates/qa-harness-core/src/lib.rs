//! # QA Harness Core
//!
//! Shared, runtime-free logic for QA Harness: data models, the error
//! taxonomy, the overlapping text chunker, prompt templates, model-output
//! cleanup, and the traits behind which embedding, vector storage, and
//! language-model backends are plugged in.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or network code.
//! Concrete backends live in the `qa-harness` application crate; the
//! deterministic [`embedding::HashingEmbedder`] and the
//! [`store::memory::InMemoryVectorStore`] live here so tests and offline
//! setups need nothing else.

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod llm;
pub mod models;
pub mod output;
pub mod prompts;
pub mod store;

pub use error::{RagError, Upstream};
pub use models::{DocumentUnit, Passage, SessionId, TestCase, TestType, UnitKind, UnitMetadata};
