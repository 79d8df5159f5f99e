//! # QA Harness
//!
//! Session-scoped retrieval-augmented generation for software testing.
//!
//! Project documents (PDF, Markdown, JSON, HTML, plain text) are uploaded
//! into a per-session vector collection; the session's knowledge is then
//! used to generate structured test cases and Selenium scripts with an LLM.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌────────────────┐
//! │ Converters │──▶│ Chunk+Embed  │──▶│ session_{id}   │
//! │ pdf/md/... │   │              │   │ vector store   │
//! └─────┬──────┘   └──────────────┘   └───────┬────────┘
//!       │ html                                │ top-k
//!       ▼                                     ▼
//! ┌────────────┐                      ┌────────────────┐
//! │ asset dir  │─────────────────────▶│   Generator    │──▶ test cases / script
//! └────────────┘                      └────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! qa ingest --session demo docs/product_specs.md site/checkout.html
//! qa test-cases --session demo "discount code validation"
//! qa serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`convert`] | Format-specific converters |
//! | [`session`] | Session registry, asset directory, teardown |
//! | [`ingest`] | Upload → passages → vectors |
//! | [`retrieve`] | Top-k similarity retrieval |
//! | [`generate`] | Test-case and script generation |
//! | [`service`] | Pipeline facade used by the server and CLI |
//! | [`server`] | HTTP API |
//! | [`embedding`] | Embedding providers |
//! | [`llm`] | Chat-completions client |
//! | [`sqlite_store`] | SQLite vector store |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`logging`] | `tracing` subscriber setup |

pub mod config;
pub mod convert;
pub mod db;
pub mod embedding;
pub mod generate;
pub mod ingest;
pub mod llm;
pub mod logging;
pub mod migrate;
pub mod retrieve;
pub mod server;
pub mod service;
pub mod session;
pub mod sqlite_store;
