//! HTTP transport.
//!
//! Thin JSON API over [`QaService`]. Every session-scoped route reads the
//! session token from the `X-Session-ID` header.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/health` | Health check (returns version) |
//! | `POST` | `{prefix}/ingestion/upload` | Multipart upload, field `files`; per-file reports |
//! | `POST` | `{prefix}/generation/test-cases` | `{ "query": ... }` → list of test cases |
//! | `POST` | `{prefix}/generation/script` | `{ "test_case": {...} }` → `{ script, test_id }` |
//! | `DELETE` | `{prefix}/session/cleanup` | Tear the session down |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "unsupported_format", "message": "unsupported file format: '.docx'" } }
//! ```
//!
//! Error codes: `bad_request` (400), `invalid_session` (400), `unsupported_format` (415),
//! `conversion_failed` (422), `generation_parse` (502), `upstream_error` (502),
//! `internal` (500).

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use qa_harness_core::{RagError, TestCase};

use crate::config::Config;
use crate::ingest::{IngestReport, SourceFile};
use crate::service::QaService;

/// Header carrying the session token (`X-Session-ID`; header names are case-insensitive).
pub const SESSION_HEADER: &str = "x-session-id";

const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

#[derive(Clone)]
struct AppState {
    service: Arc<QaService>,
}

/// Build the pipeline from `config` and serve until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let service = Arc::new(QaService::from_config(config).await?);
    let app = router(service, &config.server.api_prefix);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, prefix = %config.server.api_prefix, "server listening");
    axum::serve(listener, app).await?;

    Ok(())
}

/// All routes, with API routes nested under `api_prefix`.
pub fn router(service: Arc<QaService>, api_prefix: &str) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        .route("/ingestion/upload", post(handle_upload))
        .route("/generation/test-cases", post(handle_test_cases))
        .route("/generation/script", post(handle_script))
        .route("/session/cleanup", delete(handle_cleanup));

    let prefix = api_prefix.trim_end_matches('/');
    let app = Router::new().route("/health", get(handle_health));
    let app = if prefix.is_empty() {
        app.merge(api)
    } else {
        app.nest(prefix, api)
    };

    app.layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .with_state(AppState { service })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        let (status, code) = match &err {
            RagError::InvalidSession(_) => (StatusCode::BAD_REQUEST, "invalid_session"),
            RagError::UnsupportedFormat { .. } => {
                (StatusCode::UNSUPPORTED_MEDIA_TYPE, "unsupported_format")
            }
            RagError::Conversion { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "conversion_failed"),
            RagError::GenerationParse { .. } => (StatusCode::BAD_GATEWAY, "generation_parse"),
            RagError::Upstream { .. } => (StatusCode::BAD_GATEWAY, "upstream_error"),
            RagError::Internal(_) | RagError::Io(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        };
        if status.is_server_error() {
            tracing::error!(error = %err, "request failed");
        }
        AppError {
            status,
            code,
            message: err.to_string(),
        }
    }
}

fn session_id(headers: &HeaderMap) -> Result<String, AppError> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| bad_request("missing X-Session-ID header"))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /ingestion/upload ============

async fn handle_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<Vec<IngestReport>>, AppError> {
    let session = session_id(&headers)?;

    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {}", e)))?
    {
        if field.name() != Some("files") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(format!("failed to read {}: {}", filename, e)))?;
        files.push(SourceFile::new(filename, bytes.to_vec()));
    }
    if files.is_empty() {
        return Err(bad_request("no files in multipart field 'files'"));
    }

    tracing::info!(session = %session, files = files.len(), "upload received");
    let reports = state.service.ingest_batch(files, &session).await?;
    Ok(Json(reports))
}

// ============ POST /generation/test-cases ============

#[derive(Deserialize)]
struct TestCaseRequest {
    query: String,
}

async fn handle_test_cases(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<TestCaseRequest>,
) -> Result<Json<Vec<TestCase>>, AppError> {
    let session = session_id(&headers)?;
    let cases = state
        .service
        .generate_test_cases(&request.query, &session)
        .await?;
    Ok(Json(cases))
}

// ============ POST /generation/script ============

#[derive(Deserialize)]
struct ScriptRequest {
    test_case: serde_json::Value,
}

#[derive(Serialize)]
struct ScriptResponse {
    script: String,
    test_id: String,
}

async fn handle_script(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ScriptRequest>,
) -> Result<Json<ScriptResponse>, AppError> {
    let session = session_id(&headers)?;
    let generated = state
        .service
        .generate_script(&request.test_case, &session)
        .await?;
    Ok(Json(ScriptResponse {
        script: generated.script,
        test_id: generated.test_id,
    }))
}

// ============ DELETE /session/cleanup ============

#[derive(Serialize)]
struct CleanupResponse {
    status: String,
    message: String,
}

async fn handle_cleanup(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<CleanupResponse>, AppError> {
    let session = session_id(&headers)?;
    state.service.teardown(&session).await?;
    Ok(Json(CleanupResponse {
        status: "success".to_string(),
        message: format!("Session {} cleaned up", session),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use qa_harness_core::Upstream;

    #[test]
    fn test_error_mapping() {
        let cases = [
            (
                RagError::InvalidSession("../x".to_string()),
                StatusCode::BAD_REQUEST,
                "invalid_session",
            ),
            (
                RagError::UnsupportedFormat {
                    extension: ".docx".to_string(),
                },
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "unsupported_format",
            ),
            (
                RagError::GenerationParse {
                    reason: "invalid JSON".to_string(),
                    raw: "oops".to_string(),
                },
                StatusCode::BAD_GATEWAY,
                "generation_parse",
            ),
            (
                RagError::upstream(Upstream::Llm, "HTTP 503"),
                StatusCode::BAD_GATEWAY,
                "upstream_error",
            ),
            (
                RagError::Internal("missing prompt variable: context".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
            ),
        ];
        for (err, status, code) in cases {
            let app_err = AppError::from(err);
            assert_eq!(app_err.status, status);
            assert_eq!(app_err.code, code);
        }
    }

    #[test]
    fn test_session_header_required() {
        let mut headers = HeaderMap::new();
        assert_eq!(session_id(&headers).unwrap_err().status, StatusCode::BAD_REQUEST);
        headers.insert(SESSION_HEADER, "abc".parse().unwrap());
        assert_eq!(session_id(&headers).unwrap(), "abc");
    }
}
