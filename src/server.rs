//! HTTP server exposing the documentation API and the MCP tool surface
//! (spec §6).
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check |
//! | `GET`  | `/info` | Index metadata (version, lang, embedding model, document count) |
//! | `POST` | `/search` | Hybrid search over the indexed documentation |
//! | `GET`  | `/topics` | Categories and topics available in this index |
//! | `GET`  | `/topics/:category/:topic` | A single topic's content |
//! | `*`    | `/:version/:lang/mcp` | Streamable-HTTP MCP transport (rmcp) |
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser-based MCP
//! clients can reach this server directly.

use std::sync::Arc;

use axum::{
    extract::{Path as AxumPath, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rmcp::transport::streamable_http_server::{
    session::local::LocalSessionManager, tower::StreamableHttpService,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::config::Settings;
use crate::document_source::DocumentSource;
use crate::hybrid_retriever::HybridRetriever;
use crate::models::IndexMetadata;
use crate::tools::{CangjieServer, InnerState};

#[derive(Clone)]
struct AppState {
    retriever: Arc<HybridRetriever>,
    docs: Arc<dyn DocumentSource>,
    metadata: Arc<IndexMetadata>,
}

/// Starts the HTTP server, mounting both the plain JSON API and the
/// streamable-HTTP MCP transport at `/{version}/{lang}/mcp`.
pub async fn run_server(
    settings: &Settings,
    retriever: HybridRetriever,
    docs: Arc<dyn DocumentSource>,
    metadata: IndexMetadata,
    inner: Arc<InnerState>,
    host: &str,
    port: u16,
) -> anyhow::Result<()> {
    let state = AppState {
        retriever: Arc::new(retriever),
        docs,
        metadata: Arc::new(metadata.clone()),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mcp_path = format!("/{}/{}/mcp", metadata.version, metadata.lang);
    let mcp_service = StreamableHttpService::new(
        move || Ok(CangjieServer::new(inner.clone())),
        LocalSessionManager::default().into(),
        Default::default(),
    );

    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/info", get(handle_info))
        .route("/search", post(handle_search))
        .route("/topics", get(handle_list_topics))
        .route("/topics/:category/:topic", get(handle_get_topic))
        .nest_service(&mcp_path, mcp_service)
        .layer(cors)
        .with_state(state);

    let bind_addr = format!("{host}:{port}");
    tracing::info!(%bind_addr, mcp_path, "cangjie-docs server listening");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
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

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError { status: StatusCode::BAD_REQUEST, code: "bad_request".to_string(), message: message.into() }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError { status: StatusCode::NOT_FOUND, code: "not_found".to_string(), message: message.into() }
}

fn internal_error(message: impl Into<String>) -> AppError {
    AppError { status: StatusCode::INTERNAL_SERVER_ERROR, code: "internal".to_string(), message: message.into() }
}

impl From<crate::error::CangjieError> for AppError {
    fn from(err: crate::error::CangjieError) -> Self {
        match &err {
            crate::error::CangjieError::NotFound(_) => not_found(err.to_string()),
            crate::error::CangjieError::ConfigError(_) => bad_request(err.to_string()),
            _ => internal_error(err.to_string()),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok".to_string() })
}

// ============ GET /info ============

#[derive(Serialize)]
struct InfoResponse {
    version: String,
    lang: String,
    embedding_model: String,
    document_count: usize,
}

async fn handle_info(State(state): State<AppState>) -> Json<InfoResponse> {
    Json(InfoResponse {
        version: state.metadata.version.clone(),
        lang: state.metadata.lang.clone(),
        embedding_model: state.metadata.embedding_model.clone(),
        document_count: state.metadata.document_count,
    })
}

// ============ POST /search ============

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default = "default_top_k")]
    top_k: usize,
    category: Option<String>,
    #[serde(default)]
    rerank: bool,
}

fn default_top_k() -> usize {
    5
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<crate::models::SearchResult>,
}

async fn handle_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }

    let results = state
        .retriever
        .search(&req.query, req.top_k, req.category.as_deref(), req.rerank)
        .await?;

    Ok(Json(SearchResponse { results }))
}

// ============ GET /topics ============

#[derive(Serialize)]
struct TopicsResponse {
    categories: std::collections::BTreeMap<String, Vec<TopicInfo>>,
}

#[derive(Serialize)]
struct TopicInfo {
    name: String,
    title: String,
}

async fn handle_list_topics(State(state): State<AppState>) -> Result<Json<TopicsResponse>, AppError> {
    let category_names = state.docs.get_categories().await?;
    let mut categories = std::collections::BTreeMap::new();
    for category in category_names {
        let topics = state.docs.get_topics_in_category(&category).await?;
        categories.insert(
            category,
            topics.into_iter().map(|(name, title)| TopicInfo { name, title }).collect(),
        );
    }
    Ok(Json(TopicsResponse { categories }))
}

// ============ GET /topics/:category/:topic ============

#[derive(Serialize)]
struct TopicContentResponse {
    content: String,
    file_path: String,
    category: String,
    topic: String,
    title: String,
}

async fn handle_get_topic(
    State(state): State<AppState>,
    AxumPath((category, topic)): AxumPath<(String, String)>,
) -> Result<Json<TopicContentResponse>, AppError> {
    let doc = state.docs.get_document_by_topic(&topic, Some(&category)).await?;
    Ok(Json(TopicContentResponse {
        content: doc.text,
        file_path: doc.metadata.file_path,
        category: doc.metadata.category,
        topic: doc.metadata.topic,
        title: doc.metadata.title,
    }))
}
