//! # cangjie-docs
//!
//! **Documentation query service and LSP bridge for the Cangjie programming language.**
//!
//! Ingests a versioned documentation corpus from the Cangjie language repo,
//! builds a persistent hybrid (dense-vector + BM25) search index, and exposes
//! a small JSON-RPC tool surface over stdio or HTTP streamable transport. It
//! additionally acts as an LSP client, brokering code-intelligence requests to
//! a bundled Cangjie language server subprocess.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐   ┌──────────┐   ┌───────────────┐   ┌──────────────────┐
//! │ GitDocumentSource │─▶│ Chunker  │─▶│ Dense + BM25  │─▶│ HybridRetriever   │
//! │ / RemoteDocument.. │  │          │   │ stores        │   │ (RRF + rerank)   │
//! └─────────────────┘   └──────────┘   └───────────────┘   └────────┬─────────┘
//!                                                                    │
//!                        ┌───────────────────────────────────────────┤
//!                        ▼                                           ▼
//!                 ┌─────────────┐                             ┌─────────────┐
//!                 │ Tool Surface │◀── LspClient (code intel) ─│  HTTP / CLI  │
//!                 │ (rmcp)       │                             │              │
//!                 └─────────────┘                             └─────────────┘
//! ```
//!
//! ## Data Flow
//!
//! 1. The **Index Lifecycle Manager** ([`lifecycle`]) decides whether to load
//!    a prebuilt archive, reuse a persisted index, or build fresh from a
//!    checked-out copy of the documentation repo ([`git_repo`], [`document_source`]).
//! 2. Documents are split into passages by the semantic **Chunker** ([`chunker`]),
//!    falling back to sentence-bounded chunking when embeddings are disabled.
//! 3. Chunks are indexed into a **Dense Store** ([`dense_store`], SQLite + BLOB
//!    vectors) and a **BM25 Store** ([`bm25_store`], `tantivy`).
//! 4. The **Hybrid Retriever** ([`hybrid_retriever`]) runs both searches
//!    concurrently, fuses them with Reciprocal Rank Fusion ([`fusion`]), and
//!    optionally reranks ([`reranker`]).
//! 5. The **Tool Surface** ([`tools`]) exposes `search_docs`, `get_topic`,
//!    `list_topics`, and six LSP-backed tools over `rmcp`, driven by the
//!    **LSP Client** ([`lsp`]) and its **Dependency Resolver**.
//! 6. Results are served over stdio, or over HTTP ([`server`]) alongside plain
//!    JSON auxiliary endpoints.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`error`] | Closed error taxonomy (`CangjieError`) |
//! | [`config`] | CLI/env parsing and validated `Settings` |
//! | [`models`] | Core data types: `Document`, `Chunk`, `SearchResult`, LSP wire types |
//! | [`tokenizer`] | CJK/Latin tokenization via `jieba-rs` |
//! | [`chunker`] | Semantic and fallback document chunking |
//! | [`embedding`] | Embedding provider trait: disabled/OpenAI/local |
//! | [`dense_store`] | Vector storage and cosine-similarity search (SQLite) |
//! | [`bm25_store`] | Lexical search via `tantivy` |
//! | [`fusion`] | Reciprocal Rank Fusion |
//! | [`reranker`] | Optional rerank stage |
//! | [`hybrid_retriever`] | Concurrent dense+BM25 search, fused and reranked |
//! | [`git_repo`] | Shells out to `git` for clone/checkout/tree reads |
//! | [`document_source`] | Unified document read API over git or a remote peer |
//! | [`prebuilt`] | Prebuilt index archive download/extract/install |
//! | [`lifecycle`] | Index Lifecycle Manager decision tree |
//! | [`lsp`] | LSP Client Core and Dependency Resolver |
//! | [`tools`] | JSON-RPC tool surface (`rmcp`) |
//! | [`server`] | HTTP server: plain JSON API + MCP streamable transport |

pub mod bm25_store;
pub mod chunker;
pub mod config;
pub mod dense_store;
pub mod document_source;
pub mod embedding;
pub mod error;
pub mod fusion;
pub mod git_repo;
pub mod hybrid_retriever;
pub mod lifecycle;
pub mod lsp;
pub mod models;
pub mod prebuilt;
pub mod reranker;
pub mod server;
pub mod tokenizer;
pub mod tools;
