//! # cangjie-docs
//!
//! Documentation query service and LSP bridge for the Cangjie programming
//! language. Builds a persistent hybrid (dense + BM25) search index over a
//! versioned documentation corpus and exposes a small JSON-RPC tool surface
//! over stdio or HTTP streamable transport, plus an LSP client bridge to a
//! bundled Cangjie language server subprocess.
//!
//! ## Architecture
//!
//! ```text
//! GitDocumentSource → Chunker → Embedding/BM25 → HybridRetriever → Tool Surface → stdio / HTTP
//!                                                        ↑
//!                                                   LspClient (code intelligence)
//! ```

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cangjie_docs::config::{Cli, Commands};
use cangjie_docs::embedding;
use cangjie_docs::error::CangjieError;
use cangjie_docs::hybrid_retriever::HybridRetriever;
use cangjie_docs::lifecycle::IndexLifecycleManager;
use cangjie_docs::reranker::Reranker;
use cangjie_docs::tools::{CangjieServer, InnerState};

use clap::Parser;

fn setup_logging(log_file: Option<&std::path::PathBuf>, debug: bool) {
    let filter = if debug { EnvFilter::new("debug") } else { EnvFilter::new("info") };

    if let Some(log_path) = log_file {
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)
            .expect("failed to open log file");
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .init();
    } else {
        // Stderr only — stdout is reserved for the stdio JSON-RPC transport.
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.log_file.as_ref(), cli.debug);

    let settings = match cli.to_settings() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(e.exit_code());
        }
    };

    let command = cli.command.clone();
    let result = run(settings, command).await;

    if let Err(e) = result {
        eprintln!("error: {e}");
        let exit_code = e.downcast_ref::<CangjieError>().map(|e| e.exit_code()).unwrap_or(1);
        std::process::exit(exit_code);
    }

    Ok(())
}

async fn run(settings: cangjie_docs::config::Settings, command: Commands) -> anyhow::Result<()> {
    let embedder = embedding::create_provider(&settings)?;

    match command {
        Commands::BuildIndex => {
            info!(version = %settings.docs_version, lang = settings.lang.as_str(), "building index");
            let manager = IndexLifecycleManager::new(settings.clone(), embedder);
            let ready = manager.initialize().await?;
            println!(
                "Index ready: version={} lang={} documents={} embedding_model={}",
                ready.metadata.version, ready.metadata.lang, ready.metadata.document_count, ready.metadata.embedding_model
            );
        }
        Commands::ServeStdio => {
            use rmcp::transport::stdio;
            use rmcp::ServiceExt;

            info!("initializing index before starting stdio transport");
            let manager = IndexLifecycleManager::new(settings.clone(), embedder);
            let ready = manager.initialize().await?;

            let reranker = Reranker::from_settings(&settings);
            let retriever = HybridRetriever::new(ready.dense, ready.bm25, reranker, settings.rrf_k, settings.initial_k);

            let lsp = cangjie_docs::lsp::connect(&settings).await.unwrap_or_else(|e| {
                tracing::warn!(error = %e, "lsp client failed to start; code-intelligence tools disabled");
                None
            });

            let inner = Arc::new(InnerState {
                retriever,
                docs: ready.docs,
                lsp: Mutex::new(lsp),
                metadata: ready.metadata,
            });

            let server = CangjieServer::new(inner);
            info!("starting MCP server on stdio");
            let service = server
                .serve(stdio())
                .await
                .map_err(|e| anyhow::anyhow!("failed to start stdio transport: {e}"))?;
            service.waiting().await?;
        }
        Commands::ServeHttp { host, port } => {
            info!("initializing index before starting HTTP transport");
            let manager = IndexLifecycleManager::new(settings.clone(), embedder);
            let ready = manager.initialize().await?;

            let reranker = Reranker::from_settings(&settings);
            let retriever =
                HybridRetriever::new(ready.dense, ready.bm25, reranker, settings.rrf_k, settings.initial_k);

            let lsp = cangjie_docs::lsp::connect(&settings).await.unwrap_or_else(|e| {
                tracing::warn!(error = %e, "lsp client failed to start; code-intelligence tools disabled");
                None
            });

            let inner = Arc::new(InnerState {
                retriever: retriever.clone(),
                docs: ready.docs.clone(),
                lsp: Mutex::new(lsp),
                metadata: ready.metadata.clone(),
            });

            cangjie_docs::server::run_server(
                &settings,
                retriever,
                ready.docs,
                ready.metadata,
                inner,
                &host,
                port,
            )
            .await?;
        }
    }

    Ok(())
}
