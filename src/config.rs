//! CLI argument parsing, environment-variable binding, and `Settings`.
//!
//! Grounded in the Zxilly `cangjie-mcp` `main.rs` shape: a `clap::Parser`
//! struct with one field per tunable, each carrying a `CANGJIE_*` or
//! `OPENAI_*` environment fallback via clap's `env` attribute, collapsed
//! into a `Settings` value via `to_settings()`. An optional TOML file layer
//! (teacher's `load_config` idiom, see `examples/parallax-labs-context-
//! harness/src/config.rs`'s `load_config`) can supply the same fields;
//! CLI/env values always win since clap resolves them before the file is
//! consulted, and unset fields on both sides fall back to hardcoded
//! defaults in `Cli::to_settings()`.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;

use crate::error::{CangjieError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocLang {
    Zh,
    En,
}

impl DocLang {
    pub fn source_dir(&self) -> &'static str {
        match self {
            DocLang::Zh => "source_zh_cn",
            DocLang::En => "source_en",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocLang::Zh => "zh",
            DocLang::En => "en",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingType {
    #[default]
    Disabled,
    Openai,
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RerankType {
    #[default]
    None,
    Local,
    Remote,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "cjdocs",
    about = "Documentation query service and LSP bridge for the Cangjie programming language",
    version
)]
pub struct Cli {
    /// Optional TOML config file; CLI flags and env vars override its fields.
    #[arg(long = "config", env = "CANGJIE_CONFIG_FILE")]
    pub config_file: Option<PathBuf>,

    /// Documentation version to serve ("latest" resolves to the default branch).
    #[arg(long, env = "CANGJIE_DOCS_VERSION")]
    pub docs_version: Option<String>,

    /// Documentation language.
    #[arg(long, env = "CANGJIE_DOCS_LANG", value_enum)]
    pub lang: Option<DocLang>,

    /// URL of the git repository holding the documentation corpus.
    #[arg(long, env = "CANGJIE_DOCS_REPO_URL")]
    pub docs_repo_url: Option<String>,

    /// Embedding provider.
    #[arg(long, env = "CANGJIE_EMBEDDING", value_enum)]
    pub embedding: Option<EmbeddingType>,

    /// Embedding model name (OpenAI model id, or local model path/id).
    #[arg(long, env = "CANGJIE_EMBEDDING_MODEL")]
    pub embedding_model: Option<String>,

    /// Local embedding model directory (fastembed/tract).
    #[arg(long, env = "CANGJIE_LOCAL_MODEL")]
    pub local_model: Option<PathBuf>,

    #[arg(long, env = "OPENAI_API_KEY")]
    pub openai_api_key: Option<String>,

    #[arg(long, env = "OPENAI_BASE_URL")]
    pub openai_base_url: Option<String>,

    /// Reranker provider.
    #[arg(long, env = "CANGJIE_RERANK", value_enum)]
    pub rerank: Option<RerankType>,

    #[arg(long, env = "CANGJIE_RERANK_MODEL")]
    pub rerank_model: Option<String>,

    /// API key for the remote reranker endpoint (distinct from `OPENAI_API_KEY`).
    #[arg(long, env = "CANGJIE_RERANK_API_KEY")]
    pub rerank_api_key: Option<String>,

    /// Final result count returned to callers.
    #[arg(long, env = "CANGJIE_RERANK_TOP_K")]
    pub top_k: Option<usize>,

    /// Candidate pool size fed into fusion/rerank; defaults to 4x top_k.
    #[arg(long, env = "CANGJIE_INITIAL_K")]
    pub initial_k: Option<usize>,

    /// Maximum chunk size in characters, used by the chunker's fallback splitter.
    #[arg(long, env = "CANGJIE_CHUNK_MAX_SIZE")]
    pub chunk_max_size: Option<usize>,

    /// RRF rank-damping constant.
    #[arg(long, env = "CANGJIE_RRF_K")]
    pub rrf_k: Option<usize>,

    /// Directory persisted state lives under (see SPEC_FULL.md layout tree).
    #[arg(long, env = "CANGJIE_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// URL of a prebuilt index archive. When set, takes precedence over local build (§4.8).
    #[arg(long, env = "CANGJIE_PREBUILT_URL")]
    pub prebuilt_url: Option<String>,

    /// Path to the bundled Cangjie language server executable.
    #[arg(long, env = "CANGJIE_LSP_COMMAND")]
    pub lsp_command: Option<PathBuf>,

    /// `cjpm` workspace root the Dependency Resolver walks to build LSP
    /// `initializationOptions`. Defaults to `docs_repo_dir()` when unset.
    #[arg(long, env = "CANGJIE_CJPM_WORKSPACE")]
    pub cjpm_workspace: Option<PathBuf>,

    #[arg(long, env = "CANGJIE_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    #[arg(long, env = "CANGJIE_DEBUG")]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Serve the tool surface over stdio JSON-RPC (for MCP stdio clients).
    ServeStdio,

    /// Serve the tool surface over HTTP streamable transport plus auxiliary endpoints.
    ServeHttp {
        #[arg(long, env = "CANGJIE_SERVER_HOST", default_value = "127.0.0.1")]
        host: String,
        #[arg(long, env = "CANGJIE_SERVER_PORT", default_value_t = 8420)]
        port: u16,
    },

    /// Build or refresh the index for the configured (version, lang) pair and exit.
    BuildIndex,
}

/// Fully resolved settings, the immutable value threaded through construction.
#[derive(Debug, Clone)]
pub struct Settings {
    pub docs_version: String,
    pub lang: DocLang,
    pub docs_repo_url: Option<String>,
    pub embedding: EmbeddingType,
    pub embedding_model: Option<String>,
    pub local_model: Option<PathBuf>,
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub rerank: RerankType,
    pub rerank_model: Option<String>,
    pub rerank_api_key: Option<String>,
    pub top_k: usize,
    pub initial_k: usize,
    pub chunk_max_size: usize,
    pub rrf_k: usize,
    pub data_dir: PathBuf,
    pub prebuilt_url: Option<String>,
    pub lsp_command: Option<PathBuf>,
    pub cjpm_workspace: Option<PathBuf>,
    pub debug: bool,
}

/// The file layer: every field optional, same names as `Settings` minus
/// `debug` (logging setup is a CLI-only concern, resolved before this file
/// would even be read). CLI flags and env vars (already merged into `Cli` by
/// clap) win over whatever is set here.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FileConfig {
    pub docs_version: Option<String>,
    pub lang: Option<DocLang>,
    pub docs_repo_url: Option<String>,
    pub embedding: Option<EmbeddingType>,
    pub embedding_model: Option<String>,
    pub local_model: Option<PathBuf>,
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub rerank: Option<RerankType>,
    pub rerank_model: Option<String>,
    pub rerank_api_key: Option<String>,
    pub top_k: Option<usize>,
    pub initial_k: Option<usize>,
    pub chunk_max_size: Option<usize>,
    pub rrf_k: Option<usize>,
    pub data_dir: Option<PathBuf>,
    pub prebuilt_url: Option<String>,
    pub lsp_command: Option<PathBuf>,
    pub cjpm_workspace: Option<PathBuf>,
}

pub fn load_config_file(path: &Path) -> Result<FileConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| CangjieError::ConfigError(format!("failed to read config file {}: {e}", path.display())))?;
    toml::from_str(&content)
        .map_err(|e| CangjieError::ConfigError(format!("malformed config file {}: {e}", path.display())))
}

const DEFAULT_DOCS_VERSION: &str = "latest";
const DEFAULT_LANG: DocLang = DocLang::Zh;
const DEFAULT_TOP_K: usize = 5;
const DEFAULT_CHUNK_MAX_SIZE: usize = 1200;
const DEFAULT_RRF_K: usize = 60;
const DEFAULT_DATA_DIR: &str = "./data";

impl Cli {
    /// Resolves the file layer: an explicit `--config`/`CANGJIE_CONFIG_FILE`
    /// path must exist and parse; otherwise `data_dir/cjdocs.toml` is tried
    /// and silently skipped if absent, so a fresh install needs no config
    /// file at all.
    fn resolve_file_config(&self) -> Result<FileConfig> {
        if let Some(path) = &self.config_file {
            return load_config_file(path);
        }
        let data_dir = self.data_dir.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
        let default_path = data_dir.join("cjdocs.toml");
        if default_path.exists() {
            return load_config_file(&default_path);
        }
        Ok(FileConfig::default())
    }

    pub fn to_settings(&self) -> Result<Settings> {
        let file = self.resolve_file_config()?;

        let docs_version = self
            .docs_version
            .clone()
            .or(file.docs_version)
            .unwrap_or_else(|| DEFAULT_DOCS_VERSION.to_string());
        if docs_version.trim().is_empty() {
            return Err(CangjieError::ConfigError("docs_version must not be empty".into()));
        }

        let embedding = self.embedding.or(file.embedding).unwrap_or_default();
        let openai_api_key = self.openai_api_key.clone().or(file.openai_api_key);
        if matches!(embedding, EmbeddingType::Openai) && openai_api_key.is_none() {
            return Err(CangjieError::ConfigError(
                "embedding=openai requires OPENAI_API_KEY".into(),
            ));
        }

        let top_k = self.top_k.or(file.top_k).unwrap_or(DEFAULT_TOP_K);
        let initial_k = self.initial_k.or(file.initial_k).unwrap_or_else(|| (top_k * 4).max(1));

        Ok(Settings {
            docs_version,
            lang: self.lang.or(file.lang).unwrap_or(DEFAULT_LANG),
            docs_repo_url: self.docs_repo_url.clone().or(file.docs_repo_url),
            embedding,
            embedding_model: self.embedding_model.clone().or(file.embedding_model),
            local_model: self.local_model.clone().or(file.local_model),
            openai_api_key,
            openai_base_url: self.openai_base_url.clone().or(file.openai_base_url),
            rerank: self.rerank.or(file.rerank).unwrap_or_default(),
            rerank_model: self.rerank_model.clone().or(file.rerank_model),
            rerank_api_key: self.rerank_api_key.clone().or(file.rerank_api_key),
            top_k,
            initial_k,
            chunk_max_size: self.chunk_max_size.or(file.chunk_max_size).unwrap_or(DEFAULT_CHUNK_MAX_SIZE),
            rrf_k: self.rrf_k.or(file.rrf_k).unwrap_or(DEFAULT_RRF_K),
            data_dir: self.data_dir.clone().or(file.data_dir).unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            prebuilt_url: self.prebuilt_url.clone().or(file.prebuilt_url),
            lsp_command: self.lsp_command.clone().or(file.lsp_command),
            cjpm_workspace: self.cjpm_workspace.clone().or(file.cjpm_workspace),
            debug: self.debug,
        })
    }
}

impl Settings {
    pub fn index_dir(&self) -> PathBuf {
        self.data_dir
            .join("indexes")
            .join(format!("{}-{}", self.docs_version, self.lang.as_str()))
    }

    pub fn docs_repo_dir(&self) -> PathBuf {
        self.data_dir.join("docs_repo")
    }

    pub fn prebuilt_dir(&self) -> PathBuf {
        self.data_dir.join("prebuilt")
    }

    pub fn index_cache_dir(&self) -> PathBuf {
        self.data_dir.join("index_cache")
    }

    pub fn embedding_model_label(&self) -> String {
        self.embedding_model
            .clone()
            .unwrap_or_else(|| "none".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn rejects_empty_docs_version() {
        let cli = Cli::parse_from(["cjdocs", "--docs-version", "", "serve-stdio"]);
        assert!(cli.to_settings().is_err());
    }

    #[test]
    fn initial_k_defaults_to_4x_top_k() {
        let cli = Cli::parse_from(["cjdocs", "--top-k", "5", "serve-stdio"]);
        let settings = cli.to_settings().unwrap();
        assert_eq!(settings.initial_k, 20);
    }

    #[test]
    fn openai_without_key_is_config_error() {
        let cli = Cli::parse_from(["cjdocs", "--embedding", "openai", "serve-stdio"]);
        assert!(matches!(
            cli.to_settings(),
            Err(CangjieError::ConfigError(_))
        ));
    }
}
