//! Index Lifecycle Manager: the coordinator, and the most contract-heavy
//! component (spec §4.8).
//!
//! Decision order (first match wins):
//! 1. Prebuilt URL configured AND already installed: use it, ignore
//!    version/lang overrides.
//! 2. Prebuilt URL configured AND nothing installed: download, validate,
//!    install, use.
//! 3. Installed prebuilt metadata matches `(version, lang)`: use it.
//! 4. Existing persisted index matches `(version, lang)` and embedding
//!    model: load it.
//! 5. Otherwise build: clone/checkout, load documents, chunk, index both
//!    stores, save metadata.

use std::path::PathBuf;
use std::sync::Arc;

use crate::bm25_store::Bm25Store;
use crate::chunker::Chunker;
use crate::config::Settings;
use crate::dense_store::{DenseStore, SqliteVectorDb, VectorDb};
use crate::document_source::{DocumentSource, GitDocumentSource};
use crate::embedding::EmbeddingProvider;
use crate::error::{CangjieError, Result};
use crate::git_repo::GitRepo;
use crate::models::IndexMetadata;
use crate::prebuilt;

pub struct ReadyIndex {
    pub dense: Option<Arc<DenseStore>>,
    pub bm25: Option<Arc<Bm25Store>>,
    pub metadata: IndexMetadata,
    pub docs: Arc<dyn DocumentSource>,
}

pub struct IndexLifecycleManager {
    settings: Settings,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl IndexLifecycleManager {
    pub fn new(settings: Settings, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { settings, embedder }
    }

    pub async fn initialize(&self) -> Result<ReadyIndex> {
        // Step 1 & 2: prebuilt URL configured.
        if let Some(url) = self.settings.prebuilt_url.clone() {
            let install_dir = self.settings.prebuilt_dir().join("installed");
            if let Some(installed) = prebuilt::read_installed_metadata(&install_dir) {
                tracing::warn!(
                    requested_version = %self.settings.docs_version,
                    requested_lang = %self.settings.lang.as_str(),
                    "prebuilt URL configured and already installed; ignoring version/lang overrides"
                );
                return self.load_from_prebuilt(&install_dir, &installed.version, &installed.lang).await;
            }
            tracing::info!(url = %url, "prebuilt URL configured, nothing installed yet; downloading");
            let cache_dir = self.settings.index_cache_dir();
            let archive_path = prebuilt::download(&url, &cache_dir).await?;
            let metadata = prebuilt::extract_and_validate(&archive_path, &install_dir)?;
            return self.load_from_prebuilt(&install_dir, &metadata.version, &metadata.lang).await;
        }

        // Step 3: installed prebuilt metadata matches requested (version, lang), even without a URL this run.
        let install_dir = self.settings.prebuilt_dir().join("installed");
        if let Some(installed) = prebuilt::read_installed_metadata(&install_dir) {
            if installed.version == self.settings.docs_version && installed.lang == self.settings.lang.as_str() {
                return self.load_from_prebuilt(&install_dir, &installed.version, &installed.lang).await;
            }
        }

        // Step 4: existing persisted index matches.
        let index_dir = self.settings.index_dir();
        let db_path = index_dir.join("chroma_db").join("vectors.sqlite3");
        let bm25_dir = index_dir.join("bm25_index");

        if index_dir.exists() {
            let vector_db = Arc::new(SqliteVectorDb::open(&db_path).await?);
            let dense = DenseStore::new(vector_db.clone(), self.embedder.clone(), &index_dir);
            let existing_meta = dense.read_metadata();
            if let Some(meta) = &existing_meta {
                let is_indexed = dense.is_indexed().await.unwrap_or(false);
                if is_indexed
                    && dense.version_matches(&self.settings.docs_version, self.settings.lang.as_str())
                    && meta.embedding_model == self.embedder.model_name()
                {
                    let bm25 = Bm25Store::load(&bm25_dir)?.map(Arc::new);
                    let docs = self.document_source();
                    return Ok(ReadyIndex {
                        dense: Some(Arc::new(dense)),
                        bm25,
                        metadata: meta.clone(),
                        docs,
                    });
                }
            }
        }

        // Step 5: build fresh.
        self.build().await
    }

    async fn load_from_prebuilt(&self, install_dir: &PathBuf, version: &str, lang: &str) -> Result<ReadyIndex> {
        let db_path = install_dir.join("chroma_db").join("vectors.sqlite3");
        let vector_db = Arc::new(SqliteVectorDb::open(&db_path).await?);
        let dense = DenseStore::new(vector_db, self.embedder.clone(), install_dir);
        let bm25 = Bm25Store::load(&install_dir.join("bm25_index"))?.map(Arc::new);
        let document_count = dense.read_metadata().map(|m| m.document_count).unwrap_or(0);
        let metadata = IndexMetadata {
            version: version.to_string(),
            lang: lang.to_string(),
            embedding_model: self.embedder.model_name().to_string(),
            document_count,
        };
        Ok(ReadyIndex {
            dense: Some(Arc::new(dense)),
            bm25,
            metadata,
            docs: self.document_source(),
        })
    }

    fn document_source(&self) -> Arc<dyn DocumentSource> {
        let repo = GitRepo::new(
            self.settings.docs_repo_dir(),
            self.settings.docs_repo_url.clone().unwrap_or_default(),
        );
        Arc::new(GitDocumentSource::new(repo, self.settings.lang, self.settings.docs_version.clone()))
    }

    async fn build(&self) -> Result<ReadyIndex> {
        let repo_url = self
            .settings
            .docs_repo_url
            .clone()
            .ok_or_else(|| CangjieError::ConfigError("docs_repo_url is required to build an index".into()))?;
        let repo = GitRepo::new(self.settings.docs_repo_dir(), repo_url);
        repo.ensure_cloned()?;

        let doc_source = GitDocumentSource::new(repo, self.settings.lang, self.settings.docs_version.clone());
        let documents = doc_source.load_all_documents().await?;
        if documents.is_empty() {
            return Err(CangjieError::SourceUnavailable(
                "no documents discovered for the requested (version, lang); build aborted".into(),
            ));
        }

        let chunker = Chunker::new(self.embedder.clone(), self.settings.chunk_max_size);
        let use_semantic = self.embedder.dims() > 0;
        let chunks = chunker.chunk(&documents, use_semantic).await;

        let index_dir = self.settings.index_dir();
        std::fs::create_dir_all(&index_dir).map_err(CangjieError::backend)?;
        let db_path = index_dir.join("chroma_db").join("vectors.sqlite3");
        let vector_db = Arc::new(SqliteVectorDb::open(&db_path).await?);
        let dense = DenseStore::new(vector_db, self.embedder.clone(), &index_dir);
        dense.index(&chunks).await?;

        let bm25_dir = index_dir.join("bm25_index");
        let bm25 = Bm25Store::build_from_chunks(&bm25_dir, &chunks)?;

        dense.save_metadata(
            &self.settings.docs_version,
            self.settings.lang.as_str(),
            self.embedder.model_name(),
            documents.len(),
        )?;

        let metadata = IndexMetadata {
            version: self.settings.docs_version.clone(),
            lang: self.settings.lang.as_str().to_string(),
            embedding_model: self.embedder.model_name().to_string(),
            document_count: documents.len(),
        };

        Ok(ReadyIndex {
            dense: Some(Arc::new(dense)),
            bm25: Some(Arc::new(bm25)),
            metadata,
            docs: Arc::new(doc_source),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DocLang, EmbeddingType};
    use crate::embedding::DisabledProvider;
    use tempfile::TempDir;

    fn settings(dir: &std::path::Path) -> Settings {
        Settings {
            docs_version: "latest".to_string(),
            lang: DocLang::Zh,
            docs_repo_url: None,
            embedding: EmbeddingType::Disabled,
            embedding_model: None,
            local_model: None,
            openai_api_key: None,
            openai_base_url: None,
            rerank: Default::default(),
            rerank_model: None,
            rerank_api_key: None,
            top_k: 5,
            initial_k: 20,
            chunk_max_size: 1200,
            rrf_k: 60,
            data_dir: dir.to_path_buf(),
            prebuilt_url: None,
            lsp_command: None,
            cjpm_workspace: None,
            debug: false,
        }
    }

    #[tokio::test]
    async fn build_without_repo_url_is_config_error() {
        let tmp = TempDir::new().unwrap();
        let manager = IndexLifecycleManager::new(settings(tmp.path()), Arc::new(DisabledProvider));
        let result = manager.initialize().await;
        assert!(matches!(result, Err(CangjieError::ConfigError(_))));
    }
}
