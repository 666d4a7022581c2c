//! Dense Store: wraps the vector-DB collaborator (spec §4.3).
//!
//! The vector database itself is out of scope per spec §1 ("the underlying
//! vector database engine... collaborator exposing upsert/query/count").
//! `VectorDb` is that collaborator's interface; `SqliteVectorDb` is the one
//! concrete implementation this crate ships, grounded in the teacher's
//! `chunk_vectors` BLOB table and `search.rs`'s brute-force cosine scan —
//! adequate for the corpus sizes this service targets, and avoids pulling
//! in an embedded ANN engine where a full scan is already sub-millisecond.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob, EmbeddingProvider};
use crate::error::{CangjieError, Result};
use crate::models::{Chunk, IndexMetadata, SearchResult, ResultMetadata};

#[async_trait]
pub trait VectorDb: Send + Sync {
    async fn reset(&self) -> Result<()>;
    async fn upsert(&self, id: &str, vec: &[f32], meta: &ChunkMetaRow) -> Result<()>;
    async fn query(&self, vec: &[f32], k: usize, category: Option<&str>) -> Result<Vec<(f32, ChunkMetaRow)>>;
    async fn count(&self) -> Result<usize>;

    /// Atomically replaces the entire collection with `rows`: a build that
    /// fails partway through embedding never reaches here, and a failure
    /// partway through this call rolls back rather than leaving a partial
    /// collection (spec §5: "partial builds leave the collection empty").
    async fn replace_all(&self, rows: &[(String, Vec<f32>, ChunkMetaRow)]) -> Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMetaRow {
    pub text: String,
    pub file_path: String,
    pub category: String,
    pub topic: String,
    pub title: String,
    pub has_code: bool,
}

pub struct SqliteVectorDb {
    pool: SqlitePool,
}

impl SqliteVectorDb {
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(CangjieError::backend)?;
        }
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(CangjieError::backend)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await
            .map_err(CangjieError::backend)?;
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS chunk_vectors (
                id TEXT PRIMARY KEY,
                embedding BLOB NOT NULL,
                text TEXT NOT NULL,
                file_path TEXT NOT NULL,
                category TEXT NOT NULL,
                topic TEXT NOT NULL,
                title TEXT NOT NULL,
                has_code INTEGER NOT NULL
            )"#,
        )
        .execute(&pool)
        .await
        .map_err(CangjieError::backend)?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl VectorDb for SqliteVectorDb {
    async fn reset(&self) -> Result<()> {
        sqlx::query("DELETE FROM chunk_vectors")
            .execute(&self.pool)
            .await
            .map_err(CangjieError::backend)?;
        Ok(())
    }

    async fn upsert(&self, id: &str, vec: &[f32], meta: &ChunkMetaRow) -> Result<()> {
        sqlx::query(
            "INSERT INTO chunk_vectors (id, embedding, text, file_path, category, topic, title, has_code)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET embedding=excluded.embedding, text=excluded.text,
                file_path=excluded.file_path, category=excluded.category, topic=excluded.topic,
                title=excluded.title, has_code=excluded.has_code",
        )
        .bind(id)
        .bind(vec_to_blob(vec))
        .bind(&meta.text)
        .bind(&meta.file_path)
        .bind(&meta.category)
        .bind(&meta.topic)
        .bind(&meta.title)
        .bind(meta.has_code as i64)
        .execute(&self.pool)
        .await
        .map_err(CangjieError::backend)?;
        Ok(())
    }

    async fn query(&self, vec: &[f32], k: usize, category: Option<&str>) -> Result<Vec<(f32, ChunkMetaRow)>> {
        let rows = if let Some(cat) = category {
            sqlx::query("SELECT embedding, text, file_path, category, topic, title, has_code FROM chunk_vectors WHERE category = ?")
                .bind(cat)
                .fetch_all(&self.pool)
                .await
        } else {
            sqlx::query("SELECT embedding, text, file_path, category, topic, title, has_code FROM chunk_vectors")
                .fetch_all(&self.pool)
                .await
        }
        .map_err(CangjieError::backend)?;

        let mut scored: Vec<(f32, ChunkMetaRow)> = rows
            .into_iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let candidate = blob_to_vec(&blob);
                let score = cosine_similarity(vec, &candidate);
                (
                    score,
                    ChunkMetaRow {
                        text: row.get("text"),
                        file_path: row.get("file_path"),
                        category: row.get("category"),
                        topic: row.get("topic"),
                        title: row.get("title"),
                        has_code: row.get::<i64, _>("has_code") != 0,
                    },
                )
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap());
        scored.truncate(k);
        Ok(scored)
    }

    async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunk_vectors")
            .fetch_one(&self.pool)
            .await
            .map_err(CangjieError::backend)?;
        Ok(count as usize)
    }

    async fn replace_all(&self, rows: &[(String, Vec<f32>, ChunkMetaRow)]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(CangjieError::backend)?;
        sqlx::query("DELETE FROM chunk_vectors")
            .execute(&mut *tx)
            .await
            .map_err(CangjieError::backend)?;
        for (id, vec, meta) in rows {
            sqlx::query(
                "INSERT INTO chunk_vectors (id, embedding, text, file_path, category, topic, title, has_code)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(id)
            .bind(vec_to_blob(vec))
            .bind(&meta.text)
            .bind(&meta.file_path)
            .bind(&meta.category)
            .bind(&meta.topic)
            .bind(&meta.title)
            .bind(meta.has_code as i64)
            .execute(&mut *tx)
            .await
            .map_err(CangjieError::backend)?;
        }
        tx.commit().await.map_err(CangjieError::backend)?;
        Ok(())
    }
}

pub struct DenseStore {
    db: Arc<dyn VectorDb>,
    embedder: Arc<dyn EmbeddingProvider>,
    metadata_path: PathBuf,
}

impl DenseStore {
    pub fn new(db: Arc<dyn VectorDb>, embedder: Arc<dyn EmbeddingProvider>, index_dir: &Path) -> Self {
        Self {
            db,
            embedder,
            metadata_path: index_dir.join("index_metadata.json"),
        }
    }

    pub async fn is_indexed(&self) -> Result<bool> {
        Ok(self.db.count().await? >= 1)
    }

    pub fn version_matches(&self, version: &str, lang: &str) -> bool {
        match self.read_metadata() {
            Some(meta) => meta.version == version && meta.lang == lang,
            None => false,
        }
    }

    pub fn read_metadata(&self) -> Option<IndexMetadata> {
        let content = std::fs::read_to_string(&self.metadata_path).ok()?;
        serde_json::from_str(&content).ok()
    }

    pub fn save_metadata(&self, version: &str, lang: &str, embedding_model: &str, document_count: usize) -> Result<()> {
        let meta = IndexMetadata {
            version: version.to_string(),
            lang: lang.to_string(),
            embedding_model: embedding_model.to_string(),
            document_count,
        };
        if let Some(parent) = self.metadata_path.parent() {
            std::fs::create_dir_all(parent).map_err(CangjieError::backend)?;
        }
        let content = serde_json::to_string_pretty(&meta).map_err(CangjieError::backend)?;
        std::fs::write(&self.metadata_path, content).map_err(CangjieError::backend)?;
        Ok(())
    }

    /// Embeds all chunks, then atomically replaces the collection. Embedding
    /// every batch before any write means a mid-build embedding failure
    /// never touches the existing collection; `replace_all`'s transaction
    /// covers the write side.
    pub async fn index(&self, chunks: &[Chunk]) -> Result<()> {
        const BATCH: usize = 64;
        let mut rows = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(BATCH) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedder.embed(&texts).await?;
            for (chunk, vec) in batch.iter().zip(vectors.into_iter()) {
                let meta = ChunkMetaRow {
                    text: chunk.text.clone(),
                    file_path: chunk.metadata.file_path.clone(),
                    category: chunk.metadata.category.clone(),
                    topic: chunk.metadata.topic.clone(),
                    title: chunk.metadata.title.clone(),
                    has_code: chunk.metadata.code_block_count > 0,
                };
                rows.push((chunk.id.clone(), vec, meta));
            }
        }
        self.db.replace_all(&rows).await
    }

    pub async fn search(&self, query: &str, top_k: usize, category: Option<&str>) -> Result<Vec<SearchResult>> {
        let query_vec = self.embedder.embed_query(query).await?;
        let hits = self.db.query(&query_vec, top_k, category).await?;
        Ok(hits
            .into_iter()
            .map(|(score, meta)| SearchResult {
                text: meta.text,
                score,
                metadata: ResultMetadata {
                    file_path: meta.file_path,
                    category: meta.category,
                    topic: meta.topic,
                    title: meta.title,
                    has_code: meta.has_code,
                },
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DocLang, EmbeddingType, Settings};
    use crate::embedding::DisabledProvider;
    use tempfile::TempDir;

    fn settings(dir: &Path) -> Settings {
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
    async fn is_indexed_false_when_empty() {
        let tmp = TempDir::new().unwrap();
        let _ = settings(tmp.path());
        let db = Arc::new(SqliteVectorDb::open(&tmp.path().join("v.db")).await.unwrap());
        let store = DenseStore::new(db, Arc::new(DisabledProvider), tmp.path());
        assert!(!store.is_indexed().await.unwrap());
    }

    #[tokio::test]
    async fn version_matches_requires_saved_metadata() {
        let tmp = TempDir::new().unwrap();
        let db = Arc::new(SqliteVectorDb::open(&tmp.path().join("v.db")).await.unwrap());
        let store = DenseStore::new(db, Arc::new(DisabledProvider), tmp.path());
        assert!(!store.version_matches("latest", "zh"));
        store.save_metadata("latest", "zh", "disabled", 0).unwrap();
        assert!(store.version_matches("latest", "zh"));
        assert!(!store.version_matches("v1", "zh"));
    }
}
