//! BM25 Store: persistent inverted-index retriever (spec §4.4).
//!
//! Grounded on `tantivy` (a real BM25-scoring inverted index) and, for the
//! query-parsing edge cases, on the Zxilly `cangjie-mcp` BM25 pipeline
//! tests (`other_examples/e8a0bbd2_..._test_bm25_pipeline.rs.rs`): a query
//! that the tantivy query parser rejects (`func()`, `a+b`, `x.*y`,
//! `[array]`, `a && b`, `a || b`) must fall back to `AllQuery` rather than
//! erroring, since these are legitimate full-text queries over Cangjie code
//! snippets, not malformed tantivy syntax.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tantivy::collector::TopDocs;
use tantivy::query::{AllQuery, BooleanQuery, Occur, Query, QueryParser, TermQuery};
use tantivy::schema::{IndexRecordOption, Schema, STORED, STRING, TEXT};
use tantivy::{doc, Index, IndexReader, IndexWriter, TantivyDocument, Term};

use crate::error::{CangjieError, Result};
use crate::models::{Chunk, ResultMetadata, SearchResult, TokenizedChunk};
use crate::tokenizer::tokenize;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SidecarEntry {
    text: String,
    file_path: String,
    category: String,
    topic: String,
    title: String,
    has_code: bool,
}

pub struct Bm25Store {
    dir: PathBuf,
    index: Index,
    reader: IndexReader,
    text_field: tantivy::schema::Field,
    tokens_field: tantivy::schema::Field,
    category_field: tantivy::schema::Field,
    doc_idx_field: tantivy::schema::Field,
    sidecar: Vec<SidecarEntry>,
}

fn build_schema() -> (
    Schema,
    tantivy::schema::Field,
    tantivy::schema::Field,
    tantivy::schema::Field,
    tantivy::schema::Field,
) {
    let mut builder = Schema::builder();
    let text_field = builder.add_text_field("text", TEXT | STORED);
    let tokens_field = builder.add_text_field("tokens", TEXT);
    let category_field = builder.add_text_field("category", STRING | STORED);
    let doc_idx_field = builder.add_u64_field("doc_idx", STORED);
    (builder.build(), text_field, tokens_field, category_field, doc_idx_field)
}

impl Bm25Store {
    fn sidecar_path(dir: &Path) -> PathBuf {
        dir.join("bm25_doc_metadata.json")
    }

    pub fn is_indexed(dir: &Path) -> bool {
        Self::sidecar_path(dir).exists() && dir.join("meta.json").exists()
    }

    /// Builds a fresh index from `chunks`, persisting to `dir`.
    pub fn build_from_chunks(dir: &Path, chunks: &[Chunk]) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(CangjieError::backend)?;
        let (schema, text_field, tokens_field, category_field, doc_idx_field) = build_schema();
        let index = Index::create_in_dir(dir, schema).map_err(CangjieError::backend)?;
        let mut writer: IndexWriter = index.writer(50_000_000).map_err(CangjieError::backend)?;

        let tokenized: Vec<TokenizedChunk> = chunks
            .iter()
            .map(|c| TokenizedChunk {
                chunk: c.clone(),
                tokens: tokenize(&c.text),
            })
            .collect();

        let mut sidecar = Vec::with_capacity(tokenized.len());
        for (idx, tc) in tokenized.iter().enumerate() {
            writer
                .add_document(doc!(
                    text_field => tc.chunk.text.clone(),
                    tokens_field => tc.tokens.join(" "),
                    category_field => tc.chunk.metadata.category.clone(),
                    doc_idx_field => idx as u64,
                ))
                .map_err(CangjieError::backend)?;
            sidecar.push(SidecarEntry {
                text: tc.chunk.text.clone(),
                file_path: tc.chunk.metadata.file_path.clone(),
                category: tc.chunk.metadata.category.clone(),
                topic: tc.chunk.metadata.topic.clone(),
                title: tc.chunk.metadata.title.clone(),
                has_code: tc.chunk.metadata.code_block_count > 0,
            });
        }
        writer.commit().map_err(CangjieError::backend)?;

        let content = serde_json::to_string(&sidecar).map_err(CangjieError::backend)?;
        std::fs::write(Self::sidecar_path(dir), content).map_err(CangjieError::backend)?;
        std::fs::write(dir.join("meta.json"), b"{}").map_err(CangjieError::backend)?;

        let reader = index.reader().map_err(CangjieError::backend)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            index,
            reader,
            text_field,
            tokens_field,
            category_field,
            doc_idx_field,
            sidecar,
        })
    }

    /// Loads a previously persisted index from `dir`. Returns `Ok(None)` if
    /// nothing persisted; callers treat that as `is_indexed = false`.
    pub fn load(dir: &Path) -> Result<Option<Self>> {
        if !Self::is_indexed(dir) {
            return Ok(None);
        }
        let index = Index::open_in_dir(dir).map_err(|e| {
            CangjieError::IntegrityError(format!("corrupt bm25 index at {}: {e}", dir.display()))
        })?;
        let schema = index.schema();
        let text_field = schema.get_field("text").map_err(CangjieError::backend)?;
        let tokens_field = schema.get_field("tokens").map_err(CangjieError::backend)?;
        let category_field = schema.get_field("category").map_err(CangjieError::backend)?;
        let doc_idx_field = schema.get_field("doc_idx").map_err(CangjieError::backend)?;
        let reader = index.reader().map_err(CangjieError::backend)?;

        let sidecar_content = std::fs::read_to_string(Self::sidecar_path(dir))
            .map_err(|e| CangjieError::IntegrityError(format!("missing bm25 sidecar: {e}")))?;
        let sidecar: Vec<SidecarEntry> =
            serde_json::from_str(&sidecar_content).map_err(CangjieError::backend)?;

        Ok(Some(Self {
            dir: dir.to_path_buf(),
            index,
            reader,
            text_field,
            tokens_field,
            category_field,
            doc_idx_field,
            sidecar,
        }))
    }

    pub fn clear(&self) -> Result<()> {
        std::fs::remove_dir_all(&self.dir).map_err(CangjieError::backend)?;
        Ok(())
    }

    /// `search(query, top_k, category?) -> list<SearchResult>`.
    ///
    /// A category filter becomes a `TermQuery` on `category_field`, `AND`ed
    /// with the parsed text query — tantivy applies it during collection,
    /// so `top_k` is the exact fetch size regardless of filtering.
    pub fn search(&self, query: &str, top_k: usize, category: Option<&str>) -> Result<Vec<SearchResult>> {
        if top_k == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let searcher = self.reader.searcher();
        let tokens = tokenize(query).join(" ");
        let parser = QueryParser::for_index(&self.index, vec![self.tokens_field, self.text_field]);

        let text_query: Box<dyn Query> = match parser.parse_query(&tokens) {
            Ok(q) => q,
            Err(_) => Box::new(AllQuery),
        };

        let query: Box<dyn Query> = match category {
            Some(cat) => {
                let term = Term::from_field_text(self.category_field, cat);
                let category_query: Box<dyn Query> =
                    Box::new(TermQuery::new(term, IndexRecordOption::Basic));
                Box::new(BooleanQuery::new(vec![
                    (Occur::Must, text_query),
                    (Occur::Must, category_query),
                ]))
            }
            None => text_query,
        };

        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(top_k))
            .map_err(CangjieError::backend)?;

        let mut results = Vec::new();
        for (score, addr) in top_docs {
            let retrieved: TantivyDocument = searcher.doc(addr).map_err(CangjieError::backend)?;
            let doc_idx = retrieved
                .get_first(self.doc_idx_field)
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as usize;
            let Some(entry) = self.sidecar.get(doc_idx) else {
                continue;
            };
            results.push(SearchResult {
                text: entry.text.clone(),
                score,
                metadata: ResultMetadata {
                    file_path: entry.file_path.clone(),
                    category: entry.category.clone(),
                    topic: entry.topic.clone(),
                    title: entry.title.clone(),
                    has_code: entry.has_code,
                },
            });
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentMetadata;
    use tempfile::TempDir;

    fn chunk(id: &str, text: &str, category: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            text: text.to_string(),
            metadata: DocumentMetadata {
                file_path: format!("{id}.md"),
                category: category.to_string(),
                topic: id.to_string(),
                title: id.to_string(),
                code_block_count: 0,
                source: "git".to_string(),
            },
        }
    }

    #[test]
    fn empty_query_yields_empty_results() {
        let tmp = TempDir::new().unwrap();
        let store = Bm25Store::build_from_chunks(tmp.path(), &[chunk("a", "hello world", "tools")]).unwrap();
        assert!(store.search("", 5, None).unwrap().is_empty());
    }

    #[test]
    fn top_k_zero_yields_empty_results() {
        let tmp = TempDir::new().unwrap();
        let store = Bm25Store::build_from_chunks(tmp.path(), &[chunk("a", "hello world", "tools")]).unwrap();
        assert!(store.search("hello", 0, None).unwrap().is_empty());
    }

    #[test]
    fn category_filter_on_nonexistent_category_is_empty_not_error() {
        let tmp = TempDir::new().unwrap();
        let store = Bm25Store::build_from_chunks(tmp.path(), &[chunk("a", "hello world", "tools")]).unwrap();
        let results = store.search("hello", 5, Some("nonexistent")).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn special_character_queries_do_not_error() {
        let tmp = TempDir::new().unwrap();
        let store = Bm25Store::build_from_chunks(tmp.path(), &[chunk("a", "func() example", "tools")]).unwrap();
        for q in ["func()", "a+b", "x.*y", "[array]", "a && b", "a || b"] {
            assert!(store.search(q, 5, None).is_ok());
        }
    }

    #[test]
    fn load_roundtrips_persisted_index() {
        let tmp = TempDir::new().unwrap();
        {
            let store = Bm25Store::build_from_chunks(tmp.path(), &[chunk("a", "hello world", "tools")]).unwrap();
            assert_eq!(store.search("hello", 5, None).unwrap().len(), 1);
        }
        let reloaded = Bm25Store::load(tmp.path()).unwrap().expect("should load");
        assert_eq!(reloaded.search("hello", 5, None).unwrap().len(), 1);
    }

    #[test]
    fn load_on_empty_dir_returns_none() {
        let tmp = TempDir::new().unwrap();
        assert!(Bm25Store::load(tmp.path()).unwrap().is_none());
    }
}
