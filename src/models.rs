//! Core data types shared across the retrieval and LSP subsystems (spec §3).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A single documentation file read from a Document Source. Immutable once
/// constructed; `doc_id` is the repo-relative path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub doc_id: String,
    pub text: String,
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub file_path: String,
    pub category: String,
    pub topic: String,
    pub title: String,
    pub code_block_count: usize,
    pub source: String,
}

/// A passage of text produced by the Chunker; the unit of retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    pub metadata: DocumentMetadata,
}

/// `Chunk` plus a fixed-dimension embedding vector, as handed to the Dense Store.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// `Chunk` plus its token list, as handed to the BM25 Store.
#[derive(Debug, Clone)]
pub struct TokenizedChunk {
    pub chunk: Chunk,
    pub tokens: Vec<String>,
}

/// `{version, lang, embedding_model, document_count}` sidecar for a persisted index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexMetadata {
    pub version: String,
    pub lang: String,
    pub embedding_model: String,
    pub document_count: usize,
}

/// `{version, lang, embedding_model, format_version}` sidecar inside a prebuilt archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrebuiltMetadata {
    pub version: String,
    pub lang: String,
    pub embedding_model: String,
    pub format_version: u32,
}

pub const PREBUILT_FORMAT_VERSION: u32 = 1;

/// A single code block extracted from a result's text (supplemented feature).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeExample {
    pub language: String,
    pub code: String,
    pub context: String,
    pub source_topic: String,
    pub source_file: String,
}

/// `{text, score, metadata}` returned by any retriever stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub text: String,
    pub score: f32,
    pub metadata: ResultMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultMetadata {
    pub file_path: String,
    pub category: String,
    pub topic: String,
    pub title: String,
    pub has_code: bool,
}

impl SearchResult {
    /// The RRF dedup key: `file_path || "|" || text[0..200]` (spec §4.5).
    pub fn dedup_key(&self) -> String {
        let prefix_len = self
            .text
            .char_indices()
            .nth(200)
            .map(|(i, _)| i)
            .unwrap_or(self.text.len());
        format!("{}|{}", self.metadata.file_path, &self.text[..prefix_len])
    }
}

/// LSP client connection lifecycle (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LspState {
    NotInitialized,
    WaitingForInitialized,
    Ready,
    ShuttingDown,
    Exited,
}

/// `module_uri -> ModuleOption` entry built by the Dependency Resolver for
/// the LSP `initializationOptions` (spec §3, §4.11).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ModuleOption {
    pub name: String,
    pub requires: HashMap<String, PathUri>,
    pub package_requires: PackageRequires,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub java_requires: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathUri {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PackageRequires {
    pub package_option: HashMap<String, String>,
    pub path_option: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(file_path: &str, text: &str) -> SearchResult {
        SearchResult {
            text: text.to_string(),
            score: 1.0,
            metadata: ResultMetadata {
                file_path: file_path.to_string(),
                category: "tools".to_string(),
                topic: "t".to_string(),
                title: "T".to_string(),
                has_code: false,
            },
        }
    }

    #[test]
    fn dedup_key_combines_path_and_prefix() {
        let r = result("a.md", "hello world");
        assert_eq!(r.dedup_key(), "a.md|hello world");
    }

    #[test]
    fn dedup_key_truncates_at_200_chars() {
        let text = "x".repeat(500);
        let r = result("a.md", &text);
        let key = r.dedup_key();
        assert_eq!(key.len(), "a.md|".len() + 200);
    }
}
