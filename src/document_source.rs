//! Document Source: unified read API over a git tree or a remote HTTP peer
//! (spec §4.9).

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::DocLang;
use crate::error::{CangjieError, Result};
use crate::git_repo::GitRepo;
use crate::models::{Document, DocumentMetadata};

#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn is_available(&self) -> bool;
    async fn get_categories(&self) -> Result<Vec<String>>;
    async fn get_topics_in_category(&self, category: &str) -> Result<Vec<(String, String)>>;
    async fn get_document_by_topic(&self, topic: &str, category: Option<&str>) -> Result<Document>;
    async fn load_all_documents(&self) -> Result<Vec<Document>>;
}

/// Reads documents directly from the git object database at a specific ref,
/// via `GitRepo::read_tree`'s `git ls-tree`/`git cat-file blob` — no
/// checkout, so the shared clone's working tree is never mutated.
pub struct GitDocumentSource {
    repo: GitRepo,
    lang: DocLang,
    version: String,
}

impl GitDocumentSource {
    pub fn new(repo: GitRepo, lang: DocLang, version: String) -> Self {
        Self { repo, lang, version }
    }

    fn docs_root(&self) -> String {
        format!("docs/dev-guide/{}", self.lang.source_dir())
    }

    fn documents(&self) -> Result<Vec<Document>> {
        let root_prefix = self.docs_root();
        let entries = self.repo.read_tree(&self.version, &root_prefix)?;
        let mut docs = Vec::new();
        for entry in entries {
            if entry.path.extension_is_md() {
                if let Some(doc) = build_document(&entry.path, &root_prefix, &entry.contents) {
                    docs.push(doc);
                }
            }
        }
        docs.sort_by(|a, b| a.doc_id.cmp(&b.doc_id));
        Ok(docs)
    }
}

trait PathExt {
    fn extension_is_md(&self) -> bool;
}

impl PathExt for String {
    fn extension_is_md(&self) -> bool {
        self.ends_with(".md")
    }
}

fn build_document(full_path: &str, root_prefix: &str, contents: &[u8]) -> Option<Document> {
    let relative = full_path.strip_prefix(root_prefix)?.trim_start_matches('/');
    let parts: Vec<&str> = relative.split('/').collect();
    // Directories beginning with '.' or '_' are ignored (spec §4.9).
    if parts.iter().any(|p| p.starts_with('.') || p.starts_with('_')) {
        return None;
    }
    let category = parts.first().copied().unwrap_or("uncategorized").to_string();
    let file_name = parts.last().copied().unwrap_or("");
    let topic = file_name.trim_end_matches(".md").to_string();
    let text = String::from_utf8_lossy(contents).to_string();
    let title = first_heading(&text).unwrap_or_else(|| topic.clone());
    let code_block_count = count_code_blocks(&text);

    Some(Document {
        doc_id: full_path.to_string(),
        text,
        metadata: DocumentMetadata {
            file_path: full_path.to_string(),
            category,
            topic,
            title,
            code_block_count,
            source: "git".to_string(),
        },
    })
}

fn first_heading(text: &str) -> Option<String> {
    text.lines()
        .find(|line| line.trim_start().starts_with("# "))
        .map(|line| line.trim_start().trim_start_matches('#').trim().to_string())
}

fn count_code_blocks(text: &str) -> usize {
    text.lines().filter(|l| l.trim_start().starts_with("```")).count() / 2
}

#[async_trait]
impl DocumentSource for GitDocumentSource {
    async fn is_available(&self) -> bool {
        self.repo.dir().exists()
    }

    async fn get_categories(&self) -> Result<Vec<String>> {
        let docs = self.documents()?;
        let mut categories: Vec<String> = docs.into_iter().map(|d| d.metadata.category).collect();
        categories.sort();
        categories.dedup();
        Ok(categories)
    }

    async fn get_topics_in_category(&self, category: &str) -> Result<Vec<(String, String)>> {
        let docs = self.documents()?;
        let mut topics: Vec<(String, String)> = docs
            .into_iter()
            .filter(|d| d.metadata.category == category)
            .map(|d| (d.metadata.topic, d.metadata.title))
            .collect();
        topics.sort();
        Ok(topics)
    }

    async fn get_document_by_topic(&self, topic: &str, category: Option<&str>) -> Result<Document> {
        let docs = self.documents()?;
        docs.into_iter()
            .find(|d| d.metadata.topic == topic && category.map_or(true, |c| d.metadata.category == c))
            .ok_or_else(|| CangjieError::NotFound(format!("topic '{topic}' not found")))
    }

    async fn load_all_documents(&self) -> Result<Vec<Document>> {
        self.documents()
    }
}

/// HTTP client against a peer exposing `GET /topics`, `GET /topics/<cat>/<topic>`.
/// Supports browsing only; bulk loading is unsupported (spec §4.9).
pub struct RemoteDocumentSource {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct TopicsResponse {
    categories: BTreeMap<String, Vec<TopicInfo>>,
}

#[derive(Deserialize, Clone)]
struct TopicInfo {
    name: String,
    title: String,
}

#[derive(Deserialize)]
struct TopicContentResponse {
    content: String,
    file_path: String,
    category: String,
    topic: String,
    title: String,
}

impl RemoteDocumentSource {
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    async fn fetch_topics(&self) -> Result<TopicsResponse> {
        let url = format!("{}/topics", self.base_url);
        self.client
            .get(&url)
            .send()
            .await
            .map_err(|e| CangjieError::SourceUnavailable(format!("remote peer unreachable: {e}")))?
            .json()
            .await
            .map_err(|e| CangjieError::ProtocolError(format!("malformed /topics response: {e}")))
    }
}

#[async_trait]
impl DocumentSource for RemoteDocumentSource {
    async fn is_available(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        self.client.get(&url).send().await.map(|r| r.status().is_success()).unwrap_or(false)
    }

    async fn get_categories(&self) -> Result<Vec<String>> {
        let resp = self.fetch_topics().await?;
        let mut categories: Vec<String> = resp.categories.keys().cloned().collect();
        categories.sort();
        Ok(categories)
    }

    async fn get_topics_in_category(&self, category: &str) -> Result<Vec<(String, String)>> {
        let resp = self.fetch_topics().await?;
        Ok(resp
            .categories
            .get(category)
            .map(|topics| topics.iter().map(|t| (t.name.clone(), t.title.clone())).collect())
            .unwrap_or_default())
    }

    async fn get_document_by_topic(&self, topic: &str, category: Option<&str>) -> Result<Document> {
        let category = category.ok_or_else(|| {
            CangjieError::ConfigError("remote document source requires a category".into())
        })?;
        let url = format!("{}/topics/{}/{}", self.base_url, category, topic);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CangjieError::SourceUnavailable(format!("remote peer unreachable: {e}")))?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(CangjieError::NotFound(format!("topic '{topic}' not found")));
        }
        let body: TopicContentResponse = resp
            .json()
            .await
            .map_err(|e| CangjieError::ProtocolError(format!("malformed topic response: {e}")))?;
        Ok(Document {
            doc_id: body.file_path.clone(),
            text: body.content,
            metadata: DocumentMetadata {
                file_path: body.file_path,
                category: body.category,
                topic: body.topic,
                title: body.title,
                code_block_count: 0,
                source: "remote".to_string(),
            },
        })
    }

    async fn load_all_documents(&self) -> Result<Vec<Document>> {
        Err(CangjieError::ConfigError(
            "bulk load_all_documents is unsupported on a remote document source".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_heading_extracts_top_level_heading() {
        let text = "intro text\n# My Title\nmore text";
        assert_eq!(first_heading(text), Some("My Title".to_string()));
    }

    #[test]
    fn first_heading_none_when_absent() {
        assert_eq!(first_heading("no heading here"), None);
    }

    #[test]
    fn count_code_blocks_counts_fence_pairs() {
        let text = "```rust\nfn main() {}\n```\ntext\n```cj\nmain()\n```";
        assert_eq!(count_code_blocks(text), 2);
    }

    #[test]
    fn build_document_skips_dotfiles_and_underscored_dirs() {
        assert!(build_document("docs/dev-guide/source_zh_cn/.hidden/a.md", "docs/dev-guide/source_zh_cn", b"x").is_none());
        assert!(build_document("docs/dev-guide/source_zh_cn/_draft/a.md", "docs/dev-guide/source_zh_cn", b"x").is_none());
    }

    #[test]
    fn build_document_derives_category_topic_title() {
        let doc = build_document(
            "docs/dev-guide/source_zh_cn/tools/compiler.md",
            "docs/dev-guide/source_zh_cn",
            b"# Compiler Guide\ntext",
        )
        .unwrap();
        assert_eq!(doc.metadata.category, "tools");
        assert_eq!(doc.metadata.topic, "compiler");
        assert_eq!(doc.metadata.title, "Compiler Guide");
    }
}
