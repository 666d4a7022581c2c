//! Tool Surface: three documentation tools and six LSP tools, each a thin
//! adapter over the retrieval and LSP components (spec §4.12).
//!
//! Grounded in the Zxilly `cangjie-mcp` tool-surface shape
//! (`other_examples/543868e7_..._tools.rs.rs`): an `rmcp` `#[tool_router]`
//! server struct holding the wired-up components, one `#[tool]` method per
//! operation, each returning a JSON `CallToolResult`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Content, ServerCapabilities, ServerInfo};
use rmcp::{schemars, tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;

use crate::document_source::DocumentSource;
use crate::hybrid_retriever::HybridRetriever;
use crate::lsp::LspClient;
use crate::models::{CodeExample, IndexMetadata, SearchResult};

pub struct InnerState {
    pub retriever: HybridRetriever,
    pub docs: Arc<dyn DocumentSource>,
    pub lsp: Mutex<Option<LspClient>>,
    pub metadata: IndexMetadata,
}

#[derive(Clone)]
pub struct CangjieServer {
    tool_router: ToolRouter<CangjieServer>,
    inner: Arc<InnerState>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SearchDocsInput {
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub offset: usize,
    pub category: Option<String>,
    #[serde(default)]
    pub extract_code: bool,
}

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct GetTopicInput {
    pub topic: String,
    pub category: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ListTopicsInput {
    pub category: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct LspPositionInput {
    pub file: String,
    pub line: u32,
    pub character: u32,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct LspFileInput {
    pub file: String,
}

#[tool_router]
impl CangjieServer {
    pub fn new(inner: Arc<InnerState>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            inner,
        }
    }

    #[tool(description = "Search the Cangjie documentation corpus with hybrid dense+BM25 retrieval")]
    async fn search_docs(
        &self,
        Parameters(input): Parameters<SearchDocsInput>,
    ) -> Result<CallToolResult, McpError> {
        let raw = self
            .inner
            .retriever
            .search(&input.query, input.top_k + input.offset, input.category.as_deref(), true)
            .await
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;

        let page: Vec<&SearchResult> = raw.iter().skip(input.offset).take(input.top_k).collect();
        let has_more = raw.len() > input.offset + input.top_k;

        let items: Vec<serde_json::Value> = page
            .iter()
            .map(|r| {
                let code_examples = if input.extract_code {
                    Some(extract_code_examples(&r.text, &r.metadata.topic, &r.metadata.file_path))
                } else {
                    None
                };
                json!({
                    "content": r.text,
                    "score": r.score,
                    "file_path": r.metadata.file_path,
                    "category": r.metadata.category,
                    "topic": r.metadata.topic,
                    "title": r.metadata.title,
                    "has_code_examples": r.metadata.has_code,
                    "code_examples": code_examples,
                })
            })
            .collect();

        let result = json!({
            "items": items,
            "total": raw.len(),
            "count": items.len(),
            "offset": input.offset,
            "has_more": has_more,
            "next_offset": if has_more { Some(input.offset + input.top_k) } else { None },
        });
        Ok(CallToolResult::success(vec![Content::text(result.to_string())]))
    }

    #[tool(description = "Fetch a single documentation topic by name")]
    async fn get_topic(&self, Parameters(input): Parameters<GetTopicInput>) -> Result<CallToolResult, McpError> {
        match self.inner.docs.get_document_by_topic(&input.topic, input.category.as_deref()).await {
            Ok(doc) => {
                let result = json!({
                    "content": doc.text,
                    "file_path": doc.metadata.file_path,
                    "category": doc.metadata.category,
                    "topic": doc.metadata.topic,
                    "title": doc.metadata.title,
                });
                Ok(CallToolResult::success(vec![Content::text(result.to_string())]))
            }
            Err(_) => {
                let suggestions = self.did_you_mean(&input.topic, input.category.as_deref()).await;
                let result = json!({
                    "error": format!("topic '{}' not found", input.topic),
                    "did_you_mean": suggestions,
                });
                Ok(CallToolResult::success(vec![Content::text(result.to_string())]))
            }
        }
    }

    #[tool(description = "List documentation topics, optionally filtered by category")]
    async fn list_topics(&self, Parameters(input): Parameters<ListTopicsInput>) -> Result<CallToolResult, McpError> {
        let categories = self
            .inner
            .docs
            .get_categories()
            .await
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;

        let mut by_category = serde_json::Map::new();
        let mut total_topics = 0usize;
        let mut error = None;

        let target_categories: Vec<String> = match &input.category {
            Some(c) if !categories.contains(c) => {
                error = Some(format!("unknown category '{c}'"));
                Vec::new()
            }
            Some(c) => vec![c.clone()],
            None => categories.clone(),
        };

        for category in &target_categories {
            let topics = self
                .inner
                .docs
                .get_topics_in_category(category)
                .await
                .map_err(|e| McpError::internal_error(e.to_string(), None))?;
            total_topics += topics.len();
            let entries: Vec<serde_json::Value> = topics
                .into_iter()
                .map(|(name, title)| json!({"name": name, "title": title}))
                .collect();
            by_category.insert(category.clone(), serde_json::Value::Array(entries));
        }

        let result = json!({
            "categories": by_category,
            "total_categories": target_categories.len(),
            "total_topics": total_topics,
            "available_categories": categories,
            "error": error,
        });
        Ok(CallToolResult::success(vec![Content::text(result.to_string())]))
    }

    #[tool(description = "Go to definition via the Cangjie language server")]
    async fn lsp_definition(&self, Parameters(input): Parameters<LspPositionInput>) -> Result<CallToolResult, McpError> {
        let lsp = self.inner.lsp.lock().await;
        let client = lsp.as_ref().ok_or_else(|| McpError::internal_error("lsp client not started", None))?;
        let result = client
            .definition(&PathBuf::from(&input.file), input.line, input.character)
            .await
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        Ok(CallToolResult::success(vec![Content::text(result.to_string())]))
    }

    #[tool(description = "Find references via the Cangjie language server")]
    async fn lsp_references(&self, Parameters(input): Parameters<LspPositionInput>) -> Result<CallToolResult, McpError> {
        let lsp = self.inner.lsp.lock().await;
        let client = lsp.as_ref().ok_or_else(|| McpError::internal_error("lsp client not started", None))?;
        let result = client
            .references(&PathBuf::from(&input.file), input.line, input.character)
            .await
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        Ok(CallToolResult::success(vec![Content::text(result.to_string())]))
    }

    #[tool(description = "Get hover information via the Cangjie language server")]
    async fn lsp_hover(&self, Parameters(input): Parameters<LspPositionInput>) -> Result<CallToolResult, McpError> {
        let lsp = self.inner.lsp.lock().await;
        let client = lsp.as_ref().ok_or_else(|| McpError::internal_error("lsp client not started", None))?;
        let result = client
            .hover(&PathBuf::from(&input.file), input.line, input.character)
            .await
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        Ok(CallToolResult::success(vec![Content::text(result.to_string())]))
    }

    #[tool(description = "Get completions via the Cangjie language server")]
    async fn lsp_completion(&self, Parameters(input): Parameters<LspPositionInput>) -> Result<CallToolResult, McpError> {
        let lsp = self.inner.lsp.lock().await;
        let client = lsp.as_ref().ok_or_else(|| McpError::internal_error("lsp client not started", None))?;
        let result = client
            .completion(&PathBuf::from(&input.file), input.line, input.character)
            .await
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        Ok(CallToolResult::success(vec![Content::text(result.to_string())]))
    }

    #[tool(description = "List document symbols via the Cangjie language server")]
    async fn lsp_symbols(&self, Parameters(input): Parameters<LspFileInput>) -> Result<CallToolResult, McpError> {
        let lsp = self.inner.lsp.lock().await;
        let client = lsp.as_ref().ok_or_else(|| McpError::internal_error("lsp client not started", None))?;
        let result = client
            .document_symbol(&PathBuf::from(&input.file))
            .await
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        Ok(CallToolResult::success(vec![Content::text(result.to_string())]))
    }

    #[tool(description = "Get cached diagnostics via the Cangjie language server")]
    async fn lsp_diagnostics(&self, Parameters(input): Parameters<LspFileInput>) -> Result<CallToolResult, McpError> {
        let lsp = self.inner.lsp.lock().await;
        let client = lsp.as_ref().ok_or_else(|| McpError::internal_error("lsp client not started", None))?;
        let result = client
            .diagnostics(&PathBuf::from(&input.file), Duration::from_secs(5))
            .await
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        Ok(CallToolResult::success(vec![Content::text(json!(result).to_string())]))
    }
}

impl CangjieServer {
    async fn did_you_mean(&self, topic: &str, category: Option<&str>) -> Vec<String> {
        let categories = match category {
            Some(c) => vec![c.to_string()],
            None => self.inner.docs.get_categories().await.unwrap_or_default(),
        };
        let mut candidates: Vec<String> = Vec::new();
        for category in categories {
            if let Ok(topics) = self.inner.docs.get_topics_in_category(&category).await {
                candidates.extend(topics.into_iter().map(|(name, _)| name));
            }
        }
        candidates.sort_by(|a, b| {
            strsim::jaro_winkler(topic, b)
                .partial_cmp(&strsim::jaro_winkler(topic, a))
                .unwrap()
        });
        candidates.truncate(3);
        candidates
    }
}

#[tool_handler]
impl ServerHandler for CangjieServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Query the Cangjie documentation corpus and bridge to the Cangjie language server.".into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

/// Parses fenced code blocks out of `text` (supplemented feature, spec §4.12
/// `extract_code` flag).
fn extract_code_examples(text: &str, topic: &str, file: &str) -> Vec<CodeExample> {
    let mut examples = Vec::new();
    let mut lines = text.lines().peekable();
    let mut context_buf: Vec<&str> = Vec::new();
    while let Some(line) = lines.next() {
        if let Some(lang) = line.trim_start().strip_prefix("```") {
            let language = if lang.trim().is_empty() { "text".to_string() } else { lang.trim().to_string() };
            let mut code_lines = Vec::new();
            for inner in lines.by_ref() {
                if inner.trim_start().starts_with("```") {
                    break;
                }
                code_lines.push(inner);
            }
            examples.push(CodeExample {
                language,
                code: code_lines.join("\n"),
                context: context_buf.join(" ").trim().to_string(),
                source_topic: topic.to_string(),
                source_file: file.to_string(),
            });
            context_buf.clear();
        } else {
            context_buf.push(line);
            if context_buf.len() > 3 {
                context_buf.remove(0);
            }
        }
    }
    examples
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_code_examples_parses_fenced_blocks() {
        let text = "some context\n```cj\nfunc main() {}\n```\nmore text";
        let examples = extract_code_examples(text, "topic", "a.md");
        assert_eq!(examples.len(), 1);
        assert_eq!(examples[0].language, "cj");
        assert!(examples[0].code.contains("func main"));
    }

    #[test]
    fn extract_code_examples_empty_when_no_fences() {
        assert!(extract_code_examples("plain text only", "t", "a.md").is_empty());
    }
}
