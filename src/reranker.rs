//! Reranker Interface: thin adapter to a cross-encoder or remote rerank API
//! (spec §4.7). A closed set of three variants, matching spec §9's guidance
//! to prefer variants over trait objects for closed sets.
//!
//! `Remote` mirrors the original's `SiliconFlowReranker`: a POST to
//! `{base_url}/rerank` with `{model, query, documents, top_n,
//! return_documents: false}`, scored results returned as `{index,
//! relevance_score}` pairs in descending relevance order.

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use crate::config::{RerankType, Settings};
use crate::error::{CangjieError, Result};
use crate::models::SearchResult;

const REMOTE_RERANK_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub enum Reranker {
    NoOp,
    Local {
        model: String,
    },
    Remote {
        client: reqwest::Client,
        base_url: String,
        model: String,
        api_key: String,
    },
}

impl Reranker {
    pub fn from_settings(settings: &Settings) -> Self {
        match settings.rerank {
            RerankType::None => Reranker::NoOp,
            RerankType::Local => Reranker::Local {
                model: settings.rerank_model.clone().unwrap_or_else(|| "default".to_string()),
            },
            RerankType::Remote => Reranker::Remote {
                client: reqwest::Client::builder()
                    .timeout(REMOTE_RERANK_TIMEOUT)
                    .build()
                    .unwrap_or_default(),
                base_url: settings
                    .openai_base_url
                    .clone()
                    .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
                model: settings.rerank_model.clone().unwrap_or_else(|| "default".to_string()),
                api_key: settings.rerank_api_key.clone().unwrap_or_default(),
            },
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, Reranker::NoOp)
    }

    /// `rerank(query, results, top_k) -> list<Result>`: preserves metadata,
    /// replaces score with the reranker's relevance score, sorted descending.
    pub async fn rerank(&self, query: &str, results: Vec<SearchResult>, top_k: usize) -> Result<Vec<SearchResult>> {
        match self {
            Reranker::NoOp => {
                let mut results = results;
                results.truncate(top_k);
                Ok(results)
            }
            Reranker::Local { .. } => self.rerank_by_lexical_overlap(query, results, top_k),
            Reranker::Remote { client, base_url, model, api_key } => {
                rerank_remote(client, base_url, model, api_key, query, results, top_k).await
            }
        }
    }

    /// Local fallback scoring: token-overlap ratio between query and result
    /// text, standing in for an on-box cross-encoder model. Grounded in the
    /// same "rank by evidence, not by original retriever score" contract a
    /// real cross-encoder fulfills, without requiring a bundled ONNX model.
    fn rerank_by_lexical_overlap(&self, query: &str, mut results: Vec<SearchResult>, top_k: usize) -> Result<Vec<SearchResult>> {
        let query_tokens: std::collections::HashSet<String> =
            crate::tokenizer::tokenize(query).into_iter().collect();
        for result in &mut results {
            let result_tokens: std::collections::HashSet<String> =
                crate::tokenizer::tokenize(&result.text).into_iter().collect();
            let overlap = query_tokens.intersection(&result_tokens).count();
            let denom = query_tokens.len().max(1);
            result.score = overlap as f32 / denom as f32;
        }
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
        results.truncate(top_k);
        Ok(results)
    }
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankEntry>,
}

#[derive(Deserialize)]
struct RerankEntry {
    index: usize,
    relevance_score: f32,
}

async fn rerank_remote(
    client: &reqwest::Client,
    base_url: &str,
    model: &str,
    api_key: &str,
    query: &str,
    results: Vec<SearchResult>,
    top_k: usize,
) -> Result<Vec<SearchResult>> {
    if results.is_empty() {
        return Ok(Vec::new());
    }
    let documents: Vec<&str> = results.iter().map(|r| r.text.as_str()).collect();
    let url = format!("{base_url}/rerank");
    let response = client
        .post(&url)
        .bearer_auth(api_key)
        .json(&json!({
            "model": model,
            "query": query,
            "documents": documents,
            "top_n": top_k,
            "return_documents": false,
        }))
        .send()
        .await
        .map_err(|e| CangjieError::BackendError(anyhow::anyhow!("remote reranker unreachable: {e}")))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(CangjieError::BackendError(anyhow::anyhow!(
            "remote reranker request failed: {status} {body}"
        )));
    }

    let parsed: RerankResponse = response
        .json()
        .await
        .map_err(|e| CangjieError::ProtocolError(format!("malformed rerank response: {e}")))?;

    let mut reranked = Vec::with_capacity(parsed.results.len());
    for entry in parsed.results {
        if let Some(mut result) = results.get(entry.index).cloned() {
            result.score = entry.relevance_score;
            reranked.push(result);
        }
    }
    Ok(reranked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResultMetadata;

    fn result(text: &str, score: f32) -> SearchResult {
        SearchResult {
            text: text.to_string(),
            score,
            metadata: ResultMetadata {
                file_path: "a.md".to_string(),
                category: "c".to_string(),
                topic: "t".to_string(),
                title: "T".to_string(),
                has_code: false,
            },
        }
    }

    #[tokio::test]
    async fn noop_truncates_without_rescoring() {
        let reranker = Reranker::NoOp;
        let results = vec![result("a", 0.1), result("b", 0.9)];
        let out = reranker.rerank("q", results, 1).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].text, "a");
    }

    #[tokio::test]
    async fn local_rerank_sorts_by_overlap_descending() {
        let reranker = Reranker::Local { model: "m".to_string() };
        let results = vec![result("unrelated content", 0.9), result("函数定义 details", 0.1)];
        let out = reranker.rerank("函数定义", results, 2).await.unwrap();
        assert_eq!(out[0].text, "函数定义 details");
    }
}
