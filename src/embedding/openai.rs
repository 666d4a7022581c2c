//! OpenAI-compatible embeddings endpoint, grounded in the teacher's
//! `embed_openai` (exponential backoff on 429/5xx, immediate failure on
//! other 4xx).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::config::Settings;
use crate::error::{CangjieError, Result};

use super::EmbeddingProvider;

const MAX_BACKOFF_EXP: u32 = 5; // caps backoff at 2^5 = 32s

pub struct OpenAiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_retries: u32,
}

impl OpenAiProvider {
    pub fn new(settings: &Settings) -> Result<Self> {
        let model = settings
            .embedding_model
            .clone()
            .ok_or_else(|| CangjieError::ConfigError("embedding_model required for openai".into()))?;
        let api_key = settings
            .openai_api_key
            .clone()
            .ok_or_else(|| CangjieError::ConfigError("OPENAI_API_KEY required for openai".into()))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(CangjieError::backend)?;
        Ok(Self {
            client,
            base_url: settings
                .openai_base_url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            api_key,
            model,
            max_retries: 5,
        })
    }
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingEntry>,
}

#[derive(Deserialize)]
struct EmbeddingEntry {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/embeddings", self.base_url);
        let mut attempt = 0u32;
        loop {
            let resp = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&json!({ "model": self.model, "input": texts }))
                .send()
                .await;

            match resp {
                Ok(r) if r.status().is_success() => {
                    let parsed: EmbeddingsResponse =
                        r.json().await.map_err(CangjieError::backend)?;
                    return Ok(parsed.data.into_iter().map(|e| e.embedding).collect());
                }
                Ok(r) if r.status() == 429 || r.status().is_server_error() => {
                    if attempt >= self.max_retries {
                        return Err(CangjieError::BackendError(anyhow::anyhow!(
                            "openai embeddings failed after {} retries: {}",
                            attempt,
                            r.status()
                        )));
                    }
                }
                Ok(r) => {
                    let status = r.status();
                    let body = r.text().await.unwrap_or_default();
                    return Err(CangjieError::BackendError(anyhow::anyhow!(
                        "openai embeddings request failed: {} {}",
                        status,
                        body
                    )));
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(CangjieError::backend(e));
                    }
                }
            }
            let backoff_secs = 1u64 << attempt.min(MAX_BACKOFF_EXP);
            tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
            attempt += 1;
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        0
    }
}
