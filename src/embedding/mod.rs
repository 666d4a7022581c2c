//! Embedding provider collaborator (spec §1: "out of scope, specified only
//! by its interface" — `embed(texts) -> vectors`).
//!
//! Grounded in the teacher's `embedding.rs`/`embedding/mod.rs`: a small
//! trait plus closed set of variants (disabled, OpenAI, local), selected by
//! `Settings::embedding` rather than a registry, per the "variants not
//! trait objects for closed sets" guidance in spec §9.

mod local;
mod openai;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{EmbeddingType, Settings};
use crate::error::{CangjieError, Result};

pub use local::LocalProvider;
pub use openai::OpenAiProvider;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embeds a batch of texts, returning one vector per input in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn model_name(&self) -> &str;

    fn dims(&self) -> usize;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| CangjieError::BackendError(anyhow::anyhow!("empty embedding response")))
    }
}

pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(CangjieError::ConfigError(
            "embedding is disabled; configure --embedding openai|local".into(),
        ))
    }

    fn model_name(&self) -> &str {
        "disabled"
    }

    fn dims(&self) -> usize {
        0
    }
}

pub fn create_provider(settings: &Settings) -> Result<Arc<dyn EmbeddingProvider>> {
    match settings.embedding {
        EmbeddingType::Disabled => Ok(Arc::new(DisabledProvider)),
        EmbeddingType::Openai => Ok(Arc::new(OpenAiProvider::new(settings)?)),
        EmbeddingType::Local => Ok(Arc::new(LocalProvider::new(settings)?)),
    }
}

/// Little-endian f32 byte encoding, for BLOB storage in the Dense Store.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_roundtrip() {
        let v = vec![1.0_f32, -2.5, 3.75];
        let blob = vec_to_blob(&v);
        assert_eq!(blob_to_vec(&blob), v);
    }

    #[test]
    fn cosine_similarity_empty_is_zero() {
        assert_eq!(cosine_similarity(&[], &[1.0]), 0.0);
    }

    #[test]
    fn cosine_similarity_identical_is_one() {
        let v = vec![1.0_f32, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }
}
