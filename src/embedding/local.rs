//! Local embedding provider backed by `fastembed`, kept from the teacher's
//! `local-embeddings-fastembed` feature stack.

use async_trait::async_trait;
use std::sync::Mutex;

use crate::config::Settings;
use crate::error::{CangjieError, Result};

use super::EmbeddingProvider;

pub struct LocalProvider {
    model_name: String,
    dims: usize,
    #[cfg(feature = "local-embeddings-fastembed")]
    engine: Mutex<fastembed::TextEmbedding>,
    #[cfg(not(feature = "local-embeddings-fastembed"))]
    _engine: std::marker::PhantomData<Mutex<()>>,
}

/// Maps a configured model name to the `fastembed` variant it actually
/// loads, plus that variant's output dimensionality. `model_name()` must
/// always reflect the model that produced the vectors, since `lifecycle.rs`
/// uses it to detect a stale persisted index.
#[cfg(feature = "local-embeddings-fastembed")]
fn resolve_model(name: &str) -> Result<(fastembed::EmbeddingModel, usize)> {
    use fastembed::EmbeddingModel;
    match name {
        "BGESmallENV15" => Ok((EmbeddingModel::BGESmallENV15, 384)),
        "BGEBaseENV15" => Ok((EmbeddingModel::BGEBaseENV15, 768)),
        "BGELargeENV15" => Ok((EmbeddingModel::BGELargeENV15, 1024)),
        "BGESmallZHV15" => Ok((EmbeddingModel::BGESmallZHV15, 512)),
        "MultilingualE5Small" => Ok((EmbeddingModel::MultilingualE5Small, 384)),
        "MultilingualE5Base" => Ok((EmbeddingModel::MultilingualE5Base, 768)),
        "MultilingualE5Large" => Ok((EmbeddingModel::MultilingualE5Large, 1024)),
        other => Err(CangjieError::ConfigError(format!(
            "unsupported local embedding model '{other}'"
        ))),
    }
}

impl LocalProvider {
    #[cfg(feature = "local-embeddings-fastembed")]
    pub fn new(settings: &Settings) -> Result<Self> {
        use fastembed::{InitOptions, TextEmbedding};

        let model_name = settings
            .embedding_model
            .clone()
            .unwrap_or_else(|| "BGESmallENV15".to_string());
        let (model, dims) = resolve_model(&model_name)?;

        let engine = TextEmbedding::try_new(InitOptions::new(model).with_show_download_progress(false))
            .map_err(CangjieError::backend)?;

        Ok(Self {
            model_name,
            dims,
            engine: Mutex::new(engine),
        })
    }

    #[cfg(not(feature = "local-embeddings-fastembed"))]
    pub fn new(settings: &Settings) -> Result<Self> {
        Err(CangjieError::ConfigError(
            "local embedding provider requires the local-embeddings-fastembed feature".into(),
        ))
    }
}

#[async_trait]
impl EmbeddingProvider for LocalProvider {
    #[cfg(feature = "local-embeddings-fastembed")]
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let engine = self.engine.lock().map_err(|_| {
            CangjieError::BackendError(anyhow::anyhow!("local embedding engine mutex poisoned"))
        })?;
        let docs: Vec<&str> = texts.iter().map(|s| s.as_str()).collect();
        engine
            .embed(docs, None)
            .map_err(CangjieError::backend)
    }

    #[cfg(not(feature = "local-embeddings-fastembed"))]
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        unreachable!("LocalProvider::new fails without the feature enabled")
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> usize {
        self.dims
    }
}
