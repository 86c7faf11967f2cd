//! In-process sentence embeddings via fastembed (ONNX runtime).

#[cfg(test)]
mod tests;

use std::path::Path;
use std::sync::Mutex;

use ::fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tracing::{debug, info};

use super::{Embedder, check_dimensions};
use crate::RagError;
use crate::config::EmbeddingConfig;

/// Embedding model loaded once and kept resident for the process lifetime.
pub struct FastEmbedder {
    model: Mutex<TextEmbedding>,
    model_name: String,
    dimension: usize,
    batch_size: usize,
}

/// Map a configured model name onto a fastembed model and its output dimension.
///
/// Names are matched case-insensitively, with or without the publishing
/// organisation prefix (`sentence-transformers/`, `BAAI/`, `nomic-ai/`).
#[inline]
pub fn resolve_model(name: &str) -> Result<(EmbeddingModel, usize), RagError> {
    let lowered = name.trim().to_ascii_lowercase();
    let short = lowered.rsplit('/').next().unwrap_or(lowered.as_str());

    match short {
        "all-minilm-l6-v2" => Ok((EmbeddingModel::AllMiniLML6V2, 384)),
        "all-minilm-l12-v2" => Ok((EmbeddingModel::AllMiniLML12V2, 384)),
        "bge-small-en-v1.5" => Ok((EmbeddingModel::BGESmallENV15, 384)),
        "bge-base-en-v1.5" => Ok((EmbeddingModel::BGEBaseENV15, 768)),
        "bge-large-en-v1.5" => Ok((EmbeddingModel::BGELargeENV15, 1024)),
        "nomic-embed-text-v1.5" => Ok((EmbeddingModel::NomicEmbedTextV15, 768)),
        _ => Err(RagError::ModelUnavailable(format!(
            "unknown embedding model '{}'",
            name
        ))),
    }
}

impl FastEmbedder {
    /// Load the configured model, downloading weights into `cache_dir` on first use.
    #[inline]
    pub fn new(config: &EmbeddingConfig, cache_dir: &Path) -> Result<Self, RagError> {
        let (model, dimension) = resolve_model(&config.model_name)?;

        std::fs::create_dir_all(cache_dir).map_err(|e| {
            RagError::ModelUnavailable(format!(
                "cannot create model cache directory {}: {}",
                cache_dir.display(),
                e
            ))
        })?;

        info!(
            "Loading embedding model {} (cache: {})",
            config.model_name,
            cache_dir.display()
        );

        let options = InitOptions::new(model)
            .with_cache_dir(cache_dir.to_path_buf())
            .with_show_download_progress(config.show_download_progress);

        let text_embedding = TextEmbedding::try_new(options).map_err(|e| {
            RagError::ModelUnavailable(format!(
                "failed to load model '{}': {}",
                config.model_name, e
            ))
        })?;

        Ok(Self {
            model: Mutex::new(text_embedding),
            model_name: config.model_name.clone(),
            dimension,
            batch_size: config.batch_size as usize,
        })
    }
}

impl Embedder for FastEmbedder {
    #[inline]
    fn model_name(&self) -> &str {
        &self.model_name
    }

    #[inline]
    fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Embedding {} texts with {}", texts.len(), self.model_name);

        let model = self
            .model
            .lock()
            .map_err(|_| RagError::ModelUnavailable("embedding model lock poisoned".to_string()))?;

        let vectors = model
            .embed(texts.to_vec(), Some(self.batch_size))
            .map_err(|e| RagError::ModelUnavailable(format!("inference failed: {}", e)))?;
        drop(model);

        if vectors.len() != texts.len() {
            return Err(RagError::ModelUnavailable(format!(
                "model returned {} embeddings for {} texts",
                vectors.len(),
                texts.len()
            )));
        }
        check_dimensions(&vectors, self.dimension)?;

        Ok(vectors)
    }
}
