// Embeddings module
// Text chunking plus the embedding backends that turn chunks into vectors

pub mod chunking;
pub mod fastembed;
pub mod ollama;

use std::sync::Arc;

use tracing::info;

use crate::RagError;
use crate::config::{Config, EmbeddingProvider};

pub use chunking::{Chunk, ChunkingConfig, TextWindow, chunk_document, split_windows};
pub use self::fastembed::FastEmbedder;
pub use ollama::OllamaEmbedder;

/// A loaded sentence-embedding model.
///
/// Implementations keep the model resident for their whole lifetime so that
/// repeated calls do not pay the load cost again.
pub trait Embedder: Send + Sync {
    /// Name of the model producing the vectors
    fn model_name(&self) -> &str;

    /// Length of every vector this embedder returns
    fn dimension(&self) -> usize;

    /// Embed many texts, returning one vector per input in the same order
    fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError>;

    /// Embed a single text
    #[inline]
    fn encode(&self, text: &str) -> Result<Vec<f32>, RagError> {
        self.encode_batch(&[text.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::ModelUnavailable("model returned no embedding".to_string()))
    }
}

/// Load the embedder selected in the configuration
#[inline]
pub fn load_embedder(config: &Config) -> Result<Arc<dyn Embedder>, RagError> {
    let embedder: Arc<dyn Embedder> = match config.embedding.provider {
        EmbeddingProvider::FastEmbed => {
            Arc::new(FastEmbedder::new(&config.embedding, &config.model_cache_path())?)
        }
        EmbeddingProvider::Ollama => Arc::new(OllamaEmbedder::new(&config.embedding)?),
    };

    info!(
        "Loaded embedding model {} ({} dimensions)",
        embedder.model_name(),
        embedder.dimension()
    );
    Ok(embedder)
}

/// Check that every vector has the expected length
pub(crate) fn check_dimensions(vectors: &[Vec<f32>], expected: usize) -> Result<(), RagError> {
    match vectors.iter().find(|v| v.len() != expected) {
        Some(bad) => Err(RagError::ModelUnavailable(format!(
            "model returned a {}-dimensional vector, expected {}",
            bad.len(),
            expected
        ))),
        None => Ok(()),
    }
}
