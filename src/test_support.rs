use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::RagError;
use crate::config::Config;
use crate::embeddings::Embedder;

pub const TEST_DIMENSION: usize = 32;

/// Hashed bag-of-words embedder: texts sharing words land close together
#[derive(Debug, Default)]
pub struct StubEmbedder {
    calls: AtomicUsize,
}

impl StubEmbedder {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of `encode_batch` calls made so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn vector_for(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; TEST_DIMENSION];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            let bucket = (hasher.finish() % TEST_DIMENSION as u64) as usize;
            vector[bucket] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        } else {
            vector[0] = 1.0;
        }
        vector
    }
}

impl Embedder for StubEmbedder {
    fn model_name(&self) -> &str {
        "stub-bag-of-words"
    }

    fn dimension(&self) -> usize {
        TEST_DIMENSION
    }

    fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::vector_for(t)).collect())
    }
}

/// Embedder that always fails, for error-path tests
#[derive(Debug, Default)]
pub struct BrokenEmbedder;

impl Embedder for BrokenEmbedder {
    fn model_name(&self) -> &str {
        "broken"
    }

    fn dimension(&self) -> usize {
        TEST_DIMENSION
    }

    fn encode_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        Err(RagError::ModelUnavailable("weights missing".to_string()))
    }
}

/// Configuration rooted in `base_dir` with the default collections
pub fn test_config(base_dir: &Path) -> Config {
    Config {
        base_dir: base_dir.to_path_buf(),
        ..Config::default()
    }
}
