
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::RagError;

/// A source text file loaded for ingestion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Path the document was read from (canonicalized when read from disk)
    pub path: PathBuf,
    /// Full UTF-8 text of the document
    pub text: String,
    /// Hex SHA-256 digest of the document bytes
    pub content_hash: String,
}

impl Document {
    /// Build a document from in-memory text, attributing it to `source`
    #[inline]
    pub fn from_text(source: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        let text = text.into();
        let content_hash = content_hash(text.as_bytes());
        Self {
            path: source.into(),
            text,
            content_hash,
        }
    }

    /// Read a document from disk.
    ///
    /// Unreadable files and files that are not valid UTF-8 are reported as
    /// [`RagError::MalformedDocument`].
    #[inline]
    pub async fn read(path: &Path) -> Result<Self, RagError> {
        let malformed = |reason: String| RagError::MalformedDocument {
            path: path.to_path_buf(),
            reason,
        };

        let canonical = tokio::fs::canonicalize(path)
            .await
            .map_err(|e| malformed(format!("cannot resolve path: {}", e)))?;

        let bytes = tokio::fs::read(&canonical)
            .await
            .map_err(|e| malformed(format!("cannot read file: {}", e)))?;

        let content_hash = content_hash(&bytes);
        let text = String::from_utf8(bytes)
            .map_err(|e| malformed(format!("not valid UTF-8: {}", e)))?;

        debug!(
            "Read document {} ({} bytes, hash {})",
            canonical.display(),
            text.len(),
            content_hash
        );

        Ok(Self {
            path: canonical,
            text,
            content_hash,
        })
    }

    /// Source path as stored in chunk metadata and record ids
    #[inline]
    pub fn source_path(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

/// Hex-encoded SHA-256 digest used for change detection
#[inline]
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
