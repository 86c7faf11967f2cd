// Database module
// LanceDB holds the vectors; SQLite holds the change-detection side table and search history

pub mod lancedb;
pub mod sqlite;

pub use self::lancedb::{ChunkMetadata, ChunkRecord, Collection, StoredHit, VectorStore, record_id};
pub use sqlite::Database;
