// Configuration management: TOML settings under the base directory plus the interactive wizard

pub mod interactive;
pub mod settings;


pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    Config, ConfigError, DistanceMetric, EmbeddingConfig, EmbeddingProvider, IngestConfig,
    OllamaConfig, SearchConfig, StorageConfig, validate_collection_name,
};

/// Get the configuration directory path
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    Config::config_dir()
}
