//! Runtime configuration for a Picta corpus.
//!
//! Configuration is loaded from an optional YAML file and then overlaid
//! with environment variables, the same two-step pattern used throughout
//! the corpus: deserialize a struct from YAML, then apply env overrides.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// In-memory application configuration for one corpus.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct PictaConfig {
    /// API key for the LLM used by the query parser. Empty disables the
    /// LLM parser and falls back to the deterministic rule-based one.
    #[serde(default)]
    pub llm_api_key: String,

    /// OpenAI-compatible chat completion endpoint.
    #[serde(default = "default_llm_api_base")]
    pub llm_api_base: String,

    /// Model identifier requested from the LLM endpoint.
    #[serde(default = "default_llm_model")]
    pub llm_model: String,

    /// External HTTP gazetteer endpoint used by the geocoder.
    #[serde(default = "default_geocoder_url")]
    pub geocoder_url: String,

    /// Selects the embedding model; determines the fixed dimension `D`.
    #[serde(default = "default_embed_model_id")]
    pub embed_model_id: String,

    /// Path to the corpus's SQLite file.
    pub corpus_path: String,

    /// Max parallel `encode_image` calls during indexing.
    #[serde(default = "default_indexer_workers")]
    pub indexer_workers: usize,

    /// Force a full ANN rebuild at process start.
    #[serde(default)]
    pub ann_rebuild_on_start: bool,

    /// Deadline applied to every externally blocking call (LLM, geocoder,
    /// embedder). Not serialized; always taken from the default or an
    /// explicit override at construction time.
    #[serde(skip, default = "default_deadline")]
    pub deadline: Duration,
}

fn default_llm_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_geocoder_url() -> String {
    "https://nominatim.openstreetmap.org/search".to_string()
}

fn default_embed_model_id() -> String {
    "sentence-transformers/all-MiniLM-L6-v2".to_string()
}

fn default_indexer_workers() -> usize {
    4
}

fn default_deadline() -> Duration {
    Duration::from_secs(3)
}

impl Default for PictaConfig {
    fn default() -> Self {
        Self {
            llm_api_key: String::new(),
            llm_api_base: default_llm_api_base(),
            llm_model: default_llm_model(),
            geocoder_url: default_geocoder_url(),
            embed_model_id: default_embed_model_id(),
            corpus_path: "corpus.db".to_string(),
            indexer_workers: default_indexer_workers(),
            ann_rebuild_on_start: false,
            deadline: default_deadline(),
        }
    }
}

impl PictaConfig {
    /// Whether the LLM-backed query parser should be used. Absent
    /// credentials mean fallback-parser-only.
    pub fn llm_enabled(&self) -> bool {
        !self.llm_api_key.trim().is_empty()
    }
}

/// Load configuration from an optional YAML file, then apply environment
/// variable overrides.
///
/// A missing or unreadable file is not an error: a default configuration
/// is produced and env overrides are still applied on top of it.
pub fn load_config(file: Option<&str>) -> PictaConfig {
    let mut config = match file.map(std::fs::read_to_string) {
        Some(Ok(content)) => match serde_yaml::from_str(&content) {
            Ok(c) => c,
            Err(e) => {
                warn!("malformed config file, using defaults: {e}");
                PictaConfig::default()
            }
        },
        Some(Err(e)) => {
            warn!("could not read config file, using defaults: {e}");
            PictaConfig::default()
        }
        None => PictaConfig::default(),
    };

    apply_env_overrides(&mut config);
    config
}

fn apply_env_overrides(config: &mut PictaConfig) {
    if let Ok(v) = std::env::var("OPENAI_API_KEY") {
        config.llm_api_key = v;
    }
    if let Ok(v) = std::env::var("LLM_API_BASE") {
        config.llm_api_base = v;
    }
    if let Ok(v) = std::env::var("LLM_MODEL") {
        config.llm_model = v;
    }
    if let Ok(v) = std::env::var("GEOCODER_URL") {
        config.geocoder_url = v;
    }
    if let Ok(v) = std::env::var("EMBED_MODEL_ID") {
        config.embed_model_id = v;
    }
    if let Ok(v) = std::env::var("CORPUS_PATH") {
        config.corpus_path = v;
    }
    if let Ok(v) = std::env::var("INDEXER_WORKERS") {
        if let Ok(n) = v.parse() {
            config.indexer_workers = n;
        }
    }
    if let Ok(v) = std::env::var("ANN_REBUILD_ON_START") {
        config.ann_rebuild_on_start = matches!(v.as_str(), "1" | "true" | "TRUE" | "yes");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_valid_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "corpus_path: \"test.db\"\nindexer_workers: 8\n").unwrap();

        let config = load_config(Some(temp_file.path().to_str().unwrap()));
        assert_eq!(config.corpus_path, "test.db");
        assert_eq!(config.indexer_workers, 8);
        assert_eq!(config.llm_api_base, default_llm_api_base());
    }

    #[test]
    fn test_load_config_missing_file_uses_defaults() {
        let config = load_config(Some("non/existent/path.yaml"));
        assert_eq!(config.corpus_path, "corpus.db");
    }

    #[test]
    fn test_load_config_no_file_uses_defaults() {
        let config = load_config(None);
        assert_eq!(config.corpus_path, PictaConfig::default().corpus_path);
    }

    #[test]
    fn test_llm_enabled() {
        let mut config = PictaConfig::default();
        assert!(!config.llm_enabled());
        config.llm_api_key = "sk-test".to_string();
        assert!(config.llm_enabled());
    }
}
