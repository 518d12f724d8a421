use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ParrotError, Result};
use crate::registry::StrategyKind;

// Default values for optional sections
fn default_top_k() -> usize {
    5
}

fn default_threshold() -> f32 {
    0.7
}

fn default_max_hint_terms() -> usize {
    3
}

fn default_namespace() -> String {
    "translation".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub model: ModelConfig,
    pub inference: InferenceConfig,
    pub terminology: TerminologyConfig,
    pub cache: CacheConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Registry key (or raw backing identifier) used when no model is requested
    pub default_model: String,
    /// Base maximum generation length; causal families scale this
    pub max_length: usize,
    /// Beam count for beam-search decoding
    pub num_beams: usize,
    /// Token used when acquiring gated weights
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    /// Additional registry entries
    #[serde(default)]
    pub extra_models: Vec<ModelEntryConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntryConfig {
    pub key: String,
    pub display_name: String,
    pub backing_id: String,
    /// Defaults to the backing identifier
    #[serde(default)]
    pub tokenizer_id: Option<String>,
    /// Must agree with the family inferred from the key or backing identifier
    #[serde(default)]
    pub strategy_kind: Option<StrategyKind>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Model-serving endpoint URL
    pub endpoint: String,
    /// Request timeout in seconds; generation dominates latency
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminologyConfig {
    /// Whether terminology hints and replacement are used at all
    pub enabled: bool,
    /// Embedding service endpoint (Ollama API)
    pub embedding_endpoint: String,
    /// Embedding model served by the endpoint
    pub embedding_model: String,
    /// Extra glossary entries in TOML (`[[terms]]` tables)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub glossary_path: Option<PathBuf>,
    /// Nearest neighbours fetched per query token
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Minimum cosine similarity for a match
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    /// Terms rendered into a prompt hint
    #[serde(default = "default_max_hint_terms")]
    pub max_hint_terms: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Whether results are cached at all
    pub enabled: bool,
    /// Backing store
    pub backend: CacheBackend,
    /// Directory used by the file store
    pub directory: PathBuf,
    /// Address of an external store; kept for operators and `/health` output
    pub host: String,
    pub port: u16,
    /// Record lifetime in seconds
    pub ttl_secs: u64,
    /// Key prefix; `clear_all` only touches keys under it
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// Memory: process-local, lost on restart
    Memory,
    /// File: one JSON document per key under `directory`
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: ModelConfig {
                default_model: "nllb-200".to_string(),
                max_length: 128,
                num_beams: 5,
                auth_token: None,
                extra_models: Vec::new(),
            },
            inference: InferenceConfig {
                endpoint: "http://localhost:8080".to_string(),
                timeout_secs: 300,
            },
            terminology: TerminologyConfig {
                enabled: true,
                embedding_endpoint: "http://localhost:11434".to_string(),
                embedding_model: "paraphrase-multilingual".to_string(),
                glossary_path: None,
                top_k: default_top_k(),
                threshold: default_threshold(),
                max_hint_terms: default_max_hint_terms(),
            },
            cache: CacheConfig {
                enabled: true,
                backend: CacheBackend::File,
                directory: PathBuf::from(".parrot/cache/translations"),
                host: "localhost".to_string(),
                port: 6379,
                ttl_secs: 86400,
                namespace: default_namespace(),
            },
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
            },
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ParrotError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| ParrotError::Config(format!("Failed to parse config file: {}", e)))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ParrotError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| ParrotError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Apply overrides from a variable lookup. The binary passes
    /// `std::env::var`; the library itself never reads the environment.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = lookup("PARROT_DEFAULT_MODEL") {
            self.model.default_model = model;
        }
        if let Some(value) = lookup("PARROT_MAX_LENGTH") {
            self.model.max_length = parse_override("PARROT_MAX_LENGTH", &value)?;
        }
        if let Some(value) = lookup("PARROT_NUM_BEAMS") {
            self.model.num_beams = parse_override("PARROT_NUM_BEAMS", &value)?;
        }
        if let Some(value) = lookup("PARROT_CACHE_TTL") {
            self.cache.ttl_secs = parse_override("PARROT_CACHE_TTL", &value)?;
        }
        if let Some(token) = lookup("HUGGINGFACE_HUB_TOKEN") {
            if !token.starts_with("hf_") {
                tracing::warn!("Hugging Face token format seems incorrect");
            }
            self.model.auth_token = Some(token);
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        if self.model.default_model.trim().is_empty() {
            return Err(ParrotError::Config("model.default_model must not be empty".to_string()));
        }
        if self.model.max_length == 0 || self.model.num_beams == 0 {
            return Err(ParrotError::Config(
                "model.max_length and model.num_beams must be positive".to_string(),
            ));
        }
        if self.cache.ttl_secs == 0 {
            return Err(ParrotError::Config("cache.ttl_secs must be positive".to_string()));
        }
        Ok(())
    }
}

fn parse_override<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ParrotError::Config(format!("Invalid value for {}: {}", name, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_config_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.model.default_model = "qwen-2.5-1.5b".to_string();
        config.cache.backend = CacheBackend::Memory;
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.model.default_model, "qwen-2.5-1.5b");
        assert_eq!(loaded.cache.backend, CacheBackend::Memory);
        assert_eq!(loaded.cache.ttl_secs, 86400);
    }

    #[test]
    fn test_optional_terminology_fields_default() {
        let mut value = toml::Value::try_from(Config::default()).unwrap();
        let terminology = value.get_mut("terminology").unwrap().as_table_mut().unwrap();
        terminology.remove("top_k");
        terminology.remove("threshold");

        let config: Config = toml::from_str(&toml::to_string(&value).unwrap()).unwrap();
        assert_eq!(config.terminology.top_k, 5);
        assert!((config.terminology.threshold - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn test_overrides_apply_and_validate() {
        let vars: HashMap<&str, &str> = [
            ("PARROT_DEFAULT_MODEL", "mbart-50"),
            ("PARROT_NUM_BEAMS", "3"),
            ("HUGGINGFACE_HUB_TOKEN", "hf_secret"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_overrides(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.model.default_model, "mbart-50");
        assert_eq!(config.model.num_beams, 3);
        assert_eq!(config.model.auth_token.as_deref(), Some("hf_secret"));
    }

    #[test]
    fn test_huge_max_length_override_is_capped_per_family() {
        let mut config = Config::default();
        config
            .apply_overrides(|name| {
                (name == "PARROT_MAX_LENGTH").then(|| usize::MAX.to_string())
            })
            .unwrap();

        assert_eq!(config.model.max_length, usize::MAX);
        assert_eq!(
            crate::registry::ModelFamily::Qwen.max_length(config.model.max_length),
            1024
        );
    }

    #[test]
    fn test_malformed_override_is_config_error() {
        let mut config = Config::default();
        let err = config
            .apply_overrides(|name| (name == "PARROT_MAX_LENGTH").then(|| "long".to_string()))
            .unwrap_err();
        assert!(matches!(err, ParrotError::Config(_)));
    }
}
