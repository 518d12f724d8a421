//! Model registry: maps short keys such as `nllb-200` to model descriptors
//! and classifies every descriptor into a model family.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info};

use crate::config::ModelEntryConfig;
use crate::error::{ParrotError, Result};

/// How a model family turns text into a translation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    /// Encoder-decoder with beam search and a forced target-language token
    Seq2seq,
    /// Instruction-tuned causal LM driven by a chat prompt
    CausalPrompted,
    /// Compiled runtime exposing its own multilingual translate call
    CompiledInference,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Seq2seq => "seq2seq",
            Self::CausalPrompted => "causal-prompted",
            Self::CompiledInference => "compiled-inference",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelFamily {
    Nllb,
    M2m,
    Mbart,
    HyperClovaX,
    Qwen,
    Varco,
    Opus,
    Seamless,
}

/// Ordered keyword table; the first keyword found in the key or backing
/// identifier decides the family.
const FAMILY_KEYWORDS: &[(&str, ModelFamily)] = &[
    ("nllb", ModelFamily::Nllb),
    ("m2m", ModelFamily::M2m),
    ("mbart", ModelFamily::Mbart),
    ("hyperclovax", ModelFamily::HyperClovaX),
    ("hyperclova", ModelFamily::HyperClovaX),
    ("qwen", ModelFamily::Qwen),
    ("varco", ModelFamily::Varco),
    ("opus", ModelFamily::Opus),
    ("seamless", ModelFamily::Seamless),
];

impl ModelFamily {
    pub fn kind(&self) -> StrategyKind {
        match self {
            Self::Nllb | Self::Mbart | Self::Opus | Self::Seamless => StrategyKind::Seq2seq,
            Self::HyperClovaX | Self::Qwen | Self::Varco => StrategyKind::CausalPrompted,
            Self::M2m => StrategyKind::CompiledInference,
        }
    }

    /// Classify a key or backing identifier by case-insensitive substring match
    pub fn classify(name: &str) -> Option<Self> {
        let lowered = name.to_lowercase();
        FAMILY_KEYWORDS
            .iter()
            .find(|(keyword, _)| lowered.contains(keyword))
            .map(|(_, family)| *family)
    }

    /// Maximum generation length for this family given the configured base
    pub fn max_length(&self, base: usize) -> usize {
        match self {
            Self::HyperClovaX | Self::Qwen => base.saturating_mul(2).min(1024),
            Self::Varco => base.saturating_mul(5).min(8192),
            _ => base,
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Nllb => "nllb",
            Self::M2m => "m2m",
            Self::Mbart => "mbart",
            Self::HyperClovaX => "hyperclovax",
            Self::Qwen => "qwen",
            Self::Varco => "varco",
            Self::Opus => "opus",
            Self::Seamless => "seamless",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub key: String,
    pub display_name: String,
    pub backing_id: String,
    pub tokenizer_id: String,
    pub strategy_kind: StrategyKind,
}

impl ModelDescriptor {
    fn builtin(
        key: &str,
        display_name: &str,
        backing_id: &str,
        tokenizer_id: &str,
        strategy_kind: StrategyKind,
    ) -> Self {
        Self {
            key: key.to_string(),
            display_name: display_name.to_string(),
            backing_id: backing_id.to_string(),
            tokenizer_id: tokenizer_id.to_string(),
            strategy_kind,
        }
    }
}

/// Built-in registry entries
pub fn builtin_models() -> Vec<ModelDescriptor> {
    use StrategyKind::*;
    vec![
        ModelDescriptor::builtin(
            "nllb-200",
            "NLLB-200 Distilled 600M",
            "facebook/nllb-200-distilled-600M",
            "facebook/nllb-200-distilled-600M",
            Seq2seq,
        ),
        ModelDescriptor::builtin(
            "m2m-100-1.2b",
            "M2M-100 1.2B (CTranslate2)",
            "michaelfeil/ct2fast-m2m100_1.2B",
            "facebook/m2m100_1.2B",
            CompiledInference,
        ),
        ModelDescriptor::builtin(
            "mbart-50",
            "mBART-50 many-to-many",
            "facebook/mbart-large-50-many-to-many-mmt",
            "facebook/mbart-large-50-many-to-many-mmt",
            Seq2seq,
        ),
        ModelDescriptor::builtin(
            "opus-ko-ja",
            "Opus-MT Korean → Japanese",
            "Helsinki-NLP/opus-mt-ko-jap",
            "Helsinki-NLP/opus-mt-ko-jap",
            Seq2seq,
        ),
        ModelDescriptor::builtin(
            "opus-ja-ko",
            "Opus-MT Japanese → Korean",
            "Helsinki-NLP/opus-mt-jap-ko",
            "Helsinki-NLP/opus-mt-jap-ko",
            Seq2seq,
        ),
        ModelDescriptor::builtin(
            "hyperclova-0.5b",
            "HyperCLOVA X SEED 0.5B",
            "naver-hyperclovax/HyperCLOVAX-SEED-Text-Instruct-0.5B",
            "naver-hyperclovax/HyperCLOVAX-SEED-Text-Instruct-0.5B",
            CausalPrompted,
        ),
        ModelDescriptor::builtin(
            "hyperclova-1.5b",
            "HyperCLOVA X SEED 1.5B",
            "naver-hyperclovax/HyperCLOVAX-SEED-Text-Instruct-1.5B",
            "naver-hyperclovax/HyperCLOVAX-SEED-Text-Instruct-1.5B",
            CausalPrompted,
        ),
        ModelDescriptor::builtin(
            "qwen-2.5-1.5b",
            "Qwen2.5 1.5B Instruct",
            "Qwen/Qwen2.5-1.5B-Instruct",
            "Qwen/Qwen2.5-1.5B-Instruct",
            CausalPrompted,
        ),
        ModelDescriptor::builtin(
            "varco-8b",
            "Llama VARCO 8B Instruct",
            "NCSOFT/Llama-VARCO-8B-Instruct",
            "NCSOFT/Llama-VARCO-8B-Instruct",
            CausalPrompted,
        ),
        ModelDescriptor::builtin(
            "seamless-m4t",
            "SeamlessM4T v2 Large",
            "facebook/seamless-m4t-v2-large",
            "facebook/seamless-m4t-v2-large",
            Seq2seq,
        ),
    ]
}

/// Single source of truth for model keys and their families
#[derive(Debug, Clone)]
pub struct Registry {
    models: Vec<ModelDescriptor>,
    by_key: HashMap<String, usize>,
}

impl Registry {
    /// Build a registry, validating every entry up front
    pub fn new(models: Vec<ModelDescriptor>) -> Result<Self> {
        let mut by_key = HashMap::new();

        for (index, descriptor) in models.iter().enumerate() {
            Self::validate(descriptor)?;
            if by_key.insert(descriptor.key.clone(), index).is_some() {
                return Err(ParrotError::Config(format!(
                    "Duplicate registry key: {}",
                    descriptor.key
                )));
            }
        }

        debug!("Registry initialized with {} models", models.len());
        Ok(Self { models, by_key })
    }

    /// Built-in entries plus any configured extras
    pub fn with_extra(extra: &[ModelEntryConfig]) -> Result<Self> {
        let mut models = builtin_models();

        for entry in extra {
            let family = Self::classify_names(&entry.key, &entry.backing_id)?;
            models.push(ModelDescriptor {
                key: entry.key.clone(),
                display_name: entry.display_name.clone(),
                backing_id: entry.backing_id.clone(),
                tokenizer_id: entry
                    .tokenizer_id
                    .clone()
                    .unwrap_or_else(|| entry.backing_id.clone()),
                strategy_kind: entry.strategy_kind.unwrap_or_else(|| family.kind()),
            });
        }

        Self::new(models)
    }

    /// Look up a registered key, or synthesize a descriptor for a raw
    /// backing identifier. Unclassifiable names fail here rather than at
    /// inference time.
    pub fn resolve(&self, key_or_id: &str) -> Result<ModelDescriptor> {
        let key_or_id = key_or_id.trim();
        if key_or_id.is_empty() {
            return Err(ParrotError::Config("Model key must not be empty".to_string()));
        }

        if let Some(index) = self.by_key.get(key_or_id) {
            return Ok(self.models[*index].clone());
        }

        if let Some(descriptor) = self.models.iter().find(|m| m.backing_id == key_or_id) {
            return Ok(descriptor.clone());
        }

        let family = ModelFamily::classify(key_or_id).ok_or_else(|| {
            ParrotError::Config(format!(
                "Cannot resolve model '{}': no known model family matches",
                key_or_id
            ))
        })?;

        info!("Resolved raw model identifier '{}' as {} family", key_or_id, family);
        Ok(ModelDescriptor {
            key: key_or_id.to_string(),
            display_name: key_or_id.to_string(),
            backing_id: key_or_id.to_string(),
            tokenizer_id: key_or_id.to_string(),
            strategy_kind: family.kind(),
        })
    }

    /// Family of a descriptor, from its key first and then its backing identifier
    pub fn family_for(&self, descriptor: &ModelDescriptor) -> Result<ModelFamily> {
        Self::classify_names(&descriptor.key, &descriptor.backing_id)
    }

    pub fn strategy_for(&self, descriptor: &ModelDescriptor) -> Result<StrategyKind> {
        self.family_for(descriptor).map(|family| family.kind())
    }

    pub fn models(&self) -> &[ModelDescriptor] {
        &self.models
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.models.iter().map(|m| m.key.as_str())
    }

    fn classify_names(key: &str, backing_id: &str) -> Result<ModelFamily> {
        ModelFamily::classify(key)
            .or_else(|| ModelFamily::classify(backing_id))
            .ok_or_else(|| {
                ParrotError::Config(format!(
                    "Model '{}' ({}) does not match any known model family",
                    key, backing_id
                ))
            })
    }

    fn validate(descriptor: &ModelDescriptor) -> Result<()> {
        if descriptor.key.trim().is_empty() || descriptor.backing_id.trim().is_empty() {
            return Err(ParrotError::Config(format!(
                "Malformed registry entry: key and backing id are required ({:?})",
                descriptor
            )));
        }

        let family = Self::classify_names(&descriptor.key, &descriptor.backing_id)?;
        if family.kind() != descriptor.strategy_kind {
            return Err(ParrotError::Config(format!(
                "Malformed registry entry '{}': declared {} but {} models are {}",
                descriptor.key,
                descriptor.strategy_kind,
                family,
                family.kind()
            )));
        }

        Ok(())
    }
}

impl Default for Registry {
    fn default() -> Self {
        let models = builtin_models();
        let by_key = models
            .iter()
            .enumerate()
            .map(|(index, m)| (m.key.clone(), index))
            .collect();
        Self { models, by_key }
    }
}
