// Inference collaborator
//
// The model-serving side (tokenization, weights, decoding) lives outside this
// crate. Strategies talk to it through three traits:
// - InferenceBackend: acquires a tokenizer + weights pair for a backing id
// - Tokenizer: encode, chat templating, vocabulary lookup, decode
// - ModelWeights: generation, and the compiled runtime's translate call
//
// `http::HttpInferenceBackend` is the production implementation.

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ParrotError, Result, TranslationErrorCode};
use crate::registry::{ModelDescriptor, StrategyKind};

pub use http::HttpInferenceBackend;

/// Compute device, in descending preference order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    /// Apple silicon accelerator
    Mps,
    Cuda,
    Cpu,
}

impl Device {
    const PRIORITY: [Device; 3] = [Device::Mps, Device::Cuda, Device::Cpu];

    /// Pick the most capable device the backend reports
    pub fn select(available: &[Device]) -> Device {
        Self::PRIORITY
            .into_iter()
            .find(|device| available.contains(device))
            .unwrap_or(Device::Cpu)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Mps => "mps",
            Self::Cuda => "cuda",
            Self::Cpu => "cpu",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precision {
    Float32,
    Float16,
    Int8,
    Int8Float16,
}

/// Device and numeric precision for a load. Reduced precision off-CPU; the
/// compiled runtime has no mps support and quantizes to int8.
pub fn placement_for(kind: StrategyKind, preferred: Device) -> (Device, Precision) {
    match (kind, preferred) {
        (StrategyKind::CompiledInference, Device::Cuda) => (Device::Cuda, Precision::Int8Float16),
        (StrategyKind::CompiledInference, _) => (Device::Cpu, Precision::Int8),
        (_, Device::Cpu) => (Device::Cpu, Precision::Float32),
        (_, device) => (device, Precision::Float16),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadRequest {
    pub backing_id: String,
    pub tokenizer_id: String,
    pub kind: StrategyKind,
    pub device: Device,
    pub precision: Precision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }
}

/// Parameters forwarded to `generate`. Unset fields use the backend default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_new_tokens: Option<usize>,
    pub num_beams: usize,
    pub do_sample: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repetition_penalty: Option<f32>,
    pub early_stopping: bool,
    /// First decoder token, used for target-language forcing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forced_bos_token_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub eos_token_ids: Vec<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pad_token_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop_strings: Vec<String>,
    /// Target-language attribute for models that take it at generation time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_lang: Option<String>,
}

/// Caller-supplied generation overrides, applied over family defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOverrides {
    #[serde(default)]
    pub max_length: Option<usize>,
    #[serde(default)]
    pub num_beams: Option<usize>,
    #[serde(default)]
    pub do_sample: Option<bool>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub repetition_penalty: Option<f32>,
}

impl GenerationOverrides {
    pub fn apply(&self, params: &mut GenerationParams) {
        if let Some(max_length) = self.max_length {
            if params.max_new_tokens.is_some() {
                params.max_new_tokens = Some(max_length);
            } else {
                params.max_length = Some(max_length);
            }
        }
        if let Some(num_beams) = self.num_beams {
            params.num_beams = num_beams;
        }
        if let Some(do_sample) = self.do_sample {
            params.do_sample = do_sample;
        }
        if self.temperature.is_some() {
            params.temperature = self.temperature;
        }
        if self.top_p.is_some() {
            params.top_p = self.top_p;
        }
        if self.repetition_penalty.is_some() {
            params.repetition_penalty = self.repetition_penalty;
        }
    }
}

#[async_trait]
pub trait Tokenizer: Send + Sync {
    /// Encode text; `src_lang` sets the tokenizer's source-language attribute
    async fn encode(&self, text: &str, src_lang: Option<&str>) -> Result<Vec<u32>>;

    /// Format a conversation with the model's chat template, generation prompt appended
    async fn apply_chat_template(&self, messages: &[ChatMessage]) -> Result<Vec<u32>>;

    /// Vocabulary id of a special or language token
    async fn token_to_id(&self, token: &str) -> Result<Option<u32>>;

    async fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String>;

    fn eos_token_id(&self) -> Option<u32>;
}

#[async_trait]
pub trait ModelWeights: Send + Sync {
    /// Generate a token sequence. Causal models echo the prompt first.
    async fn generate(&self, input_ids: &[u32], params: &GenerationParams) -> Result<Vec<u32>>;

    /// Compiled runtimes translate text directly
    async fn translate_text(
        &self,
        _text: &str,
        _source_code: &str,
        _target_code: &str,
        _params: &GenerationParams,
    ) -> Result<String> {
        Err(ParrotError::translation(TranslationErrorCode::UnsupportedOperation))
    }
}

/// Tokenizer and weights returned by a backend
pub struct ModelHandles {
    pub tokenizer: Box<dyn Tokenizer>,
    pub weights: Box<dyn ModelWeights>,
    pub device: Device,
}

/// Main trait for acquiring models
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Devices the serving side can place weights on
    async fn available_devices(&self) -> Result<Vec<Device>>;

    /// Acquire tokenizer and weights. Failures are fatal for the caller.
    async fn load(&self, request: &LoadRequest) -> Result<ModelHandles>;
}

/// A loaded model, owned by exactly one strategy
pub struct LoadedModel {
    pub descriptor: ModelDescriptor,
    pub tokenizer: Box<dyn Tokenizer>,
    pub weights: Box<dyn ModelWeights>,
    pub device: Device,
}

impl fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedModel")
            .field("descriptor", &self.descriptor)
            .field("device", &self.device)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_priority() {
        assert_eq!(Device::select(&[Device::Cpu, Device::Cuda]), Device::Cuda);
        assert_eq!(Device::select(&[Device::Cuda, Device::Mps]), Device::Mps);
        assert_eq!(Device::select(&[]), Device::Cpu);
    }

    #[test]
    fn test_placement_reduces_precision_off_cpu() {
        assert_eq!(
            placement_for(StrategyKind::Seq2seq, Device::Cuda),
            (Device::Cuda, Precision::Float16)
        );
        assert_eq!(
            placement_for(StrategyKind::CausalPrompted, Device::Cpu),
            (Device::Cpu, Precision::Float32)
        );
        assert_eq!(
            placement_for(StrategyKind::CompiledInference, Device::Mps),
            (Device::Cpu, Precision::Int8)
        );
        assert_eq!(
            placement_for(StrategyKind::CompiledInference, Device::Cuda),
            (Device::Cuda, Precision::Int8Float16)
        );
    }

    #[test]
    fn test_overrides_target_the_active_length_field() {
        let mut causal = GenerationParams {
            max_new_tokens: Some(256),
            ..Default::default()
        };
        let overrides = GenerationOverrides {
            max_length: Some(64),
            num_beams: Some(2),
            ..Default::default()
        };
        overrides.apply(&mut causal);
        assert_eq!(causal.max_new_tokens, Some(64));
        assert_eq!(causal.max_length, None);
        assert_eq!(causal.num_beams, 2);

        let mut seq2seq = GenerationParams {
            max_length: Some(128),
            ..Default::default()
        };
        overrides.apply(&mut seq2seq);
        assert_eq!(seq2seq.max_length, Some(64));
    }
}
