//! Stub collaborators shared by unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{ParrotError, Result};
use crate::inference::{
    ChatMessage, Device, GenerationParams, InferenceBackend, LoadRequest, ModelHandles,
    ModelWeights, Tokenizer,
};
use crate::registry::StrategyKind;
use crate::terminology::Embedder;

const EMBEDDING_DIM: usize = 512;

/// Bag-of-characters embedder: identical strings embed identically
#[derive(Default)]
pub struct CharEmbedder {
    unavailable: bool,
    pub calls: AtomicUsize,
}

impl CharEmbedder {
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Embedder for CharEmbedder {
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable {
            return Err(ParrotError::Terminology("embedding service unreachable".to_string()));
        }

        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0; EMBEDDING_DIM];
                for c in text.chars() {
                    vector[c as usize % EMBEDDING_DIM] += 1.0;
                }
                vector
            })
            .collect())
    }
}

pub const EOS: u32 = 0;
const CHAR_OFFSET: u32 = 1000;

/// Special tokens known to the stub vocabulary
pub fn special_tokens() -> HashMap<&'static str, u32> {
    [
        ("kor_Hang", 1),
        ("jpn_Jpan", 2),
        ("eng_Latn", 3),
        ("ko_KR", 4),
        ("ja_XX", 5),
        ("en_XX", 6),
        ("<|eot_id|>", 7),
    ]
    .into_iter()
    .collect()
}

pub fn encode_chars(text: &str) -> Vec<u32> {
    text.chars().map(|c| c as u32 + CHAR_OFFSET).collect()
}

pub fn decode_chars(ids: &[u32]) -> String {
    ids.iter()
        .filter(|id| **id >= CHAR_OFFSET)
        .filter_map(|id| char::from_u32(id - CHAR_OFFSET))
        .collect()
}

/// What the stub observed
#[derive(Default)]
pub struct Calls {
    pub loads: AtomicUsize,
    pub generate: AtomicUsize,
    pub compiled_translate: AtomicUsize,
    pub last_load: Mutex<Option<LoadRequest>>,
    pub last_params: Mutex<Option<GenerationParams>>,
    pub last_encoded: Mutex<Option<(String, Option<String>)>>,
    pub last_messages: Mutex<Vec<ChatMessage>>,
    pub generated_inputs: Mutex<Vec<String>>,
}

impl Calls {
    pub fn inference_calls(&self) -> usize {
        self.generate.load(Ordering::SeqCst) + self.compiled_translate.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Default)]
pub struct StubBehavior {
    /// Text generated after the (optional) echoed prompt; echoes input when unset
    pub reply: Option<String>,
    /// Generation fails when the decoded input contains this
    pub fail_when_input_contains: Option<String>,
    /// Generation fails unless this forced first token is requested
    pub expect_forced_bos: Option<u32>,
    pub fail_load: bool,
    /// Loading fails for backing ids containing this
    pub fail_load_for: Option<String>,
    pub devices: Vec<Device>,
}

#[derive(Clone, Default)]
pub struct StubBackend {
    pub behavior: StubBehavior,
    pub calls: Arc<Calls>,
}

impl StubBackend {
    pub fn new(behavior: StubBehavior) -> Self {
        Self {
            behavior,
            calls: Arc::new(Calls::default()),
        }
    }

    pub fn replying(reply: &str) -> Self {
        Self::new(StubBehavior {
            reply: Some(reply.to_string()),
            ..Default::default()
        })
    }
}

#[async_trait]
impl InferenceBackend for StubBackend {
    async fn available_devices(&self) -> Result<Vec<Device>> {
        Ok(self.behavior.devices.clone())
    }

    async fn load(&self, request: &LoadRequest) -> Result<ModelHandles> {
        self.calls.loads.fetch_add(1, Ordering::SeqCst);
        *self.calls.last_load.lock() = Some(request.clone());

        let fail_this = self
            .behavior
            .fail_load_for
            .as_ref()
            .is_some_and(|marker| request.backing_id.contains(marker.as_str()));
        if self.behavior.fail_load || fail_this {
            return Err(ParrotError::load(&request.backing_id, "401 Unauthorized"));
        }

        Ok(ModelHandles {
            tokenizer: Box::new(StubTokenizer {
                calls: self.calls.clone(),
            }),
            weights: Box::new(StubWeights {
                behavior: self.behavior.clone(),
                calls: self.calls.clone(),
                echo_prompt: request.kind == StrategyKind::CausalPrompted,
            }),
            device: request.device,
        })
    }
}

struct StubTokenizer {
    calls: Arc<Calls>,
}

#[async_trait]
impl Tokenizer for StubTokenizer {
    async fn encode(&self, text: &str, src_lang: Option<&str>) -> Result<Vec<u32>> {
        *self.calls.last_encoded.lock() = Some((text.to_string(), src_lang.map(str::to_string)));
        Ok(encode_chars(text))
    }

    async fn apply_chat_template(&self, messages: &[ChatMessage]) -> Result<Vec<u32>> {
        *self.calls.last_messages.lock() = messages.to_vec();
        let rendered: String = messages
            .iter()
            .map(|m| format!("<{}>{}\n", m.role, m.content))
            .collect();
        Ok(encode_chars(&format!("{}<assistant>", rendered)))
    }

    async fn token_to_id(&self, token: &str) -> Result<Option<u32>> {
        Ok(special_tokens().get(token).copied())
    }

    async fn decode(&self, ids: &[u32], _skip_special_tokens: bool) -> Result<String> {
        Ok(decode_chars(ids))
    }

    fn eos_token_id(&self) -> Option<u32> {
        Some(EOS)
    }
}

struct StubWeights {
    behavior: StubBehavior,
    calls: Arc<Calls>,
    echo_prompt: bool,
}

impl StubWeights {
    fn check_failure(&self, input: &str) -> Result<()> {
        if let Some(marker) = &self.behavior.fail_when_input_contains {
            if input.contains(marker.as_str()) {
                return Err(ParrotError::Io(std::io::Error::other(
                    "CUDA out of memory at /opt/serving/kernels.cu:88",
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ModelWeights for StubWeights {
    async fn generate(&self, input_ids: &[u32], params: &GenerationParams) -> Result<Vec<u32>> {
        self.calls.generate.fetch_add(1, Ordering::SeqCst);
        *self.calls.last_params.lock() = Some(params.clone());

        let input = decode_chars(input_ids);
        self.calls.generated_inputs.lock().push(input.clone());
        self.check_failure(&input)?;

        if let Some(expected) = self.behavior.expect_forced_bos {
            if params.forced_bos_token_id != Some(expected) {
                return Err(ParrotError::Io(std::io::Error::other("wrong forced token")));
            }
        }

        let mut output = Vec::new();
        if let Some(bos) = params.forced_bos_token_id {
            output.push(bos);
        }
        if self.echo_prompt {
            output.extend_from_slice(input_ids);
        }
        match &self.behavior.reply {
            Some(reply) => output.extend(encode_chars(reply)),
            None => output.extend(input_ids.iter().filter(|id| **id >= CHAR_OFFSET)),
        }
        output.push(EOS);
        Ok(output)
    }

    async fn translate_text(
        &self,
        text: &str,
        source_code: &str,
        target_code: &str,
        params: &GenerationParams,
    ) -> Result<String> {
        self.calls.compiled_translate.fetch_add(1, Ordering::SeqCst);
        *self.calls.last_params.lock() = Some(params.clone());
        self.calls.generated_inputs.lock().push(text.to_string());
        self.check_failure(text)?;

        Ok(self
            .behavior
            .reply
            .clone()
            .unwrap_or_else(|| format!("[{}>{}] {}", source_code, target_code, text)))
    }
}

/// Clock that only moves when told to
pub struct ManualClock {
    now: Mutex<chrono::DateTime<chrono::Utc>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            now: Mutex::new(chrono::Utc::now()),
        }
    }
}

impl ManualClock {
    pub fn advance(&self, by: std::time::Duration) {
        let mut now = self.now.lock();
        *now += chrono::Duration::from_std(by).unwrap();
    }
}

impl crate::cache::Clock for ManualClock {
    fn now(&self) -> chrono::DateTime<chrono::Utc> {
        *self.now.lock()
    }
}
