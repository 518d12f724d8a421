use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{
    ChatMessage, Device, GenerationParams, InferenceBackend, LoadRequest, ModelHandles,
    ModelWeights, Tokenizer,
};
use crate::config::InferenceConfig;
use crate::error::{ParrotError, Result, TranslationErrorCode};

#[derive(Debug, Deserialize)]
struct DevicesResponse {
    devices: Vec<Device>,
}

#[derive(Debug, Deserialize)]
struct LoadResponse {
    handle: String,
    device: Device,
    #[serde(default)]
    eos_token_id: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct IdsResponse {
    ids: Vec<u32>,
}

#[derive(Debug, Deserialize)]
struct TokenIdResponse {
    id: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct TextResponse {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    handle: &'a str,
    input_ids: &'a [u32],
    params: &'a GenerationParams,
}

/// Client for a model-serving process that owns tokenizers and weights.
/// Loaded models are addressed by the opaque handle returned from `/v1/models/load`.
pub struct HttpInferenceBackend {
    client: Client,
    endpoint: String,
}

impl HttpInferenceBackend {
    pub fn new(config: &InferenceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
        })
    }

    /// Check that the serving process answers
    pub async fn check_availability(&self) -> Result<()> {
        let url = format!("{}/health", self.endpoint);
        let response = self.client.get(&url).send().await.map_err(|e| {
            ParrotError::Config(format!("Failed to connect to model server: {}", e))
        })?;

        if response.status().is_success() {
            info!("Model server at {} is available", self.endpoint);
            Ok(())
        } else {
            Err(ParrotError::Config(format!(
                "Model server at {} returned {}",
                self.endpoint,
                response.status()
            )))
        }
    }
}

#[async_trait]
impl InferenceBackend for HttpInferenceBackend {
    async fn available_devices(&self) -> Result<Vec<Device>> {
        let url = format!("{}/v1/devices", self.endpoint);
        let response = self.client.get(&url).send().await?;
        let devices: DevicesResponse = response.error_for_status()?.json().await?;
        Ok(devices.devices)
    }

    async fn load(&self, request: &LoadRequest) -> Result<ModelHandles> {
        let url = format!("{}/v1/models/load", self.endpoint);
        debug!("Requesting model load: {} ({:?})", request.backing_id, request.precision);

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| ParrotError::load(&request.backing_id, e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ParrotError::load(
                &request.backing_id,
                format!("model server error {}: {}", status, error_text),
            ));
        }

        let loaded: LoadResponse = response
            .json()
            .await
            .map_err(|e| ParrotError::load(&request.backing_id, e.to_string()))?;

        let remote = Arc::new(RemoteModel {
            client: self.client.clone(),
            endpoint: self.endpoint.clone(),
            handle: loaded.handle,
            eos_token_id: loaded.eos_token_id,
        });

        Ok(ModelHandles {
            tokenizer: Box::new(RemoteTokenizer(remote.clone())),
            weights: Box::new(RemoteWeights(remote)),
            device: loaded.device,
        })
    }
}

struct RemoteModel {
    client: Client,
    endpoint: String,
    handle: String,
    eos_token_id: Option<u32>,
}

impl RemoteModel {
    async fn call<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let url = format!("{}{}", self.endpoint, path);
        let response = self.client.post(&url).json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!("Model server error {} on {}: {}", status, path, error_text);
            return Err(ParrotError::translation(TranslationErrorCode::TranslationFailed));
        }

        Ok(response.json().await?)
    }
}

struct RemoteTokenizer(Arc<RemoteModel>);

#[async_trait]
impl Tokenizer for RemoteTokenizer {
    async fn encode(&self, text: &str, src_lang: Option<&str>) -> Result<Vec<u32>> {
        let body = json!({ "handle": self.0.handle, "text": text, "src_lang": src_lang });
        let response: IdsResponse = self.0.call("/v1/tokenizer/encode", &body).await?;
        Ok(response.ids)
    }

    async fn apply_chat_template(&self, messages: &[ChatMessage]) -> Result<Vec<u32>> {
        let body = json!({
            "handle": self.0.handle,
            "messages": messages,
            "add_generation_prompt": true,
        });
        let response: IdsResponse = self.0.call("/v1/tokenizer/chat_template", &body).await?;
        Ok(response.ids)
    }

    async fn token_to_id(&self, token: &str) -> Result<Option<u32>> {
        let body = json!({ "handle": self.0.handle, "token": token });
        let response: TokenIdResponse = self.0.call("/v1/tokenizer/token_to_id", &body).await?;
        Ok(response.id)
    }

    async fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String> {
        let body = json!({
            "handle": self.0.handle,
            "ids": ids,
            "skip_special_tokens": skip_special_tokens,
        });
        let response: TextResponse = self.0.call("/v1/tokenizer/decode", &body).await?;
        Ok(response.text)
    }

    fn eos_token_id(&self) -> Option<u32> {
        self.0.eos_token_id
    }
}

struct RemoteWeights(Arc<RemoteModel>);

#[async_trait]
impl ModelWeights for RemoteWeights {
    async fn generate(&self, input_ids: &[u32], params: &GenerationParams) -> Result<Vec<u32>> {
        let body = GenerateRequest {
            handle: &self.0.handle,
            input_ids,
            params,
        };
        let response: IdsResponse = self.0.call("/v1/generate", &body).await?;
        Ok(response.ids)
    }

    async fn translate_text(
        &self,
        text: &str,
        source_code: &str,
        target_code: &str,
        params: &GenerationParams,
    ) -> Result<String> {
        let body = json!({
            "handle": self.0.handle,
            "text": text,
            "source": source_code,
            "target": target_code,
            "params": params,
        });
        let response: TextResponse = self.0.call("/v1/translate", &body).await?;
        Ok(response.text)
    }
}
