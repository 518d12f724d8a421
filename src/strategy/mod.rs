// Model strategies
//
// One `ModelStrategy` per resolved model. The family decides language codes
// and decoding defaults; the strategy kind decides how a request becomes
// model input:
// - seq2seq: optional term replacement, forced target-language token, beam search
// - prompted: terminology hint inside a chat prompt, output cleanup
// - compiled: the compiled runtime's own translate call

pub mod compiled;
pub mod prompted;
pub mod seq2seq;

use std::sync::Arc;
use tracing::{debug, info};

use crate::config::ModelConfig;
use crate::error::{ParrotError, Result, TranslationErrorCode};
use crate::inference::{
    placement_for, Device, GenerationOverrides, InferenceBackend, LoadRequest, LoadedModel,
};
use crate::language::Language;
use crate::registry::{ModelDescriptor, ModelFamily, StrategyKind};
use crate::terminology::Retriever;

/// Family-specific code for a language
pub fn language_code(family: ModelFamily, lang: Language) -> &'static str {
    use Language::*;
    use ModelFamily::*;

    match (family, lang) {
        (Nllb, Korean) => "kor_Hang",
        (Nllb, Japanese) => "jpn_Jpan",
        (Nllb, English) => "eng_Latn",
        (Mbart, Korean) => "ko_KR",
        (Mbart, Japanese) => "ja_XX",
        (Mbart, English) => "en_XX",
        (Seamless, Korean) => "kor",
        (Seamless, Japanese) => "jpn",
        (Seamless, English) => "eng",
        (M2m | Opus, lang) => lang.short_code(),
        (HyperClovaX | Varco, Korean) => "한국어",
        (HyperClovaX | Varco, Japanese) => "일본어",
        (HyperClovaX | Varco, English) => "영어",
        (Qwen, Korean) => "한국어",
        (Qwen, Japanese) => "日本語",
        (Qwen, English) => "English",
    }
}

/// A validated request as seen by the per-kind translators
pub(crate) struct Request<'a> {
    pub text: &'a str,
    pub source: Language,
    pub target: Language,
    pub source_code: &'static str,
    pub target_code: &'static str,
}

pub struct ModelStrategy {
    descriptor: ModelDescriptor,
    family: ModelFamily,
    backend: Arc<dyn InferenceBackend>,
    retriever: Option<Arc<Retriever>>,
    max_length: usize,
    num_beams: usize,
    loaded: Option<LoadedModel>,
}

impl ModelStrategy {
    pub fn new(
        descriptor: ModelDescriptor,
        family: ModelFamily,
        backend: Arc<dyn InferenceBackend>,
        retriever: Option<Arc<Retriever>>,
        config: &ModelConfig,
    ) -> Self {
        Self {
            descriptor,
            family,
            backend,
            retriever,
            max_length: family.max_length(config.max_length),
            num_beams: config.num_beams,
            loaded: None,
        }
    }

    pub fn descriptor(&self) -> &ModelDescriptor {
        &self.descriptor
    }

    pub fn family(&self) -> ModelFamily {
        self.family
    }

    pub fn kind(&self) -> StrategyKind {
        self.descriptor.strategy_kind
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn num_beams(&self) -> usize {
        self.num_beams
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    pub fn device(&self) -> Option<Device> {
        self.loaded.as_ref().map(|m| m.device)
    }

    /// Acquire tokenizer and weights. Not retried; any failure is a `Load` error.
    pub async fn load(&mut self, auth_token: Option<&str>) -> Result<()> {
        let model = self.descriptor.backing_id.clone();
        let as_load_error = |e: ParrotError| match e {
            ParrotError::Load { .. } => e,
            other => ParrotError::load(&model, other.to_string()),
        };

        let available = self.backend.available_devices().await.map_err(as_load_error)?;
        let (device, precision) = placement_for(self.kind(), Device::select(&available));

        info!("Loading model ({}): {}", self.kind(), self.descriptor.backing_id);
        info!("Using device: {} ({:?})", device, precision);

        let request = LoadRequest {
            backing_id: self.descriptor.backing_id.clone(),
            tokenizer_id: self.descriptor.tokenizer_id.clone(),
            kind: self.kind(),
            device,
            precision,
            auth_token: auth_token.map(str::to_string),
        };

        let handles = self.backend.load(&request).await.map_err(as_load_error)?;

        self.loaded = Some(LoadedModel {
            descriptor: self.descriptor.clone(),
            tokenizer: handles.tokenizer,
            weights: handles.weights,
            device: handles.device,
        });

        info!("Model loaded successfully: {}", self.descriptor.display_name);
        Ok(())
    }

    /// Family code for a language name; unknown input comes back unchanged
    pub fn lang_code_to_id(&self, lang: &str) -> String {
        match lang.parse::<Language>() {
            Ok(language) => language_code(self.family, language).to_string(),
            Err(_) => lang.to_string(),
        }
    }

    /// Translate `text`. Validation happens before the model is touched;
    /// every later failure surfaces as `ParrotError::Translation`.
    pub async fn translate(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
        overrides: &GenerationOverrides,
    ) -> Result<String> {
        let loaded = self
            .loaded
            .as_ref()
            .ok_or_else(|| ParrotError::translation(TranslationErrorCode::ModelNotLoaded))?;

        let source = Language::parse(source_lang, "source")?;
        let target = Language::parse(target_lang, "target")?;
        if text.trim().is_empty() {
            return Err(ParrotError::InvalidRequest("Text must not be empty".to_string()));
        }

        let request = Request {
            text,
            source,
            target,
            source_code: language_code(self.family, source),
            target_code: language_code(self.family, target),
        };
        debug!(
            "Translating from '{}' to '{}' with {}",
            request.source_code, request.target_code, self.descriptor.key
        );

        let translated = match self.kind() {
            StrategyKind::Seq2seq => seq2seq::translate(self, loaded, &request, overrides).await,
            StrategyKind::CausalPrompted => {
                prompted::translate(self, loaded, &request, overrides).await
            }
            StrategyKind::CompiledInference => {
                compiled::translate(self, loaded, &request, overrides).await
            }
        }
        .map_err(ParrotError::into_translation_error)?;

        if translated.trim().is_empty() {
            return Err(ParrotError::translation(TranslationErrorCode::EmptyOutput));
        }

        debug!("Translation completed: {}", translated);
        Ok(translated)
    }

    /// Prompt hint for the request's direction; the text itself when no terms match
    async fn terminology_hint(&self, request: &Request<'_>) -> Result<String> {
        match &self.retriever {
            Some(retriever) => {
                let domain = Retriever::domain_for(
                    request.source.as_str(),
                    request.target.as_str(),
                    false,
                );
                retriever
                    .render_hint(request.text, &domain, retriever.max_hint_terms())
                    .await
            }
            None => Ok(request.text.to_string()),
        }
    }

    /// Canonicalize source text with the same-language replacement domain
    async fn normalize_terms(&self, request: &Request<'_>) -> Result<String> {
        match &self.retriever {
            Some(retriever) => {
                let domain =
                    Retriever::domain_for(request.source.as_str(), request.target.as_str(), true);
                retriever.replace_terms(request.text, &domain).await
            }
            None => Ok(request.text.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::registry::Registry;
    use crate::terminology::{builtin_glossary, FlatIpIndex};
    use crate::testing::{special_tokens, CharEmbedder, StubBackend, StubBehavior};
    use std::sync::atomic::Ordering;

    async fn strategy_for(key: &str, backend: &StubBackend, with_terms: bool) -> ModelStrategy {
        let registry = Registry::default();
        let descriptor = registry.resolve(key).unwrap();
        let family = registry.family_for(&descriptor).unwrap();

        let retriever = if with_terms {
            let mut retriever =
                Retriever::new(Arc::new(CharEmbedder::default()), Box::new(FlatIpIndex::new()));
            retriever.load(builtin_glossary()).await.unwrap();
            Some(Arc::new(retriever))
        } else {
            None
        };

        ModelStrategy::new(
            descriptor,
            family,
            Arc::new(backend.clone()),
            retriever,
            &Config::default().model,
        )
    }

    #[tokio::test]
    async fn test_translate_requires_loaded_model() {
        let backend = StubBackend::default();
        let strategy = strategy_for("nllb-200", &backend, false).await;

        let err = strategy
            .translate("안녕", "korean", "japanese", &GenerationOverrides::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ParrotError::Translation { code: TranslationErrorCode::ModelNotLoaded, .. }
        ));
    }

    #[tokio::test]
    async fn test_unsupported_language_never_reaches_model() {
        let backend = StubBackend::default();
        let mut strategy = strategy_for("qwen-2.5-1.5b", &backend, false).await;
        strategy.load(None).await.unwrap();

        for (source, target) in [("french", "korean"), ("korean", "french")] {
            let err = strategy
                .translate("bonjour", source, target, &GenerationOverrides::default())
                .await
                .unwrap_err();
            assert!(matches!(err, ParrotError::Language(_)));
        }
        assert_eq!(backend.calls.inference_calls(), 0);
    }

    #[tokio::test]
    async fn test_every_pair_translates_with_every_kind() {
        for key in ["nllb-200", "qwen-2.5-1.5b", "m2m-100-1.2b"] {
            let backend = StubBackend::default();
            let mut strategy = strategy_for(key, &backend, true).await;
            strategy.load(None).await.unwrap();

            for source in Language::ALL {
                for target in Language::ALL {
                    if source == target {
                        continue;
                    }
                    let translated = strategy
                        .translate("최애 콘서트", source.as_str(), target.as_str(), &Default::default())
                        .await
                        .unwrap();
                    assert!(!translated.is_empty(), "{} {}→{}", key, source, target);
                }
            }
        }
    }

    #[tokio::test]
    async fn test_load_uses_device_priority_and_reduced_precision() {
        let backend = StubBackend::new(StubBehavior {
            devices: vec![Device::Cpu, Device::Cuda],
            ..Default::default()
        });
        let mut strategy = strategy_for("mbart-50", &backend, false).await;
        strategy.load(Some("hf_token")).await.unwrap();

        let request = backend.calls.last_load.lock().clone().unwrap();
        assert_eq!(request.device, Device::Cuda);
        assert_eq!(request.precision, crate::inference::Precision::Float16);
        assert_eq!(request.auth_token.as_deref(), Some("hf_token"));
        assert_eq!(strategy.device(), Some(Device::Cuda));
    }

    #[tokio::test]
    async fn test_load_failure_is_load_error() {
        let backend = StubBackend::new(StubBehavior {
            fail_load: true,
            ..Default::default()
        });
        let mut strategy = strategy_for("varco-8b", &backend, false).await;

        let err = strategy.load(None).await.unwrap_err();
        assert!(matches!(err, ParrotError::Load { .. }));
        assert!(!strategy.is_loaded());
        assert_eq!(backend.calls.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_request_does_not_poison_strategy() {
        let backend = StubBackend::new(StubBehavior {
            fail_when_input_contains: Some("boom".to_string()),
            ..Default::default()
        });
        let mut strategy = strategy_for("nllb-200", &backend, false).await;
        strategy.load(None).await.unwrap();

        let err = strategy
            .translate("boom", "korean", "japanese", &Default::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ParrotError::Translation { code: TranslationErrorCode::TranslationFailed, .. }
        ));
        assert!(!err.to_string().contains("CUDA"));

        let ok = strategy
            .translate("괜찮아", "korean", "japanese", &Default::default())
            .await
            .unwrap();
        assert_eq!(ok, "괜찮아");
    }

    #[tokio::test]
    async fn test_lang_code_to_id_per_family() {
        let backend = StubBackend::default();
        let nllb = strategy_for("nllb-200", &backend, false).await;
        let mbart = strategy_for("mbart-50", &backend, false).await;
        let varco = strategy_for("varco-8b", &backend, false).await;

        assert_eq!(nllb.lang_code_to_id("korean"), "kor_Hang");
        assert_eq!(mbart.lang_code_to_id("japanese"), "ja_XX");
        assert_eq!(varco.lang_code_to_id("korean"), "한국어");
        assert_eq!(nllb.lang_code_to_id("french"), "french");
        assert!(special_tokens().contains_key(nllb.lang_code_to_id("japanese").as_str()));
    }

    #[tokio::test]
    async fn test_empty_text_is_invalid_request() {
        let backend = StubBackend::default();
        let mut strategy = strategy_for("nllb-200", &backend, false).await;
        strategy.load(None).await.unwrap();

        let err = strategy
            .translate("   ", "korean", "japanese", &Default::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ParrotError::InvalidRequest(_)));
        assert_eq!(backend.calls.inference_calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_generation_is_empty_output_error() {
        let backend = StubBackend::replying("");
        let mut strategy = strategy_for("nllb-200", &backend, false).await;
        strategy.load(None).await.unwrap();

        let err = strategy
            .translate("안녕", "korean", "japanese", &Default::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ParrotError::Translation { code: TranslationErrorCode::EmptyOutput, .. }
        ));
    }
}
