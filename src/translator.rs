//! Translation façade: owns the active model strategy, the terminology
//! retriever and the optional result cache.

use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::{format_elapsed, scope_for, ResultCache};
use crate::config::Config;
use crate::error::{ParrotError, Result, TranslationErrorCode};
use crate::inference::{GenerationOverrides, HttpInferenceBackend, InferenceBackend};
use crate::language::{Direction, Language};
use crate::registry::{ModelDescriptor, Registry};
use crate::strategy::ModelStrategy;
use crate::terminology::{configured_glossary, FlatIpIndex, OllamaEmbedder, Retriever};

/// Introspection record for the HTTP layer and CLI
#[derive(Debug, Clone, Serialize)]
pub struct TranslatorInfo {
    pub model_key: Option<String>,
    pub model_name: Option<String>,
    pub backing_id: Option<String>,
    pub strategy: Option<String>,
    pub device: Option<String>,
    pub loaded: bool,
    pub max_length: Option<usize>,
    pub num_beams: usize,
    pub supported_languages: Vec<Language>,
    pub supported_directions: Vec<String>,
    pub terminology_terms: usize,
    pub cache_enabled: bool,
    pub models: Vec<ModelDescriptor>,
}

/// Result of a cache-fronted translation
#[derive(Debug, Clone, Serialize)]
pub struct TranslationOutcome {
    pub original: String,
    pub translated: String,
    pub translate_time: String,
    pub cached: bool,
}

pub struct Translator {
    config: Config,
    registry: Registry,
    backend: Arc<dyn InferenceBackend>,
    retriever: Option<Arc<Retriever>>,
    cache: Option<ResultCache>,
    strategy: Option<ModelStrategy>,
}

impl Translator {
    pub fn new(
        config: Config,
        registry: Registry,
        backend: Arc<dyn InferenceBackend>,
        retriever: Option<Arc<Retriever>>,
        cache: Option<ResultCache>,
    ) -> Self {
        Self {
            config,
            registry,
            backend,
            retriever,
            cache,
            strategy: None,
        }
    }

    /// Wire the production collaborators from configuration. The terminology
    /// index is built here; an unreachable embedding service is fatal. An
    /// unreachable cache store only disables caching.
    pub async fn from_config(config: Config) -> Result<Self> {
        config.validate()?;
        let registry = Registry::with_extra(&config.model.extra_models)?;
        let http_backend = HttpInferenceBackend::new(&config.inference)?;
        if let Err(e) = http_backend.check_availability().await {
            warn!("{}", e);
        }
        let backend: Arc<dyn InferenceBackend> = Arc::new(http_backend);

        let retriever = if config.terminology.enabled {
            let embedder = Arc::new(OllamaEmbedder::new(&config.terminology)?);
            let mut retriever = Retriever::new(embedder, Box::new(FlatIpIndex::new()))
                .with_config(&config.terminology);
            retriever.load(configured_glossary(&config.terminology)?).await?;
            Some(Arc::new(retriever))
        } else {
            info!("Terminology retrieval disabled by configuration");
            None
        };

        let cache = ResultCache::connect(&config.cache).await;

        Ok(Self::new(config, registry, backend, retriever, cache))
    }

    /// Resolve `model_key` (the configured default when omitted) and make it
    /// the active model. With `auto_load` the weights are acquired first and
    /// the previous model stays active if that fails.
    pub async fn load_model(&mut self, model_key: Option<&str>, auto_load: bool) -> Result<()> {
        let key = model_key.unwrap_or(&self.config.model.default_model).to_string();
        let descriptor = self.registry.resolve(&key)?;
        let family = self.registry.family_for(&descriptor)?;

        info!("Selected model: {} ({})", descriptor.display_name, family);

        let mut strategy = ModelStrategy::new(
            descriptor,
            family,
            self.backend.clone(),
            self.retriever.clone(),
            &self.config.model,
        );

        if auto_load {
            strategy.load(self.config.model.auth_token.as_deref()).await?;
        }

        self.strategy = Some(strategy);
        Ok(())
    }

    /// Load the active model's weights if that has not happened yet
    pub async fn ensure_loaded(&mut self) -> Result<()> {
        if self.strategy.is_none() {
            return self.load_model(None, true).await;
        }

        let auth_token = self.config.model.auth_token.clone();
        if let Some(strategy) = self.strategy.as_mut() {
            if !strategy.is_loaded() {
                strategy.load(auth_token.as_deref()).await?;
            }
        }
        Ok(())
    }

    /// Key of the active model, loaded or not
    pub fn active_model(&self) -> Option<&str> {
        self.strategy.as_ref().map(|s| s.descriptor().key.as_str())
    }

    pub fn is_loaded(&self) -> bool {
        self.strategy.as_ref().is_some_and(ModelStrategy::is_loaded)
    }

    pub async fn translate(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
        overrides: &GenerationOverrides,
    ) -> Result<String> {
        let strategy = self
            .strategy
            .as_ref()
            .ok_or_else(|| ParrotError::translation(TranslationErrorCode::ModelNotLoaded))?;

        strategy.translate(text, source_lang, target_lang, overrides).await
    }

    pub async fn translate_korean_to_japanese(
        &self,
        text: &str,
        overrides: &GenerationOverrides,
    ) -> Result<String> {
        self.translate_direction(text, Direction::KOREAN_TO_JAPANESE, overrides)
            .await
    }

    pub async fn translate_japanese_to_korean(
        &self,
        text: &str,
        overrides: &GenerationOverrides,
    ) -> Result<String> {
        self.translate_direction(text, Direction::JAPANESE_TO_KOREAN, overrides)
            .await
    }

    pub async fn translate_direction(
        &self,
        text: &str,
        direction: Direction,
        overrides: &GenerationOverrides,
    ) -> Result<String> {
        self.translate(
            text,
            direction.source.as_str(),
            direction.target.as_str(),
            overrides,
        )
        .await
    }

    /// Translate in order; the first failure aborts the batch
    pub async fn translate_batch(
        &self,
        texts: &[String],
        source_lang: &str,
        target_lang: &str,
        overrides: &GenerationOverrides,
    ) -> Result<Vec<String>> {
        let mut results = Vec::with_capacity(texts.len());
        for (i, text) in texts.iter().enumerate() {
            debug!("Batch item {}/{}", i + 1, texts.len());
            results.push(self.translate(text, source_lang, target_lang, overrides).await?);
        }
        Ok(results)
    }

    /// Serve from the cache when possible, otherwise translate and store
    pub async fn get_or_translate(
        &self,
        text: &str,
        direction: Direction,
        overrides: &GenerationOverrides,
    ) -> Result<TranslationOutcome> {
        if text.trim().is_empty() {
            return Err(ParrotError::InvalidRequest("Text must not be empty".to_string()));
        }

        let cache = self.cache_for(direction);
        let cached = match &cache {
            Some(cache) => cache.get(text).await,
            None => None,
        };
        if let Some(record) = cached {
            return Ok(TranslationOutcome {
                original: record.original,
                translated: record.translated,
                translate_time: record.translate_time,
                cached: true,
            });
        }

        let started = Instant::now();
        let translated = self.translate_direction(text, direction, overrides).await?;
        let elapsed = started.elapsed();

        if let Some(cache) = &cache {
            cache.put(text, &translated, elapsed).await;
        }

        Ok(TranslationOutcome {
            original: text.to_string(),
            translated,
            translate_time: format_elapsed(elapsed),
            cached: false,
        })
    }

    /// Cache view for the active model and `direction`
    fn cache_for(&self, direction: Direction) -> Option<ResultCache> {
        let cache = self.cache.as_ref()?;
        let model = self.active_model()?;
        Some(cache.scoped(&scope_for(model, direction)))
    }

    pub fn describe(&self) -> TranslatorInfo {
        let strategy = self.strategy.as_ref();

        TranslatorInfo {
            model_key: strategy.map(|s| s.descriptor().key.clone()),
            model_name: strategy.map(|s| s.descriptor().display_name.clone()),
            backing_id: strategy.map(|s| s.descriptor().backing_id.clone()),
            strategy: strategy.map(|s| s.kind().to_string()),
            device: strategy.and_then(|s| s.device()).map(|d| d.to_string()),
            loaded: self.is_loaded(),
            max_length: strategy.map(|s| s.max_length()),
            num_beams: self.config.model.num_beams,
            supported_languages: Language::ALL.to_vec(),
            supported_directions: Direction::all().iter().map(Direction::tag).collect(),
            terminology_terms: self.retriever.as_ref().map_or(0, |r| r.entries().len()),
            cache_enabled: self.cache.is_some(),
            models: self.registry.models().to_vec(),
        }
    }

    pub fn list_models(&self) -> &[ModelDescriptor] {
        self.registry.models()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn retriever(&self) -> Option<&Arc<Retriever>> {
        self.retriever.as_ref()
    }

    pub fn cache(&self) -> Option<&ResultCache> {
        self.cache.as_ref()
    }
}
