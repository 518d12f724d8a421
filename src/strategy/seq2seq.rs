use tracing::debug;

use super::{ModelStrategy, Request};
use crate::error::{ParrotError, Result};
use crate::inference::{GenerationOverrides, GenerationParams, LoadedModel};
use crate::registry::ModelFamily;

/// How a seq2seq family selects the output language
enum TargetSelection {
    /// First decoder token is the target-language token
    ForcedToken,
    /// Target language passed as a generation attribute
    Attribute,
    /// Direction is fixed by the checkpoint
    Implicit,
}

fn target_selection(family: ModelFamily) -> TargetSelection {
    match family {
        ModelFamily::Seamless => TargetSelection::Attribute,
        ModelFamily::Opus => TargetSelection::Implicit,
        _ => TargetSelection::ForcedToken,
    }
}

/// Families whose source text is canonicalized with same-language terms first
fn normalizes_input(family: ModelFamily) -> bool {
    matches!(family, ModelFamily::Mbart | ModelFamily::Seamless)
}

pub(crate) async fn translate(
    strategy: &ModelStrategy,
    loaded: &LoadedModel,
    request: &Request<'_>,
    overrides: &GenerationOverrides,
) -> Result<String> {
    let family = strategy.family();

    let text = if normalizes_input(family) {
        let normalized = strategy.normalize_terms(request).await?;
        if normalized != request.text {
            debug!("Normalized input: {} -> {}", request.text, normalized);
        }
        normalized
    } else {
        request.text.to_string()
    };

    let src_lang = match target_selection(family) {
        TargetSelection::Implicit => None,
        _ => Some(request.source_code),
    };
    let input_ids = loaded.tokenizer.encode(&text, src_lang).await?;

    let mut params = GenerationParams {
        max_length: Some(strategy.max_length()),
        num_beams: strategy.num_beams(),
        early_stopping: true,
        ..Default::default()
    };

    match target_selection(family) {
        TargetSelection::ForcedToken => {
            let token = loaded.tokenizer.token_to_id(request.target_code).await?;
            let token = token.ok_or_else(|| {
                ParrotError::Config(format!(
                    "Tokenizer has no language token '{}'",
                    request.target_code
                ))
            })?;
            params.forced_bos_token_id = Some(token);
        }
        TargetSelection::Attribute => {
            params.target_lang = Some(request.target_code.to_string());
        }
        TargetSelection::Implicit => {}
    }

    overrides.apply(&mut params);

    let output_ids = loaded.weights.generate(&input_ids, &params).await?;
    let decoded = loaded.tokenizer.decode(&output_ids, true).await?;
    Ok(decoded.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::super::ModelStrategy;
    use crate::config::Config;
    use crate::inference::GenerationOverrides;
    use crate::registry::Registry;
    use crate::terminology::{builtin_glossary, FlatIpIndex, Retriever};
    use crate::testing::{special_tokens, CharEmbedder, StubBackend, StubBehavior};
    use std::sync::Arc;

    async fn loaded(key: &str, backend: &StubBackend) -> ModelStrategy {
        let registry = Registry::default();
        let descriptor = registry.resolve(key).unwrap();
        let family = registry.family_for(&descriptor).unwrap();

        let mut retriever =
            Retriever::new(Arc::new(CharEmbedder::default()), Box::new(FlatIpIndex::new()));
        retriever.load(builtin_glossary()).await.unwrap();

        let mut strategy = ModelStrategy::new(
            descriptor,
            family,
            Arc::new(backend.clone()),
            Some(Arc::new(retriever)),
            &Config::default().model,
        );
        strategy.load(None).await.unwrap();
        strategy
    }

    #[tokio::test]
    async fn test_nllb_forces_target_language_token() {
        let jpn = special_tokens()["jpn_Jpan"];
        let backend = StubBackend::new(StubBehavior {
            reply: Some("こんにちは".to_string()),
            expect_forced_bos: Some(jpn),
            ..Default::default()
        });
        let strategy = loaded("nllb-200", &backend).await;

        let translated = strategy
            .translate("안녕", "korean", "japanese", &GenerationOverrides::default())
            .await
            .unwrap();
        assert_eq!(translated, "こんにちは");

        let (_, src_lang) = backend.calls.last_encoded.lock().clone().unwrap();
        assert_eq!(src_lang.as_deref(), Some("kor_Hang"));

        let params = backend.calls.last_params.lock().clone().unwrap();
        assert_eq!(params.num_beams, 5);
        assert_eq!(params.max_length, Some(128));
        assert!(params.early_stopping);
    }

    #[tokio::test]
    async fn test_mbart_normalizes_terms_before_encoding() {
        let backend = StubBackend::default();
        let strategy = loaded("mbart-50", &backend).await;

        strategy
            .translate("포카 샀어요", "korean", "japanese", &Default::default())
            .await
            .unwrap();

        let (encoded, src_lang) = backend.calls.last_encoded.lock().clone().unwrap();
        assert_eq!(encoded, "포토카드 샀어요");
        assert_eq!(src_lang.as_deref(), Some("ko_KR"));
        let params = backend.calls.last_params.lock().clone().unwrap();
        assert_eq!(params.forced_bos_token_id, Some(special_tokens()["ja_XX"]));
    }

    #[tokio::test]
    async fn test_nllb_does_not_normalize() {
        let backend = StubBackend::default();
        let strategy = loaded("nllb-200", &backend).await;

        strategy
            .translate("포카 샀어요", "korean", "japanese", &Default::default())
            .await
            .unwrap();

        let (encoded, _) = backend.calls.last_encoded.lock().clone().unwrap();
        assert_eq!(encoded, "포카 샀어요");
    }

    #[tokio::test]
    async fn test_seamless_passes_target_attribute() {
        let backend = StubBackend::default();
        let strategy = loaded("seamless-m4t", &backend).await;

        strategy
            .translate("안녕하세요", "korean", "japanese", &Default::default())
            .await
            .unwrap();

        let params = backend.calls.last_params.lock().clone().unwrap();
        assert_eq!(params.target_lang.as_deref(), Some("jpn"));
        assert_eq!(params.forced_bos_token_id, None);
    }

    #[tokio::test]
    async fn test_opus_has_fixed_direction() {
        let backend = StubBackend::default();
        let strategy = loaded("opus-ko-ja", &backend).await;

        strategy
            .translate("안녕하세요", "korean", "japanese", &Default::default())
            .await
            .unwrap();

        let (_, src_lang) = backend.calls.last_encoded.lock().clone().unwrap();
        assert_eq!(src_lang, None);
        let params = backend.calls.last_params.lock().clone().unwrap();
        assert_eq!(params.forced_bos_token_id, None);
    }

    #[tokio::test]
    async fn test_overrides_apply_over_defaults() {
        let backend = StubBackend::default();
        let strategy = loaded("nllb-200", &backend).await;

        let overrides = GenerationOverrides {
            max_length: Some(32),
            num_beams: Some(1),
            ..Default::default()
        };
        strategy
            .translate("안녕", "korean", "english", &overrides)
            .await
            .unwrap();

        let params = backend.calls.last_params.lock().clone().unwrap();
        assert_eq!(params.max_length, Some(32));
        assert_eq!(params.num_beams, 1);
        assert_eq!(params.forced_bos_token_id, Some(special_tokens()["eng_Latn"]));
    }
}
