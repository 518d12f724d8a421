use super::{ModelStrategy, Request};
use crate::error::Result;
use crate::inference::{GenerationOverrides, GenerationParams, LoadedModel};

/// The compiled runtime tokenizes and decodes on its own; no terminology is applied.
pub(crate) async fn translate(
    strategy: &ModelStrategy,
    loaded: &LoadedModel,
    request: &Request<'_>,
    overrides: &GenerationOverrides,
) -> Result<String> {
    let mut params = GenerationParams {
        max_length: Some(strategy.max_length()),
        num_beams: strategy.num_beams(),
        ..Default::default()
    };
    overrides.apply(&mut params);

    let translated = loaded
        .weights
        .translate_text(request.text, request.source_code, request.target_code, &params)
        .await?;
    Ok(translated.trim().to_string())
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::inference::{Device, Precision};
    use crate::registry::Registry;
    use crate::strategy::ModelStrategy;
    use crate::testing::{StubBackend, StubBehavior};
    use std::sync::Arc;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn test_compiled_translate_uses_short_codes() {
        let backend = StubBackend::new(StubBehavior {
            devices: vec![Device::Mps, Device::Cpu],
            ..Default::default()
        });
        let registry = Registry::default();
        let descriptor = registry.resolve("m2m-100-1.2b").unwrap();
        let family = registry.family_for(&descriptor).unwrap();
        let mut strategy = ModelStrategy::new(
            descriptor,
            family,
            Arc::new(backend.clone()),
            None,
            &Config::default().model,
        );
        strategy.load(None).await.unwrap();

        let load = backend.calls.last_load.lock().clone().unwrap();
        assert_eq!(load.device, Device::Cpu);
        assert_eq!(load.precision, Precision::Int8);
        assert_eq!(load.tokenizer_id, "facebook/m2m100_1.2B");

        let translated = strategy
            .translate("최애 콘서트", "korean", "japanese", &Default::default())
            .await
            .unwrap();
        assert_eq!(translated, "[ko>ja] 최애 콘서트");
        assert_eq!(backend.calls.compiled_translate.load(Ordering::SeqCst), 1);
        assert_eq!(backend.calls.generate.load(Ordering::SeqCst), 0);
    }
}
