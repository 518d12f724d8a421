use tracing::debug;

use super::{ModelStrategy, Request};
use crate::error::Result;
use crate::inference::{ChatMessage, GenerationOverrides, GenerationParams, LoadedModel};
use crate::registry::ModelFamily;

/// Markers after which generated text is discarded
const STOP_MARKERS: &[&str] = &["<|endofturn|>", "<|stop|>", "<|eot_id|>", "<|im_end|>"];

const CLOVA_SYSTEM: &str = "- AI 언어모델의 이름은 \"CLOVA X\" 이며 네이버에서 만들었다.\n\
- 당신은 전문 번역가입니다. 주어진 텍스트를 정확하고 자연스럽게 번역하세요.";

const QWEN_SYSTEM: &str = "You are Qwen, created by Alibaba Cloud. You are a professional \
translator. Translate the given text accurately and naturally.";

const VARCO_SYSTEM: &str = "당신은 한국어, 일본어, 영어에 능통한 전문 번역가입니다. \
원문의 의미와 어조를 유지하며 번역하고, 번역문만 출력하세요.";

/// Chat messages for one request. `hint` is only present when terminology matched.
fn build_messages(family: ModelFamily, request: &Request<'_>, hint: Option<&str>) -> Vec<ChatMessage> {
    let (source, target, text) = (request.source_code, request.target_code, request.text);

    match family {
        ModelFamily::Qwen => {
            let mut prompt = format!("Translate from {} to {}:\n\n{}\n", source, target, text);
            if let Some(hint) = hint {
                prompt.push_str(&format!("\nTerminology: {}\n", hint));
            }
            prompt.push_str(&format!("\nOutput only the {} translation.", target));
            vec![ChatMessage::system(QWEN_SYSTEM), ChatMessage::user(prompt)]
        }
        ModelFamily::Varco => {
            let mut prompt = format!("다음 {} 문장을 {}로 번역하세요.\n\n{}", source, target, text);
            if let Some(hint) = hint {
                prompt.push_str(&format!("\n\n참고 용어: {}", hint));
            }
            vec![ChatMessage::system(VARCO_SYSTEM), ChatMessage::user(prompt)]
        }
        _ => {
            let mut prompt = format!("다음 {}를 {}로 번역하세요.\n\n{}", source, target, text);
            if let Some(hint) = hint {
                prompt.push_str(&format!("\n\n용어집: {}", hint));
            }
            prompt.push_str("\n\n번역문만 출력하세요.");
            vec![
                ChatMessage::new("tool_list", ""),
                ChatMessage::system(CLOVA_SYSTEM),
                ChatMessage::user(prompt),
            ]
        }
    }
}

async fn generation_params(
    strategy: &ModelStrategy,
    loaded: &LoadedModel,
) -> Result<GenerationParams> {
    let eos = loaded.tokenizer.eos_token_id();
    let mut params = GenerationParams {
        max_new_tokens: Some(strategy.max_length()),
        num_beams: 1,
        do_sample: false,
        pad_token_id: eos,
        ..Default::default()
    };

    match strategy.family() {
        ModelFamily::Qwen => {
            params.num_beams = strategy.num_beams();
            params.early_stopping = true;
        }
        ModelFamily::Varco => {
            params.max_new_tokens = None;
            params.max_length = Some(strategy.max_length());
            params.eos_token_ids.extend(eos);
            if let Some(eot) = loaded.tokenizer.token_to_id("<|eot_id|>").await? {
                params.eos_token_ids.push(eot);
            }
        }
        _ => {
            params.repetition_penalty = Some(1.1);
            params.stop_strings = vec!["<|endofturn|>".to_string(), "<|stop|>".to_string()];
        }
    }

    Ok(params)
}

pub(crate) async fn translate(
    strategy: &ModelStrategy,
    loaded: &LoadedModel,
    request: &Request<'_>,
    overrides: &GenerationOverrides,
) -> Result<String> {
    let hint = strategy.terminology_hint(request).await?;
    let hint = (hint != request.text).then_some(hint);
    if let Some(hint) = &hint {
        debug!("Terminology hint: {}", hint);
    }

    let messages = build_messages(strategy.family(), request, hint.as_deref());
    let input_ids = loaded.tokenizer.apply_chat_template(&messages).await?;

    let mut params = generation_params(strategy, loaded).await?;
    overrides.apply(&mut params);

    let output_ids = loaded.weights.generate(&input_ids, &params).await?;
    let generated = output_ids.strip_prefix(input_ids.as_slice()).unwrap_or(&output_ids);
    let decoded = loaded.tokenizer.decode(generated, true).await?;

    Ok(clean_output(&decoded))
}

/// Cut at the first stop marker, drop code fences, trim
pub fn clean_output(text: &str) -> String {
    let cut = STOP_MARKERS
        .iter()
        .filter_map(|marker| text.find(marker))
        .min()
        .map_or(text, |end| &text[..end]);

    strip_code_fences(cut).trim().to_string()
}

/// Remove ``` fences together with the line breaks that touch them
fn strip_code_fences(text: &str) -> String {
    let parts: Vec<&str> = text.split("```").collect();
    let last = parts.len() - 1;

    let mut out = String::with_capacity(text.len());
    for (i, part) in parts.iter().enumerate() {
        let mut part = *part;
        if i > 0 {
            part = part.trim_start_matches(['\r', '\n']);
        }
        if i < last {
            part = part.trim_end_matches(['\r', '\n']);
        }
        out.push_str(part);
    }
    out
}
