//! Translate Gemini responses back into the OpenAI dialect.
//!
//! Only text and function-call parts reach the caller; every other part kind a
//! candidate carries is skipped.

use std::collections::HashSet;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use rand::Rng;

use super::openai_types::{
    ChatChoice, ChatCompletionResponse, ChatToolCall, ChatToolCallFunction, ChoiceMessage,
    ImageData, ImageGenerationResponse, ModelList, ModelObject, TextChoice,
    TextCompletionResponse, Usage,
};
use crate::error::{ProxyError, Result};
use crate::gateway::types::{
    FunctionCall, GenerateContentResponse, GenerateImagesResponse, Model, Part, UsageMetadata,
};

/// Translate a Gemini response into a chat completion.
///
/// Each candidate yields up to two choices sharing its index: one carrying its
/// function calls (finish reason forced to `tool_calls`) and one carrying its
/// concatenated text (finish reason as reported by the backend).
pub fn gemini_to_chat_completion(
    resp: &GenerateContentResponse,
    requested_model: &str,
) -> ChatCompletionResponse {
    let created = Utc::now().timestamp();
    let mut taken_ids = HashSet::new();
    let mut choices = Vec::new();

    for (idx, candidate) in resp.candidates.iter().enumerate() {
        let index = u32::try_from(idx).unwrap_or(u32::MAX);
        let mut text = String::new();
        let mut tool_calls = Vec::new();

        for part in candidate.parts() {
            match part {
                Part::Text { text: t } => text.push_str(t),
                Part::FunctionCall { function_call } => {
                    tool_calls.push(to_tool_call(function_call, &mut taken_ids));
                }
                Part::FunctionResponse { .. } | Part::Other(_) => {}
            }
        }

        if !tool_calls.is_empty() {
            choices.push(ChatChoice {
                index,
                message: ChoiceMessage::ToolCalls {
                    role: "assistant".to_string(),
                    tool_calls,
                },
                finish_reason: Some("tool_calls".to_string()),
            });
        }

        if !text.is_empty() {
            choices.push(ChatChoice {
                index,
                message: ChoiceMessage::Text {
                    role: "assistant".to_string(),
                    content: text,
                    refusal: None,
                },
                finish_reason: candidate.finish_reason.clone(),
            });
        }
    }

    ChatCompletionResponse {
        id: format!("chatcmpl-{created}"),
        object: "chat.completion".to_string(),
        created,
        model: reported_model(resp, requested_model),
        choices,
        usage: map_usage(resp.usage_metadata.as_ref()),
    }
}

/// Translate a Gemini response into a plain text completion, one choice per
/// candidate.
pub fn gemini_to_text_completion(
    resp: &GenerateContentResponse,
    requested_model: &str,
) -> TextCompletionResponse {
    let created = Utc::now().timestamp();

    let choices = resp
        .candidates
        .iter()
        .enumerate()
        .map(|(idx, candidate)| TextChoice {
            index: u32::try_from(idx).unwrap_or(u32::MAX),
            text: candidate
                .parts()
                .iter()
                .filter_map(|p| match p {
                    Part::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect(),
            finish_reason: candidate.finish_reason.clone(),
        })
        .collect();

    TextCompletionResponse {
        id: format!("cmpl-{created}"),
        object: "text_completion".to_string(),
        created,
        model: reported_model(resp, requested_model),
        choices,
        usage: map_usage(resp.usage_metadata.as_ref()),
    }
}

/// Encode generated images as base64 payloads.
///
/// # Errors
/// Returns `ProxyError::Gateway` when the backend produced no images.
pub fn images_to_openai(resp: &GenerateImagesResponse) -> Result<ImageGenerationResponse> {
    if resp.generated_images.is_empty() {
        return Err(ProxyError::gateway(
            "provider returned no images (the prompt may have been filtered)",
        ));
    }

    Ok(ImageGenerationResponse {
        created: Utc::now().timestamp(),
        data: resp
            .generated_images
            .iter()
            .map(|image| ImageData {
                b64_json: STANDARD.encode(&image.image_bytes),
            })
            .collect(),
    })
}

/// # Errors
/// Returns `ProxyError::NoModels` for an empty catalog, which usually means a
/// bad credential or misconfigured backend.
pub fn models_to_openai(models: &[Model]) -> Result<ModelList> {
    if models.is_empty() {
        return Err(ProxyError::NoModels);
    }

    Ok(ModelList {
        object: "list".to_string(),
        data: models
            .iter()
            .map(|m| ModelObject {
                id: m.name.clone(),
                object: "model".to_string(),
            })
            .collect(),
    })
}

/// `total_tokens` mirrors `prompt_tokens`, not the sum of both counts.
pub fn map_usage(usage: Option<&UsageMetadata>) -> Usage {
    usage.map_or_else(Usage::default, |u| Usage {
        prompt_tokens: u.prompt_token_count,
        completion_tokens: u.candidates_token_count,
        total_tokens: u.prompt_token_count,
    })
}

fn reported_model(resp: &GenerateContentResponse, requested_model: &str) -> String {
    resp.model_version
        .clone()
        .unwrap_or_else(|| requested_model.to_string())
}

fn to_tool_call(call: &FunctionCall, taken_ids: &mut HashSet<String>) -> ChatToolCall {
    let arguments = call.args.clone().map_or_else(
        || "{}".to_string(),
        |args| serde_json::Value::Object(args).to_string(),
    );

    ChatToolCall {
        id: tool_call_id(&call.name, taken_ids),
        call_type: "function".to_string(),
        function: ChatToolCallFunction {
            name: call.name.clone(),
            arguments,
        },
    }
}

/// `<random>_<function name>`, re-drawn until unique within one response.
fn tool_call_id(name: &str, taken_ids: &mut HashSet<String>) -> String {
    let mut rng = rand::rng();
    loop {
        let id = format!("{}_{name}", rng.random_range(0..=1_000_000u32));
        if taken_ids.insert(id.clone()) {
            return id;
        }
    }
}
