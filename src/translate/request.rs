//! Translate OpenAI-dialect requests into Gemini calls.
//!
//! Sampling parameters are renamed field by field. Absent fields stay absent so
//! the backend applies its own defaults. All validation happens here, before any
//! gateway call is made.

use super::history::reconstruct;
use super::openai_types::{
    ChatCompletionRequest, CompletionRequest, ImageGenerationRequest, Prompt, StopSequences,
};
use super::tools::convert_tools;
use crate::error::{ProxyError, Result};
use crate::gateway::types::{
    Content, GenerateContentConfig, GenerateImagesConfig, GenerationConfig, Part,
    PersonGeneration,
};

/// A chat request split into session seed and the message to send.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatPlan {
    pub model: String,
    pub history: Vec<Content>,
    pub message: Part,
    pub config: GenerateContentConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionPlan {
    pub model: String,
    pub contents: Vec<Content>,
    pub config: GenerateContentConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImagePlan {
    pub model: String,
    pub prompt: String,
    pub config: GenerateImagesConfig,
}

pub fn chat_request_to_gemini(req: &ChatCompletionRequest) -> Result<ChatPlan> {
    reject_streaming(req.stream)?;

    let conversation = reconstruct(&req.messages)?;
    let tools = convert_tools(req.tools.as_deref())?;

    Ok(ChatPlan {
        model: req.model.clone(),
        history: conversation.history,
        message: conversation.message,
        config: GenerateContentConfig {
            generation: generation_config(
                req.max_tokens,
                req.n,
                req.temperature,
                req.top_p,
                req.stop.as_ref(),
            ),
            system_instruction: conversation.system_instruction,
            tools,
        },
    })
}

/// The prompt is submitted as-is, with no history reconstruction.
pub fn completion_request_to_gemini(req: &CompletionRequest) -> Result<CompletionPlan> {
    reject_streaming(req.stream)?;

    let parts = match &req.prompt {
        Prompt::Text(text) => vec![Part::text(text.clone())],
        Prompt::Batch(texts) if texts.is_empty() => {
            return Err(ProxyError::invalid_request("prompt must not be empty"));
        }
        Prompt::Batch(texts) => texts.iter().cloned().map(Part::text).collect(),
    };

    Ok(CompletionPlan {
        model: req.model.clone(),
        contents: vec![Content::new("user", parts)],
        config: GenerateContentConfig {
            generation: generation_config(
                req.max_tokens,
                req.n,
                req.temperature,
                req.top_p,
                req.stop.as_ref(),
            ),
            system_instruction: None,
            tools: Vec::new(),
        },
    })
}

pub fn image_request_to_gemini(req: &ImageGenerationRequest) -> Result<ImagePlan> {
    if let Some(format) = req.response_format.as_deref().filter(|f| *f != "b64_json") {
        return Err(ProxyError::invalid_request(format!(
            "response_format `{format}` is not supported; use `b64_json`"
        )));
    }

    Ok(ImagePlan {
        model: req.model.clone(),
        prompt: req.prompt.clone(),
        config: GenerateImagesConfig {
            number_of_images: req.n,
            person_generation: PersonGeneration::AllowAdult,
        },
    })
}

fn generation_config(
    max_tokens: Option<u32>,
    n: Option<u32>,
    temperature: Option<f64>,
    top_p: Option<f64>,
    stop: Option<&StopSequences>,
) -> GenerationConfig {
    GenerationConfig {
        max_output_tokens: max_tokens,
        candidate_count: n,
        temperature,
        top_p,
        stop_sequences: stop.cloned().map(StopSequences::into_vec),
    }
}

fn reject_streaming(stream: Option<bool>) -> Result<()> {
    if stream == Some(true) {
        return Err(ProxyError::invalid_request("streaming responses are not supported"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::types::SchemaType;
    use serde_json::json;

    fn chat_request(value: serde_json::Value) -> ChatCompletionRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_parameters_are_renamed() {
        let req = chat_request(json!({
            "model": "gemini-2.0-flash",
            "messages": [{"role": "user", "content": "Hello"}],
            "max_tokens": 256,
            "n": 2
        }));

        let plan = chat_request_to_gemini(&req).unwrap();

        assert_eq!(plan.model, "gemini-2.0-flash");
        assert_eq!(plan.config.generation.max_output_tokens, Some(256));
        assert_eq!(plan.config.generation.candidate_count, Some(2));
        assert_eq!(plan.message, Part::text("Hello"));
        assert!(plan.history.is_empty());
    }

    #[test]
    fn test_absent_parameters_stay_absent() {
        let req = chat_request(json!({
            "model": "m",
            "messages": [{"role": "user", "content": "Hello"}]
        }));

        let plan = chat_request_to_gemini(&req).unwrap();
        assert!(plan.config.generation.is_empty());
        assert!(plan.config.tools.is_empty());
        assert!(plan.config.system_instruction.is_none());
    }

    #[test]
    fn test_system_and_tools_flow_into_config() {
        let req = chat_request(json!({
            "model": "m",
            "messages": [
                {"role": "system", "content": "You are a weather bot"},
                {"role": "user", "content": "Paris?"}
            ],
            "tools": [{
                "type": "function",
                "function": {
                    "name": "get_weather",
                    "description": "Weather lookup",
                    "parameters": {"properties": {"city": {"type": "string"}}, "required": ["city"]}
                }
            }]
        }));

        let plan = chat_request_to_gemini(&req).unwrap();
        assert_eq!(
            plan.config.system_instruction.as_deref(),
            Some("You are a weather bot")
        );
        assert_eq!(plan.config.tools.len(), 1);
        let decl = &plan.config.tools[0].function_declarations[0];
        let props = decl.parameters.as_ref().unwrap().properties.as_ref().unwrap();
        assert_eq!(props["city"].schema_type, SchemaType::String);
    }

    #[test]
    fn test_only_system_message_is_invalid() {
        let req = chat_request(json!({
            "model": "m",
            "messages": [{"role": "system", "content": "x"}]
        }));
        assert!(matches!(
            chat_request_to_gemini(&req),
            Err(ProxyError::InvalidRequest { .. })
        ));
    }

    #[test]
    fn test_streaming_is_rejected() {
        let req = chat_request(json!({
            "model": "m",
            "stream": true,
            "messages": [{"role": "user", "content": "Hello"}]
        }));
        assert!(matches!(
            chat_request_to_gemini(&req),
            Err(ProxyError::InvalidRequest { .. })
        ));
    }

    #[test]
    fn test_completion_prompt_submitted_directly() {
        let req: CompletionRequest = serde_json::from_value(json!({
            "model": "m",
            "prompt": "Once upon a time",
            "max_tokens": 10,
            "stop": "\n"
        }))
        .unwrap();

        let plan = completion_request_to_gemini(&req).unwrap();
        assert_eq!(
            plan.contents,
            vec![Content::new("user", vec![Part::text("Once upon a time")])]
        );
        assert_eq!(plan.config.generation.max_output_tokens, Some(10));
        assert_eq!(
            plan.config.generation.stop_sequences,
            Some(vec!["\n".to_string()])
        );
    }

    #[test]
    fn test_empty_prompt_batch_is_invalid() {
        let req: CompletionRequest =
            serde_json::from_value(json!({"model": "m", "prompt": []})).unwrap();
        assert!(completion_request_to_gemini(&req).is_err());
    }

    #[test]
    fn test_image_request_allows_adults() {
        let req: ImageGenerationRequest = serde_json::from_value(json!({
            "model": "imagen-3.0-generate-002",
            "prompt": "a lighthouse at dusk",
            "n": 2
        }))
        .unwrap();

        let plan = image_request_to_gemini(&req).unwrap();
        assert_eq!(plan.config.number_of_images, Some(2));
        assert_eq!(plan.config.person_generation, PersonGeneration::AllowAdult);

        let url_req: ImageGenerationRequest = serde_json::from_value(json!({
            "model": "m", "prompt": "p", "response_format": "url"
        }))
        .unwrap();
        assert!(image_request_to_gemini(&url_req).is_err());
    }
}
