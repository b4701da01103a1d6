//! Request handling pipelines: translate inbound, call the gateway, translate
//! outbound. Validation errors surface before the gateway is touched.

use crate::error::Result;
use crate::gateway::Gateway;
use crate::translate::openai_types::{
    ChatCompletionRequest, ChatCompletionResponse, CompletionRequest, ImageGenerationRequest,
    ImageGenerationResponse, ModelList, TextCompletionResponse,
};
use crate::translate::request::{
    chat_request_to_gemini, completion_request_to_gemini, image_request_to_gemini,
};
use crate::translate::response::{
    gemini_to_chat_completion, gemini_to_text_completion, images_to_openai, models_to_openai,
};

pub async fn list_models(gateway: &dyn Gateway) -> Result<ModelList> {
    let models = gateway.list_models().await?;
    tracing::info!(count = models.len(), "listed models");
    models_to_openai(&models)
}

pub async fn text_completion(
    req: &CompletionRequest,
    gateway: &dyn Gateway,
) -> Result<TextCompletionResponse> {
    let plan = completion_request_to_gemini(req)?;

    tracing::info!(model = %plan.model, "text completion");

    let response = gateway
        .generate_content(&plan.model, plan.contents, &plan.config)
        .await?;

    let completion = gemini_to_text_completion(&response, &req.model);
    tracing::info!(
        choices = completion.choices.len(),
        prompt_tokens = completion.usage.prompt_tokens,
        completion_tokens = completion.usage.completion_tokens,
        "text completion finished"
    );
    Ok(completion)
}

pub async fn chat_completion(
    req: &ChatCompletionRequest,
    gateway: &dyn Gateway,
) -> Result<ChatCompletionResponse> {
    let plan = chat_request_to_gemini(req)?;

    tracing::info!(
        model = %plan.model,
        history = plan.history.len(),
        tools = plan.config.tools.iter().map(|t| t.function_declarations.len()).sum::<usize>(),
        "chat completion"
    );

    let mut chat = gateway.create_chat(&plan.model, plan.history, plan.config);
    let response = gateway.send_message(&mut chat, plan.message).await?;

    let completion = gemini_to_chat_completion(&response, &req.model);
    tracing::info!(
        choices = completion.choices.len(),
        prompt_tokens = completion.usage.prompt_tokens,
        completion_tokens = completion.usage.completion_tokens,
        "chat completion finished"
    );
    Ok(completion)
}

pub async fn image_generation(
    req: &ImageGenerationRequest,
    gateway: &dyn Gateway,
) -> Result<ImageGenerationResponse> {
    let plan = image_request_to_gemini(req)?;

    tracing::info!(model = %plan.model, count = ?plan.config.number_of_images, "image generation");

    let response = gateway
        .generate_images(&plan.model, &plan.prompt, &plan.config)
        .await?;
    images_to_openai(&response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProxyError;
    use crate::gateway::canned::{CannedGateway, GatewayCall};
    use crate::gateway::types::{
        Candidate, Content, GenerateContentResponse, GeneratedImage, Model, Part,
        PersonGeneration, UsageMetadata,
    };
    use crate::translate::openai_types::ChoiceMessage;
    use serde_json::json;

    fn text_response(text: &str) -> GenerateContentResponse {
        GenerateContentResponse {
            candidates: vec![Candidate {
                content: Some(Content::new("model", vec![Part::text(text)])),
                finish_reason: Some("STOP".to_string()),
                index: Some(0),
            }],
            usage_metadata: Some(UsageMetadata {
                prompt_token_count: 9,
                candidates_token_count: 3,
            }),
            model_version: Some("gemini-2.0-flash-001".to_string()),
        }
    }

    #[tokio::test]
    async fn test_chat_sends_history_then_current_turn() {
        let gateway = CannedGateway::new().with_content(text_response("Berlin."));
        let req: ChatCompletionRequest = serde_json::from_value(json!({
            "model": "gemini-2.0-flash",
            "messages": [
                {"role": "system", "content": "Be brief"},
                {"role": "user", "content": "Capital of France?"},
                {"role": "assistant", "content": "Paris."},
                {"role": "user", "content": "And Germany?"}
            ],
            "max_tokens": 20
        }))
        .unwrap();

        let resp = chat_completion(&req, &gateway).await.unwrap();

        assert_eq!(resp.choices.len(), 1);
        match &resp.choices[0].message {
            ChoiceMessage::Text { content, .. } => assert_eq!(content, "Berlin."),
            other => panic!("Expected text, got {other:?}"),
        }

        let calls = gateway.calls();
        assert_eq!(calls.len(), 1);
        let GatewayCall::GenerateContent { model, contents, config } = &calls[0] else {
            panic!("Expected generateContent call");
        };
        assert_eq!(model, "gemini-2.0-flash");
        assert_eq!(
            contents,
            &vec![
                Content::new("user", vec![Part::text("Capital of France?")]),
                Content::new("model", vec![Part::text("Paris.")]),
                Content::new("user", vec![Part::text("And Germany?")]),
            ]
        );
        assert_eq!(config.system_instruction.as_deref(), Some("Be brief"));
        assert_eq!(config.generation.max_output_tokens, Some(20));
    }

    #[tokio::test]
    async fn test_invalid_request_never_reaches_gateway() {
        let gateway = CannedGateway::new();
        let req: ChatCompletionRequest = serde_json::from_value(json!({
            "model": "m",
            "messages": [{"role": "user", "content": "hi"}],
            "tools": [{"function": {"name": "f", "parameters": {"properties": {"x": {"type": "boolean"}}}}}]
        }))
        .unwrap();

        let err = chat_completion(&req, &gateway).await.unwrap_err();
        assert!(matches!(err, ProxyError::UnsupportedType { .. }));
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_gateway_failure_propagates() {
        let gateway = CannedGateway::new().failing("backend unavailable");
        let req: CompletionRequest =
            serde_json::from_value(json!({"model": "m", "prompt": "hi"})).unwrap();

        let err = text_completion(&req, &gateway).await.unwrap_err();
        assert!(matches!(err, ProxyError::Gateway { .. }));
        assert_eq!(gateway.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_text_completion_maps_candidates() {
        let gateway = CannedGateway::new().with_content(text_response("there"));
        let req: CompletionRequest =
            serde_json::from_value(json!({"model": "m", "prompt": "hello", "n": 1})).unwrap();

        let resp = text_completion(&req, &gateway).await.unwrap();
        assert_eq!(resp.choices[0].text, "there");
        assert_eq!(resp.usage.total_tokens, 9);
    }

    #[tokio::test]
    async fn test_image_generation_policy() {
        let gateway = CannedGateway::new().with_images(vec![GeneratedImage {
            image_bytes: vec![0x89, b'P', b'N', b'G'],
            mime_type: Some("image/png".to_string()),
        }]);
        let req: ImageGenerationRequest = serde_json::from_value(json!({
            "model": "imagen-3.0-generate-002",
            "prompt": "a red bicycle"
        }))
        .unwrap();

        let resp = image_generation(&req, &gateway).await.unwrap();
        assert_eq!(resp.data.len(), 1);

        let calls = gateway.calls();
        let GatewayCall::GenerateImages { prompt, config, .. } = &calls[0] else {
            panic!("Expected generateImages call");
        };
        assert_eq!(prompt, "a red bicycle");
        assert_eq!(config.person_generation, PersonGeneration::AllowAdult);
        assert_eq!(config.number_of_images, None);
    }

    #[tokio::test]
    async fn test_empty_catalog_is_an_error() {
        let empty = CannedGateway::new();
        assert!(matches!(
            list_models(&empty).await,
            Err(ProxyError::NoModels)
        ));

        let stocked = CannedGateway::new().with_models(vec![Model::named("models/gemini-pro")]);
        let list = list_models(&stocked).await.unwrap();
        assert_eq!(list.data[0].id, "models/gemini-pro");
    }
}
