//! [`Gateway`] over the Gemini Generative Language REST API.

use super::types::{
    Content, GenerateContentConfig, GenerateContentResponse, GenerateImagesConfig,
    GenerateImagesResponse, GeneratedImage, GenerationConfig, Model, Part, PersonGeneration,
    Tool,
};
use super::{Gateway, GatewayConnector};
use crate::error::{ProxyError, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const API_KEY_HEADER: &str = "x-goog-api-key";
const MODELS_PAGE_SIZE: u32 = 1000;
const MAX_MODEL_PAGES: usize = 50;

/// Shares one HTTP connection pool across all request-scoped gateways.
#[derive(Debug, Clone)]
pub struct GeminiConnector {
    client: reqwest::Client,
    base_url: String,
}

impl GeminiConnector {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

impl GatewayConnector for GeminiConnector {
    fn connect(&self, api_key: &str) -> Result<Box<dyn Gateway>> {
        if api_key.trim().is_empty() {
            return Err(ProxyError::authentication("empty API key"));
        }
        Ok(Box::new(GeminiGateway {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            api_key: api_key.to_string(),
        }))
    }
}

pub struct GeminiGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GeminiGateway {
    async fn send(&self, request: reqwest::RequestBuilder, action: &str) -> Result<reqwest::Response> {
        let response = request
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(action, error = %e, "upstream request failed");
                ProxyError::gateway(format!("{action} request failed: {e}"))
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        tracing::warn!(action, status = %status, "upstream returned error");
        Err(upstream_error(status.as_u16(), &body))
    }
}

#[async_trait]
impl Gateway for GeminiGateway {
    async fn list_models(&self) -> Result<Vec<Model>> {
        let url = format!("{}/models", self.base_url);
        let mut models = Vec::new();
        let mut page_token: Option<String> = None;
        let mut seen_tokens = HashSet::new();

        for _ in 0..MAX_MODEL_PAGES {
            let mut request = self
                .client
                .get(&url)
                .query(&[("pageSize", MODELS_PAGE_SIZE.to_string())]);
            if let Some(ref token) = page_token {
                request = request.query(&[("pageToken", token)]);
            }

            let page: ListModelsResponse = self
                .send(request, "listModels")
                .await?
                .json()
                .await
                .map_err(|e| ProxyError::gateway(format!("failed to parse models page: {e}")))?;

            models.extend(page.models);
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) if seen_tokens.insert(token.clone()) => page_token = Some(token),
                Some(token) => {
                    tracing::warn!(%token, "model listing repeated a page token, stopping");
                    page_token = None;
                    break;
                }
                None => {
                    page_token = None;
                    break;
                }
            }
        }

        if page_token.is_some() {
            tracing::warn!(pages = MAX_MODEL_PAGES, "model listing truncated at page limit");
        }

        tracing::debug!(count = models.len(), "listed models");
        Ok(models)
    }

    async fn generate_content(
        &self,
        model: &str,
        contents: Vec<Content>,
        config: &GenerateContentConfig,
    ) -> Result<GenerateContentResponse> {
        let url = format!("{}/{}:generateContent", self.base_url, model_path(model));
        let body = GenerateContentRequest {
            contents: &contents,
            system_instruction: config
                .system_instruction
                .as_ref()
                .map(|text| Content {
                    role: None,
                    parts: vec![Part::text(text.clone())],
                }),
            generation_config: Some(&config.generation).filter(|g| !g.is_empty()),
            tools: &config.tools,
        };

        tracing::debug!(model, turns = contents.len(), "generateContent");

        self.send(self.client.post(&url).json(&body), "generateContent")
            .await?
            .json()
            .await
            .map_err(|e| ProxyError::gateway(format!("failed to parse generateContent response: {e}")))
    }

    async fn generate_images(
        &self,
        model: &str,
        prompt: &str,
        config: &GenerateImagesConfig,
    ) -> Result<GenerateImagesResponse> {
        let url = format!("{}/{}:predict", self.base_url, model_path(model));
        let body = PredictRequest {
            instances: vec![PredictInstance { prompt }],
            parameters: PredictParameters {
                sample_count: config.number_of_images,
                person_generation: config.person_generation,
            },
        };

        tracing::debug!(model, "predict");

        let parsed: PredictResponse = self
            .send(self.client.post(&url).json(&body), "predict")
            .await?
            .json()
            .await
            .map_err(|e| ProxyError::gateway(format!("failed to parse predict response: {e}")))?;

        let mut generated_images = Vec::with_capacity(parsed.predictions.len());
        for prediction in parsed.predictions {
            // Filtered predictions carry a reason instead of bytes.
            let Some(encoded) = prediction.bytes_base64_encoded else {
                continue;
            };
            let image_bytes = STANDARD
                .decode(encoded.as_bytes())
                .map_err(|e| ProxyError::gateway(format!("provider sent invalid image data: {e}")))?;
            generated_images.push(GeneratedImage {
                image_bytes,
                mime_type: prediction.mime_type,
            });
        }

        Ok(GenerateImagesResponse { generated_images })
    }
}

/// Resource path for a model id. Ids taken from the model listing already carry
/// their `models/` prefix.
fn model_path(model: &str) -> String {
    if model.contains('/') {
        model.to_string()
    } else {
        format!("models/{model}")
    }
}

fn upstream_error(status: u16, body: &str) -> ProxyError {
    let message = serde_json::from_str::<GoogleErrorResponse>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| truncate(body, 500).to_string());

    if status == 401 || status == 403 || body.contains("API_KEY_INVALID") {
        ProxyError::authentication(format!("provider returned {status}: {message}"))
    } else {
        ProxyError::gateway(format!("provider returned {status}: {message}"))
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// ---------------------------------------------------------------------------
// REST envelopes
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: &'a [Content],
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<&'a GenerationConfig>,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    tools: &'a [Tool],
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListModelsResponse {
    #[serde(default)]
    models: Vec<Model>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Serialize)]
struct PredictRequest<'a> {
    instances: Vec<PredictInstance<'a>>,
    parameters: PredictParameters,
}

#[derive(Serialize)]
struct PredictInstance<'a> {
    prompt: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PredictParameters {
    #[serde(skip_serializing_if = "Option::is_none")]
    sample_count: Option<u32>,
    person_generation: PersonGeneration,
}

#[derive(Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    #[serde(default)]
    bytes_base64_encoded: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
}

#[derive(Deserialize)]
struct GoogleErrorResponse {
    error: GoogleErrorDetail,
}

#[derive(Deserialize)]
struct GoogleErrorDetail {
    message: String,
}
