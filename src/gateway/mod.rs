//! The backend capability set the translation layer talks to.
//!
//! A [`Gateway`] is scoped to a single caller credential and discarded when the
//! request finishes. [`GatewayConnector`] is what the server holds: it turns the
//! credential from each request's `Authorization` header into a fresh gateway.

pub mod canned;
pub mod gemini;
pub mod types;

use crate::error::Result;
use async_trait::async_trait;
use types::{
    Content, GenerateContentConfig, GenerateContentResponse, GenerateImagesConfig,
    GenerateImagesResponse, Model, Part,
};

#[async_trait]
pub trait Gateway: Send + Sync {
    async fn list_models(&self) -> Result<Vec<Model>>;

    async fn generate_content(
        &self,
        model: &str,
        contents: Vec<Content>,
        config: &GenerateContentConfig,
    ) -> Result<GenerateContentResponse>;

    async fn generate_images(
        &self,
        model: &str,
        prompt: &str,
        config: &GenerateImagesConfig,
    ) -> Result<GenerateImagesResponse>;

    /// Seed a chat session with prior turns.
    fn create_chat(
        &self,
        model: &str,
        history: Vec<Content>,
        config: GenerateContentConfig,
    ) -> ChatSession {
        ChatSession {
            model: model.to_string(),
            history,
            config,
        }
    }

    /// Submit one part as the next user turn of `chat`.
    ///
    /// On success the sent turn and the first candidate's content are appended
    /// to the session history.
    async fn send_message(
        &self,
        chat: &mut ChatSession,
        message: Part,
    ) -> Result<GenerateContentResponse> {
        let turn = Content::new("user", vec![message]);
        let mut contents = chat.history.clone();
        contents.push(turn.clone());

        let response = self
            .generate_content(&chat.model, contents, &chat.config)
            .await?;

        chat.history.push(turn);
        if let Some(content) = response.candidates.first().and_then(|c| c.content.clone()) {
            chat.history.push(content);
        }

        Ok(response)
    }
}

/// Builds a request-scoped [`Gateway`] from a caller credential.
pub trait GatewayConnector: Send + Sync {
    fn connect(&self, api_key: &str) -> Result<Box<dyn Gateway>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatSession {
    pub model: String,
    pub history: Vec<Content>,
    pub config: GenerateContentConfig,
}
