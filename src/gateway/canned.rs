//! A recording gateway that answers from fixed responses. Used by the test suite
//! in place of a live backend.

use super::types::{
    Content, GenerateContentConfig, GenerateContentResponse, GenerateImagesConfig,
    GenerateImagesResponse, GeneratedImage, Model,
};
use super::{Gateway, GatewayConnector};
use crate::error::{ProxyError, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// A call observed by a [`CannedGateway`].
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCall {
    ListModels,
    GenerateContent {
        model: String,
        contents: Vec<Content>,
        config: GenerateContentConfig,
    },
    GenerateImages {
        model: String,
        prompt: String,
        config: GenerateImagesConfig,
    },
}

#[derive(Clone, Default)]
pub struct CannedGateway {
    models: Vec<Model>,
    content: GenerateContentResponse,
    images: Vec<GeneratedImage>,
    failure: Option<String>,
    calls: Arc<Mutex<Vec<GatewayCall>>>,
}

impl CannedGateway {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_models(mut self, models: Vec<Model>) -> Self {
        self.models = models;
        self
    }

    #[must_use]
    pub fn with_content(mut self, content: GenerateContentResponse) -> Self {
        self.content = content;
        self
    }

    #[must_use]
    pub fn with_images(mut self, images: Vec<GeneratedImage>) -> Self {
        self.images = images;
        self
    }

    /// Every call fails with a gateway error carrying `message`.
    #[must_use]
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Calls recorded so far, shared across clones.
    #[must_use]
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, call: GatewayCall) -> Result<()> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
        match &self.failure {
            Some(message) => Err(ProxyError::gateway(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Gateway for CannedGateway {
    async fn list_models(&self) -> Result<Vec<Model>> {
        self.record(GatewayCall::ListModels)?;
        Ok(self.models.clone())
    }

    async fn generate_content(
        &self,
        model: &str,
        contents: Vec<Content>,
        config: &GenerateContentConfig,
    ) -> Result<GenerateContentResponse> {
        self.record(GatewayCall::GenerateContent {
            model: model.to_string(),
            contents,
            config: config.clone(),
        })?;
        Ok(self.content.clone())
    }

    async fn generate_images(
        &self,
        model: &str,
        prompt: &str,
        config: &GenerateImagesConfig,
    ) -> Result<GenerateImagesResponse> {
        self.record(GatewayCall::GenerateImages {
            model: model.to_string(),
            prompt: prompt.to_string(),
            config: config.clone(),
        })?;
        Ok(GenerateImagesResponse {
            generated_images: self.images.clone(),
        })
    }
}

/// Hands out clones of one [`CannedGateway`] and remembers the credentials it
/// was asked to connect with.
#[derive(Clone, Default)]
pub struct CannedConnector {
    gateway: CannedGateway,
    keys: Arc<Mutex<Vec<String>>>,
}

impl CannedConnector {
    #[must_use]
    pub fn new(gateway: CannedGateway) -> Self {
        Self {
            gateway,
            keys: Arc::default(),
        }
    }

    #[must_use]
    pub fn gateway(&self) -> &CannedGateway {
        &self.gateway
    }

    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.keys.lock().map(|k| k.clone()).unwrap_or_default()
    }
}

impl GatewayConnector for CannedConnector {
    fn connect(&self, api_key: &str) -> Result<Box<dyn Gateway>> {
        if api_key.is_empty() {
            return Err(ProxyError::authentication("empty API key"));
        }
        if let Ok(mut keys) = self.keys.lock() {
            keys.push(api_key.to_string());
        }
        Ok(Box::new(self.gateway.clone()))
    }
}
