//! Error types for the proxy.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ProxyError {
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Unsupported parameter type: {type_name}")]
    UnsupportedType { type_name: String },

    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    #[error("Gateway error: {message}")]
    Gateway { message: String },

    #[error("No models found")]
    NoModels,

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl ProxyError {
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: msg.into(),
        }
    }

    pub fn unsupported_type(type_name: impl Into<String>) -> Self {
        Self::UnsupportedType {
            type_name: type_name.into(),
        }
    }

    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::Authentication {
            message: msg.into(),
        }
    }

    pub fn gateway(msg: impl Into<String>) -> Self {
        Self::Gateway {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// HTTP status a caller sees for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest { .. } | Self::UnsupportedType { .. } | Self::NoModels => {
                StatusCode::BAD_REQUEST
            }
            Self::Authentication { .. } => StatusCode::UNAUTHORIZED,
            Self::Gateway { .. } | Self::Http(_) => StatusCode::BAD_GATEWAY,
            Self::Config { .. } | Self::Io(_) | Self::Json(_) | Self::Toml(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (
            self.status_code(),
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.to_string(),
        )
            .into_response()
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taxonomy_status_codes() {
        assert_eq!(
            ProxyError::invalid_request("no messages").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ProxyError::unsupported_type("boolean").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ProxyError::NoModels.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ProxyError::authentication("missing header").status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ProxyError::gateway("upstream 500").status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ProxyError::config("bad file").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_response_is_plain_text() {
        let resp = ProxyError::unsupported_type("boolean").into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let content_type = resp
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap();
        assert!(content_type.starts_with("text/plain"));
    }
}
