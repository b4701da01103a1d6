use crate::error::{ProxyError, Result};
use crate::gateway::{Gateway, GatewayConnector};
use crate::logging::SharedLogger;
use crate::proxy;
use crate::translate::openai_types::{
    ChatCompletionRequest, CompletionRequest, ImageGenerationRequest,
};

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

const MODELS_ROUTE: &str = "/models";
const COMPLETIONS_ROUTE: &str = "/completions";
const CHAT_COMPLETIONS_ROUTE: &str = "/chat/completions";
const IMAGE_GENERATIONS_ROUTE: &str = "/images/generations";

#[derive(Clone)]
pub struct AppState {
    pub connector: Arc<dyn GatewayConnector>,
    pub logger: SharedLogger,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        .route(MODELS_ROUTE, get(handle_models))
        .route(COMPLETIONS_ROUTE, post(handle_completions))
        .route(CHAT_COMPLETIONS_ROUTE, post(handle_chat_completions))
        .route(IMAGE_GENERATIONS_ROUTE, post(handle_image_generations))
        .route("/health", get(handle_health));

    Router::new()
        .merge(api.clone())
        .nest("/v1", api)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_models(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let request_id = Uuid::new_v4();
    state.logger.request(request_id, MODELS_ROUTE, None);

    let result = async {
        let gateway = connect(&state, &headers)?;
        proxy::list_models(gateway.as_ref()).await
    }
    .await;

    respond(&state, request_id, MODELS_ROUTE, result)
}

async fn handle_completions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = Uuid::new_v4();

    let result = async {
        let req: CompletionRequest = parse_body(&state, request_id, COMPLETIONS_ROUTE, &body)?;
        let gateway = connect(&state, &headers)?;
        proxy::text_completion(&req, gateway.as_ref()).await
    }
    .await;

    respond(&state, request_id, COMPLETIONS_ROUTE, result)
}

async fn handle_chat_completions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = Uuid::new_v4();

    let result = async {
        let req: ChatCompletionRequest =
            parse_body(&state, request_id, CHAT_COMPLETIONS_ROUTE, &body)?;
        let gateway = connect(&state, &headers)?;
        proxy::chat_completion(&req, gateway.as_ref()).await
    }
    .await;

    respond(&state, request_id, CHAT_COMPLETIONS_ROUTE, result)
}

async fn handle_image_generations(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = Uuid::new_v4();

    let result = async {
        let req: ImageGenerationRequest =
            parse_body(&state, request_id, IMAGE_GENERATIONS_ROUTE, &body)?;
        let gateway = connect(&state, &headers)?;
        proxy::image_generation(&req, gateway.as_ref()).await
    }
    .await;

    // base64 payloads stay out of the journal
    match result {
        Ok(resp) => {
            let bytes: usize = resp.data.iter().map(|d| d.b64_json.len()).sum();
            state.logger.response_note(
                request_id,
                IMAGE_GENERATIONS_ROUTE,
                StatusCode::OK.as_u16(),
                format!("{} image(s), {} base64 bytes", resp.data.len(), bytes),
            );
            Json(resp).into_response()
        }
        Err(e) => fail(&state, request_id, IMAGE_GENERATIONS_ROUTE, e),
    }
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Decode a JSON body, journaling it on the way in.
fn parse_body<T: DeserializeOwned>(
    state: &AppState,
    request_id: Uuid,
    route: &str,
    body: &Bytes,
) -> Result<T> {
    let value: serde_json::Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(e) => {
            state.logger.request(request_id, route, None);
            return Err(ProxyError::invalid_request(format!("Invalid request body: {e}")));
        }
    };
    state.logger.request(request_id, route, Some(&value));

    serde_json::from_value(value)
        .map_err(|e| ProxyError::invalid_request(format!("Invalid request body: {e}")))
}

fn connect(state: &AppState, headers: &HeaderMap) -> Result<Box<dyn Gateway>> {
    let api_key = bearer_credential(headers)?;
    state.connector.connect(&api_key)
}

/// The credential is the second whitespace-separated token of `Authorization`.
fn bearer_credential(headers: &HeaderMap) -> Result<String> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| ProxyError::authentication("missing Authorization header"))?
        .to_str()
        .map_err(|_| ProxyError::authentication("Authorization header is not valid text"))?;

    value
        .split_whitespace()
        .nth(1)
        .map(str::to_string)
        .ok_or_else(|| {
            ProxyError::authentication("expected `Authorization: <scheme> <credential>`")
        })
}

fn respond<T: Serialize>(
    state: &AppState,
    request_id: Uuid,
    route: &str,
    result: Result<T>,
) -> Response {
    match result {
        Ok(body) => {
            state
                .logger
                .response(request_id, route, StatusCode::OK.as_u16(), &body);
            Json(body).into_response()
        }
        Err(e) => fail(state, request_id, route, e),
    }
}

fn fail(state: &AppState, request_id: Uuid, route: &str, err: ProxyError) -> Response {
    tracing::warn!(%request_id, route, status = %err.status_code(), error = %err, "request failed");
    state.logger.failure(request_id, route, &err);
    err.into_response()
}
