//! HTTP routes using Axum.

use std::any::Any;

use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, Path, State},
    http::{header, HeaderValue, Method, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use include_dir::{include_dir, Dir};
use percent_encoding::percent_decode_str;
use serde::Serialize;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::assets;
use crate::content_type;
use crate::error::ApiError;
use crate::state::AppState;

/// Upper bound for `POST /api/tmux/send` bodies.
pub const MAX_SEND_BODY: usize = 10 * 1024;

static PUBLIC: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/public");

const JSON_UTF8: &str = "application/json; charset=utf-8";
const TEXT_UTF8: &str = "text/plain; charset=utf-8";

type ApiResult = Result<Response, ApiError>;

pub fn router(state: AppState) -> Router {
    Router::new()
        // Documents
        .route("/api/files", get(list_files))
        .route("/api/files/:name", get(get_file))
        // tmux bridge
        .route("/api/tmux/status", get(tmux_status))
        .route("/api/tmux/pane", get(tmux_pane))
        .route(
            "/api/tmux/send",
            post(tmux_send).layer(DefaultBodyLimit::max(MAX_SEND_BODY)),
        )
        .route("/api/tmux/init-ttyd", post(init_ttyd))
        // Shell page and document assets
        .route("/", get(index))
        .route("/index.html", get(index))
        .route("/assets/", get(asset_without_path))
        .route("/assets/:name", get(asset_without_path))
        .route("/assets/:name/*path", get(asset))
        .fallback(static_file)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn handle_panic(_: Box<dyn Any + Send + 'static>) -> Response {
    ApiError::Internal("handler panicked".to_string()).into_response()
}

fn respond(content_type: &'static str, body: impl Into<Body>) -> Response {
    let mut response = Response::new(body.into());
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

/// JSON with an explicit UTF-8 charset, which `axum::Json` leaves out.
fn json<T: Serialize>(value: &T) -> ApiResult {
    let body = serde_json::to_vec(value).map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(respond(JSON_UTF8, body))
}

async fn list_files(State(state): State<AppState>) -> ApiResult {
    json(&state.documents.file_infos())
}

async fn get_file(State(state): State<AppState>, Path(name): Path<String>) -> ApiResult {
    let document = state.documents.get(&name).ok_or_else(ApiError::not_found)?;
    let content = tokio::fs::read(&document.absolute).await?;
    Ok(respond(TEXT_UTF8, content))
}

async fn tmux_status(State(state): State<AppState>) -> ApiResult {
    json(&state.bridge.status().await)
}

async fn tmux_pane(State(state): State<AppState>) -> ApiResult {
    let content = state.bridge.capture_content().await?;
    Ok(respond(TEXT_UTF8, content))
}

async fn tmux_send(State(state): State<AppState>, body: Bytes) -> ApiResult {
    if state.bridge.pane_id().is_none() {
        return Err(ApiError::NotFound("tmux integration not enabled".to_string()));
    }

    let invalid = || ApiError::Validation("Invalid request: text field required".to_string());
    let request: serde_json::Value = serde_json::from_slice(&body).map_err(|_| invalid())?;
    let text = request
        .get("text")
        .and_then(serde_json::Value::as_str)
        .filter(|text| !text.is_empty())
        .ok_or_else(invalid)?;

    if let Err(err) = state.bridge.send_text(text).await {
        warn!(%err, "send to tmux pane failed");
        return Err(ApiError::Execution("Failed to send to tmux pane".to_string()));
    }
    json(&serde_json::json!({ "success": true }))
}

async fn init_ttyd(State(state): State<AppState>) -> ApiResult {
    let session = state.bridge.start_interactive_session().await?;
    json(&session)
}

async fn index() -> ApiResult {
    embedded("index.html")
}

async fn asset_without_path() -> ApiError {
    ApiError::Validation("Bad Request".to_string())
}

async fn asset(
    State(state): State<AppState>,
    Path((name, path)): Path<(String, String)>,
) -> ApiResult {
    let base = state
        .documents
        .base_dir(&name)
        .ok_or_else(ApiError::not_found)?;
    let resolved = assets::resolve(base, &path).await?;
    let content = tokio::fs::read(&resolved)
        .await
        .map_err(|_| ApiError::not_found())?;
    Ok(respond(content_type::for_path(&resolved), content))
}

async fn static_file(method: Method, uri: Uri) -> ApiResult {
    if method != Method::GET && method != Method::HEAD {
        return Err(ApiError::not_found());
    }
    let decoded = percent_decode_str(uri.path())
        .decode_utf8()
        .map_err(|_| ApiError::Validation("Bad Request".to_string()))?;
    embedded(decoded.trim_start_matches('/'))
}

fn embedded(path: &str) -> ApiResult {
    let file = PUBLIC.get_file(path).ok_or_else(ApiError::not_found)?;
    Ok(respond(content_type::for_path(path), file.contents()))
}
