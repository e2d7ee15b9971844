//! Error types for startup and request handling.

use std::path::PathBuf;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::assets::ResolveError;
use crate::bridge::BridgeError;

pub type ServerResult<T> = Result<T, ServerError>;

/// Fatal startup failures. Any of these rejects `server::start`.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("no documents to serve")]
    NoDocuments,
    #[error("invalid document {}: {source}", path.display())]
    InvalidDocument {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(
        "duplicate document name {name:?}: {} and {}",
        first.display(),
        second.display()
    )]
    DuplicateDocument {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },
    #[error("ports {first}-{last} are all in use")]
    PortExhausted { first: u16, last: u16 },
    #[error("failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Handler-level failures, converted to HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("Forbidden")]
    Forbidden,
    #[error("Request body too large")]
    PayloadTooLarge,
    #[error("{0}")]
    Execution(String),
    #[error("Internal Server Error")]
    Internal(String),
}

impl ApiError {
    pub fn not_found() -> Self {
        ApiError::NotFound("Not Found".to_string())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Execution(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(detail) = &self {
            tracing::error!(%detail, "request failed");
        }
        let mut response = (self.status_code(), self.to_string()).into_response();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        response
    }
}

impl From<ResolveError> for ApiError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::Forbidden => ApiError::Forbidden,
            ResolveError::NotFound => ApiError::not_found(),
        }
    }
}

impl From<BridgeError> for ApiError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Disabled => ApiError::NotFound("tmux integration not enabled".to_string()),
            BridgeError::Unavailable => ApiError::NotFound("ttyd is not available".to_string()),
            other => ApiError::Execution(other.to_string()),
        }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}
