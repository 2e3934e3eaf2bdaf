//! Error types for ci-oidc-server
//!
//! - [`ApiError`] - client input errors rendered as HTTP responses
//! - [`ServerError`] - startup and serving failures, mapped to a process exit

use std::net::SocketAddr;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ci_oidc_auth::error::{ConfigError, FetchError};
use serde_json::json;
use thiserror::Error;

/// Result type for server startup
pub type ServerResult<T> = std::result::Result<T, ServerError>;

/// Request errors surfaced before verification begins
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ApiError {
    /// No `Authorization` header, or a scheme other than `Bearer`
    #[error("Missing Bearer token")]
    MissingBearer,

    /// `Bearer` scheme with nothing after it
    #[error("Empty Bearer token")]
    EmptyBearer,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "detail": self.to_string() })),
        )
            .into_response()
    }
}

/// Errors that stop the server from starting or serving
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ServerError {
    /// Invalid policy or verifier configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The outbound HTTP client could not be built
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] FetchError),

    /// The listener could not be bound
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The server stopped with an I/O error
    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),

    /// The tracing subscriber could not be installed
    #[error("Logging error: {0}")]
    Logging(String),
}
