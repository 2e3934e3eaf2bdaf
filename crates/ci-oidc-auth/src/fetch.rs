//! Outbound JSON document fetching
//!
//! Resolvers never talk to the network directly. They go through a
//! [`DocumentFetcher`], which keeps HTTP policy (timeouts, redirects, status
//! handling) in one place and lets tests substitute their own transport.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{error, info};

use crate::error::FetchError;

/// Default per-request timeout for outbound fetches
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Fetches a JSON document from a URL
#[async_trait]
pub trait DocumentFetcher: Send + Sync + std::fmt::Debug {
    /// GET `url` and parse the body as JSON
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] on transport failure, non-2xx status, or a body
    /// that is not JSON.
    async fn fetch_json(&self, url: &str) -> Result<Value, FetchError>;
}

/// reqwest-backed fetcher used in production
///
/// - Fixed request timeout (10 seconds by default)
/// - Redirects are not followed; a 3xx is a failed fetch
/// - rustls for TLS
#[derive(Debug, Clone)]
pub struct HttpDocumentFetcher {
    client: reqwest::Client,
}

impl HttpDocumentFetcher {
    /// Create a fetcher with the default timeout
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Transport`] if the HTTP client cannot be built.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_timeout(DEFAULT_FETCH_TIMEOUT)
    }

    /// Create a fetcher with a custom per-request timeout
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Transport`] if the HTTP client cannot be built.
    pub fn with_timeout(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("ci-oidc-auth/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Transport {
                url: String::new(),
                message: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self { client })
    }

    /// Wrap an existing client
    ///
    /// The client should carry its own timeout and must not follow redirects.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DocumentFetcher for HttpDocumentFetcher {
    async fn fetch_json(&self, url: &str) -> Result<Value, FetchError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            error!(url, error = %e, "document fetch failed");
            FetchError::Transport {
                url: url.to_string(),
                message: e.to_string(),
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            error!(url, status = %status, "document endpoint returned error status");
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let document: Value = response.json().await.map_err(|e| {
            error!(url, error = %e, "document body is not JSON");
            FetchError::InvalidJson {
                url: url.to_string(),
                message: e.to_string(),
            }
        })?;

        info!(url, "fetched document");
        Ok(document)
    }
}
