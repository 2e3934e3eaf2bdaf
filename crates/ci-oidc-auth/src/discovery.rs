//! # OpenID Connect Discovery
//!
//! Resolves an issuer to its OpenID configuration document,
//! `{issuer}/.well-known/openid-configuration`, through a shared
//! [`DocumentCache`] keyed by issuer.
//!
//! Only `jwks_uri` is interpreted here; every other field is kept as-is.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::cache::DocumentCache;
use crate::error::ResolveError;
use crate::fetch::DocumentFetcher;

/// Well-known path appended to the issuer
pub const OPENID_CONFIGURATION_PATH: &str = "/.well-known/openid-configuration";

/// OpenID Provider configuration document
///
/// A minimal representation: the issuer and `jwks_uri` are typed, the rest is
/// preserved in `additional`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryDocument {
    /// Issuer identifier advertised by the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,

    /// Location of the provider's JWK Set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<String>,

    /// All other fields
    #[serde(flatten)]
    pub additional: Map<String, Value>,
}

impl DiscoveryDocument {
    /// `jwks_uri` if present and non-empty
    pub fn jwks_uri(&self) -> Option<&str> {
        self.jwks_uri.as_deref().filter(|uri| !uri.is_empty())
    }
}

/// Discovery URL for an issuer
pub fn discovery_url(issuer: &str) -> String {
    format!("{issuer}{OPENID_CONFIGURATION_PATH}")
}

/// Resolves issuers to discovery documents
///
/// # Example
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use ci_oidc_auth::cache::DocumentCache;
/// # use ci_oidc_auth::discovery::DiscoveryResolver;
/// # use ci_oidc_auth::fetch::HttpDocumentFetcher;
/// # tokio_test::block_on(async {
/// let resolver = DiscoveryResolver::new(
///     Arc::new(HttpDocumentFetcher::new()?),
///     Arc::new(DocumentCache::default()),
/// );
///
/// let doc = resolver
///     .resolve("https://token.actions.githubusercontent.com")
///     .await?;
/// println!("JWKS at {:?}", doc.jwks_uri());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct DiscoveryResolver {
    fetcher: Arc<dyn DocumentFetcher>,
    cache: Arc<DocumentCache<DiscoveryDocument>>,
}

impl DiscoveryResolver {
    /// Create a resolver over a fetcher and a (possibly shared) cache
    pub fn new(
        fetcher: Arc<dyn DocumentFetcher>,
        cache: Arc<DocumentCache<DiscoveryDocument>>,
    ) -> Self {
        Self { fetcher, cache }
    }

    /// The cache backing this resolver
    pub fn cache(&self) -> &Arc<DocumentCache<DiscoveryDocument>> {
        &self.cache
    }

    /// The fetcher backing this resolver
    pub fn fetcher(&self) -> &Arc<dyn DocumentFetcher> {
        &self.fetcher
    }

    /// Return the issuer's discovery document, from cache when fresh
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::DiscoveryFetch`] if the document cannot be
    /// retrieved (transport error, non-2xx) or is not a JSON object.
    #[tracing::instrument(skip(self))]
    pub async fn resolve(&self, issuer: &str) -> Result<DiscoveryDocument, ResolveError> {
        self.cache
            .get_or_fetch(issuer, || self.fetch(issuer))
            .await
    }

    async fn fetch(&self, issuer: &str) -> Result<DiscoveryDocument, ResolveError> {
        let url = discovery_url(issuer);
        debug!(issuer, url = %url, "fetching OpenID configuration");

        let raw = self.fetcher.fetch_json(&url).await.map_err(|e| {
            warn!(issuer, error = %e, "OpenID configuration fetch failed");
            ResolveError::DiscoveryFetch(e.to_string())
        })?;

        let document: DiscoveryDocument = serde_json::from_value(raw).map_err(|e| {
            warn!(issuer, error = %e, "OpenID configuration is not a valid document");
            ResolveError::DiscoveryFetch(format!("{url} returned an invalid document: {e}"))
        })?;

        info!(issuer, jwks_uri = ?document.jwks_uri(), "resolved OpenID configuration");
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct RecordingFetcher {
        requested: Mutex<Vec<String>>,
        response: Option<Value>,
    }

    #[async_trait]
    impl DocumentFetcher for RecordingFetcher {
        async fn fetch_json(&self, url: &str) -> Result<Value, FetchError> {
            self.requested.lock().unwrap().push(url.to_string());
            self.response.clone().ok_or_else(|| FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
        }
    }

    #[test]
    fn test_discovery_url() {
        assert_eq!(
            discovery_url("https://token.actions.githubusercontent.com"),
            "https://token.actions.githubusercontent.com/.well-known/openid-configuration"
        );
    }

    #[tokio::test]
    async fn test_resolve_parses_and_caches() {
        let fetcher = Arc::new(RecordingFetcher {
            response: Some(json!({
                "issuer": "https://issuer.example",
                "jwks_uri": "https://issuer.example/.well-known/jwks",
                "subject_types_supported": ["public"],
            })),
            ..Default::default()
        });
        let resolver = DiscoveryResolver::new(fetcher.clone(), Arc::new(DocumentCache::default()));

        let doc = resolver.resolve("https://issuer.example").await.unwrap();
        resolver.resolve("https://issuer.example").await.unwrap();

        assert_eq!(doc.jwks_uri(), Some("https://issuer.example/.well-known/jwks"));
        assert!(doc.additional.contains_key("subject_types_supported"));
        assert_eq!(
            *fetcher.requested.lock().unwrap(),
            vec!["https://issuer.example/.well-known/openid-configuration".to_string()]
        );
    }

    #[tokio::test]
    async fn test_fetch_failure_maps_to_discovery_error() {
        let resolver = DiscoveryResolver::new(
            Arc::new(RecordingFetcher::default()),
            Arc::new(DocumentCache::default()),
        );

        let err = resolver.resolve("https://issuer.example").await.unwrap_err();
        assert!(matches!(err, ResolveError::DiscoveryFetch(_)));
    }

    #[tokio::test]
    async fn test_non_object_document_is_discovery_error() {
        let resolver = DiscoveryResolver::new(
            Arc::new(RecordingFetcher {
                response: Some(json!(["not", "an", "object"])),
                ..Default::default()
            }),
            Arc::new(DocumentCache::default()),
        );

        let err = resolver.resolve("https://issuer.example").await.unwrap_err();
        assert!(matches!(err, ResolveError::DiscoveryFetch(_)));
    }

    #[test]
    fn test_empty_jwks_uri_is_absent() {
        let doc: DiscoveryDocument = serde_json::from_value(json!({"jwks_uri": ""})).unwrap();
        assert_eq!(doc.jwks_uri(), None);
    }
}
