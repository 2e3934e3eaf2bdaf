//! JWKS (JSON Web Key Set) resolution and caching
//!
//! The key set of an issuer is located through its discovery document's
//! `jwks_uri` and cached per issuer, in a cache separate from the discovery
//! documents but with the same TTL policy.
//!
//! Keys are kept as raw JSON. A key set may contain entries this service
//! cannot use (other key types, garbage); those only matter if a token
//! actually names them, so parsing is deferred to key selection.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::cache::DocumentCache;
use crate::discovery::{DiscoveryDocument, DiscoveryResolver};
use crate::error::ResolveError;
use crate::fetch::DocumentFetcher;

/// A published JSON Web Key Set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeySet {
    /// Keys in publication order
    ///
    /// A `keys` member that is missing, `null` or not an array reads as empty.
    #[serde(default, deserialize_with = "keys_or_empty")]
    pub keys: Vec<Value>,
}

fn keys_or_empty<'de, D>(deserializer: D) -> Result<Vec<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(keys) => keys,
        _ => Vec::new(),
    })
}

impl KeySet {
    /// Number of published entries
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the set has no entries
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Resolves issuers to their current signing key sets
///
/// # Example
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use ci_oidc_auth::cache::DocumentCache;
/// # use ci_oidc_auth::discovery::DiscoveryResolver;
/// # use ci_oidc_auth::fetch::HttpDocumentFetcher;
/// # use ci_oidc_auth::jwt::KeySetResolver;
/// # tokio_test::block_on(async {
/// let discovery = DiscoveryResolver::new(
///     Arc::new(HttpDocumentFetcher::new()?),
///     Arc::new(DocumentCache::default()),
/// );
/// let resolver = KeySetResolver::new(discovery, Arc::new(DocumentCache::default()));
///
/// let keys = resolver
///     .resolve("https://token.actions.githubusercontent.com")
///     .await?;
/// println!("{} keys published", keys.len());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct KeySetResolver {
    discovery: DiscoveryResolver,
    cache: Arc<DocumentCache<KeySet>>,
}

impl KeySetResolver {
    /// Create a resolver on top of a discovery resolver and a key set cache
    pub fn new(discovery: DiscoveryResolver, cache: Arc<DocumentCache<KeySet>>) -> Self {
        Self { discovery, cache }
    }

    /// The discovery resolver used to locate `jwks_uri`
    pub fn discovery(&self) -> &DiscoveryResolver {
        &self.discovery
    }

    /// The key set cache
    pub fn cache(&self) -> &Arc<DocumentCache<KeySet>> {
        &self.cache
    }

    /// Return the issuer's key set, from cache when fresh
    ///
    /// # Errors
    ///
    /// - Discovery failures are returned unchanged
    /// - [`ResolveError::MissingJwksUri`] if the discovery document has no `jwks_uri`
    /// - [`ResolveError::KeySetFetch`] if the key set cannot be retrieved or parsed
    #[tracing::instrument(skip(self))]
    pub async fn resolve(&self, issuer: &str) -> Result<KeySet, ResolveError> {
        self.cache
            .get_or_fetch(issuer, || self.fetch(issuer))
            .await
    }

    async fn fetch(&self, issuer: &str) -> Result<KeySet, ResolveError> {
        let discovery = self.discovery.resolve(issuer).await?;

        let jwks_uri = discovery.jwks_uri().ok_or_else(|| {
            warn!(issuer, "discovery document has no jwks_uri");
            ResolveError::MissingJwksUri {
                issuer: issuer.to_string(),
            }
        })?;

        let raw = self
            .discovery
            .fetcher()
            .fetch_json(jwks_uri)
            .await
            .map_err(|e| {
                warn!(issuer, jwks_uri, error = %e, "JWKS fetch failed");
                ResolveError::KeySetFetch(e.to_string())
            })?;

        let key_set: KeySet = serde_json::from_value(raw).map_err(|e| {
            warn!(issuer, jwks_uri, error = %e, "JWKS document is malformed");
            ResolveError::KeySetFetch(format!("{jwks_uri} returned an invalid key set: {e}"))
        })?;

        info!(
            issuer,
            jwks_uri,
            key_count = key_set.len(),
            "Successfully fetched JWKS"
        );

        Ok(key_set)
    }
}

/// The per-issuer caches a verifier depends on
///
/// Discovery documents and key sets live in separate caches with the same TTL.
/// Construct once and hand clones to every resolver that should share them.
#[derive(Debug, Clone, Default)]
pub struct IssuerMetadata {
    /// Discovery documents by issuer
    pub discovery: Arc<DocumentCache<DiscoveryDocument>>,
    /// Key sets by issuer
    pub key_sets: Arc<DocumentCache<KeySet>>,
}

impl IssuerMetadata {
    /// Empty caches with the given TTL
    pub fn new(ttl: Duration) -> Self {
        Self {
            discovery: Arc::new(DocumentCache::new(ttl)),
            key_sets: Arc::new(DocumentCache::new(ttl)),
        }
    }

    /// Build a key set resolver over these caches
    pub fn resolver(&self, fetcher: Arc<dyn DocumentFetcher>) -> KeySetResolver {
        KeySetResolver::new(
            DiscoveryResolver::new(fetcher, Arc::clone(&self.discovery)),
            Arc::clone(&self.key_sets),
        )
    }
}
