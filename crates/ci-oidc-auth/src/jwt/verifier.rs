//! Token verification pipeline
//!
//! ```text
//! Received ──► ClaimsParsed ──► IssuerResolved ──► KeysFetched ──► Verified
//!     │              │                 │                │
//!     └──────────────┴─────────────────┴────────────────┴──► Failed
//! ```
//!
//! Every failure is returned as a [`VerificationFailure`] value. Once the
//! payload has been read, the failure also carries the resolved issuer and the
//! unverified claims for debugging.

use std::str::FromStr;
use std::sync::Arc;

use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::selector::{SigningKey, select_key_allowing};
use super::{IssuerMetadata, KeySetResolver, UnverifiedClaims, VerifiedClaims};
use super::{peek_claims, peek_header};
use crate::config::VerifierConfig;
use crate::error::{FetchError, VerificationFailure, VerifyError, VerifyResult};
use crate::fetch::HttpDocumentFetcher;

/// A token that passed signature, time window and issuer checks
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verified {
    /// Issuer the token was verified against
    pub issuer: String,
    /// Key identifier of the signing key
    pub kid: String,
    /// Trusted claims
    pub claims: VerifiedClaims,
}

/// Verifies CI identity tokens against their issuer's published keys
///
/// Cheap to clone; clones share caches and configuration.
///
/// # Example
///
/// ```rust,no_run
/// use ci_oidc_auth::config::VerifierConfig;
/// use ci_oidc_auth::jwt::TokenVerifier;
///
/// # tokio_test::block_on(async {
/// let verifier = TokenVerifier::from_config(VerifierConfig::default())?;
///
/// match verifier.verify("eyJhbGciOi...").await {
///     Ok(verified) => println!("repository: {:?}", verified.claims.repository),
///     Err(failure) => println!("rejected: {failure}"),
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    config: Arc<VerifierConfig>,
    key_sets: KeySetResolver,
}

impl TokenVerifier {
    /// Create a verifier over an existing key set resolver
    pub fn new(config: VerifierConfig, key_sets: KeySetResolver) -> Self {
        Self {
            config: Arc::new(config),
            key_sets,
        }
    }

    /// Create a verifier with an HTTP fetcher and fresh caches
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Transport`] if the HTTP client cannot be built.
    pub fn from_config(config: VerifierConfig) -> Result<Self, FetchError> {
        let fetcher = HttpDocumentFetcher::with_timeout(config.fetch_timeout)?;
        let metadata = IssuerMetadata::new(config.cache_ttl);
        let key_sets = metadata.resolver(Arc::new(fetcher));
        Ok(Self::new(config, key_sets))
    }

    /// Verification settings
    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Key set resolver (and through it, the caches)
    pub fn key_sets(&self) -> &KeySetResolver {
        &self.key_sets
    }

    /// Issuer to verify against: the token's `iss`, or the configured default
    ///
    /// A missing, empty or non-string `iss` falls back to the default issuer.
    pub fn issuer_for(&self, claims: &UnverifiedClaims) -> String {
        match claims.get("iss").and_then(Value::as_str) {
            Some(iss) if !iss.is_empty() => iss.to_string(),
            _ => {
                warn!(
                    default_issuer = %self.config.default_issuer,
                    "token has no iss claim; falling back to the default issuer"
                );
                self.config.default_issuer.clone()
            }
        }
    }

    /// Verify `token` and return its trusted claims
    ///
    /// # Errors
    ///
    /// Returns a [`VerificationFailure`] describing the rejection:
    ///
    /// - `MalformedToken` if the token cannot be parsed (no issuer attached)
    /// - `KeySetUnavailable` if discovery or the key set fetch fails
    /// - `AlgorithmNotAllowed` / `KeyNotFound` from key selection
    /// - `SignatureOrClaimInvalid` if the signature, `exp`, `nbf` or `iss` check fails
    #[tracing::instrument(skip_all, fields(issuer = tracing::field::Empty))]
    pub async fn verify(&self, token: &str) -> Result<Verified, VerificationFailure> {
        let (header, unverified) = match peek_header(token)
            .and_then(|header| Ok((header, peek_claims(token)?)))
        {
            Ok(parsed) => parsed,
            Err(error) => {
                debug!(error = %error, "token could not be parsed");
                return Err(VerificationFailure::malformed(error));
            }
        };

        let issuer = self.issuer_for(&unverified);
        tracing::Span::current().record("issuer", issuer.as_str());

        let outcome = async {
            let key_set = self.key_sets.resolve(&issuer).await?;
            let key = select_key_allowing(&key_set, &header, &self.config.allowed_algorithms)?;
            self.decode(token, &issuer, &key)
        }
        .await;

        match outcome {
            Ok(claims) => {
                info!(issuer = %issuer, repository = ?claims.repository, "token verified");
                Ok(Verified {
                    issuer,
                    kid: header.kid.unwrap_or_default(),
                    claims,
                })
            }
            Err(error) => {
                warn!(issuer = %issuer, kind = %error.kind(), error = %error, "token rejected");
                Err(VerificationFailure::after_issuer(error, issuer, unverified))
            }
        }
    }

    /// Signature, time window and issuer check under the selected key
    fn decode(&self, token: &str, issuer: &str, key: &SigningKey) -> VerifyResult<VerifiedClaims> {
        let algorithm = Algorithm::from_str(&key.alg)
            .map_err(|_| VerifyError::AlgorithmNotAllowed(key.alg.clone()))?;

        let decoding_key = DecodingKey::from_jwk(&key.jwk).map_err(|e| {
            VerifyError::invalid(format!("unusable signing key {}: {e}", key.kid))
        })?;

        // Audience belongs to the policy tiers, not to verification.
        let mut validation = Validation::new(algorithm);
        validation.validate_aud = false;
        validation.validate_nbf = true;
        validation.set_issuer(&[issuer]);
        validation.set_required_spec_claims(&["exp", "iss"]);
        validation.leeway = self.config.clock_skew_leeway.as_secs();

        // Claim types are not part of verification; see `VerifiedClaims::from`.
        decode::<Map<String, Value>>(token, &decoding_key, &validation)
            .map(|data| VerifiedClaims::from(data.claims))
            .map_err(describe)
    }
}

fn describe(err: jsonwebtoken::errors::Error) -> VerifyError {
    let message = match err.kind() {
        JwtErrorKind::InvalidSignature => "signature verification failed".to_string(),
        JwtErrorKind::ExpiredSignature => "token has expired".to_string(),
        JwtErrorKind::ImmatureSignature => "token is not yet valid (nbf)".to_string(),
        JwtErrorKind::InvalidIssuer => "issuer does not match".to_string(),
        JwtErrorKind::MissingRequiredClaim(claim) => {
            format!("token is missing required claim: {claim}")
        }
        _ => err.to_string(),
    };
    VerifyError::invalid(message)
}
