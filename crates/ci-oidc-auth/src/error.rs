//! Error taxonomy for token verification
//!
//! Failures are split by the layer that produces them:
//!
//! - [`FetchError`] - a single outbound HTTP document fetch
//! - [`ResolveError`] - issuer metadata resolution (discovery document, JWKS)
//! - [`VerifyError`] - the closed set of verification outcomes callers match on
//! - [`ConfigError`] - startup configuration problems
//!
//! A [`VerificationFailure`] is what the verifier hands back when a token is rejected.
//! It is a stable value describing the rejection, never a fault.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::jwt::UnverifiedClaims;

/// Result type for verification operations
pub type VerifyResult<T> = std::result::Result<T, VerifyError>;

/// Outbound document fetch errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Transport-level failure (DNS, connect, TLS, timeout)
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    /// Endpoint answered with a non-2xx status
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// Body was not a JSON document
    #[error("{url} returned invalid JSON: {message}")]
    InvalidJson { url: String, message: String },
}

/// Issuer metadata resolution errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    /// The OpenID configuration document could not be retrieved or parsed
    #[error("DiscoveryFetchError: {0}")]
    DiscoveryFetch(String),

    /// The discovery document carries no usable `jwks_uri`
    #[error("MissingJwksUri: no jwks_uri in discovery document for {issuer}")]
    MissingJwksUri { issuer: String },

    /// The key set document could not be retrieved or parsed
    #[error("KeySetFetchError: {0}")]
    KeySetFetch(String),
}

/// Stable, matchable classification of a [`VerifyError`]
///
/// The `Display` form is the wire name used in introspection error strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// Token structure could not be parsed
    MalformedToken,
    /// Discovery or key set retrieval failed
    KeySetUnavailable,
    /// Token header declares an algorithm outside the allow-list
    AlgorithmNotAllowed,
    /// No key in the set matches the token's `kid`
    KeyNotFound,
    /// Signature, time window or issuer check failed
    SignatureOrClaimInvalid,
}

impl ErrorKind {
    /// Wire name of this kind
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MalformedToken => "MalformedToken",
            Self::KeySetUnavailable => "KeySetUnavailable",
            Self::AlgorithmNotAllowed => "AlgorithmNotAllowed",
            Self::KeyNotFound => "KeyNotFound",
            Self::SignatureOrClaimInvalid => "SignatureOrClaimInvalid",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token verification errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum VerifyError {
    /// The token is not three base64url JSON segments
    #[error("{0}")]
    MalformedToken(String),

    /// Issuer metadata or keys could not be obtained
    #[error("{0}")]
    KeySetUnavailable(#[from] ResolveError),

    /// Declared `alg` is not allowed
    #[error("alg_not_allowed: {0}")]
    AlgorithmNotAllowed(String),

    /// Declared `kid` is absent or not in the key set
    #[error("kid_not_found: {0}")]
    KeyNotFound(String),

    /// Cryptographic or registered-claim validation failed
    #[error("{0}")]
    SignatureOrClaimInvalid(String),
}

impl VerifyError {
    /// Create a malformed token error
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedToken(message.into())
    }

    /// Create a signature/claim validation error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::SignatureOrClaimInvalid(message.into())
    }

    /// Classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedToken(_) => ErrorKind::MalformedToken,
            Self::KeySetUnavailable(_) => ErrorKind::KeySetUnavailable,
            Self::AlgorithmNotAllowed(_) => ErrorKind::AlgorithmNotAllowed,
            Self::KeyNotFound(_) => ErrorKind::KeyNotFound,
            Self::SignatureOrClaimInvalid(_) => ErrorKind::SignatureOrClaimInvalid,
        }
    }
}

/// A rejected token, with whatever context was gathered before rejection
///
/// `unverified` holds the claims read before any signature check. They are
/// reported for debugging and must never be treated as trusted.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{}: {error}", error.kind())]
pub struct VerificationFailure {
    /// Why the token was rejected
    pub error: VerifyError,
    /// Issuer the verifier resolved, if it got that far
    pub issuer: Option<String>,
    /// Claims read without verification, if the payload parsed
    pub unverified: Option<UnverifiedClaims>,
}

impl VerificationFailure {
    /// Failure before the payload could be read
    pub fn malformed(error: VerifyError) -> Self {
        Self {
            error,
            issuer: None,
            unverified: None,
        }
    }

    /// Failure after the issuer was resolved
    pub fn after_issuer(error: VerifyError, issuer: String, unverified: UnverifiedClaims) -> Self {
        Self {
            error,
            issuer: Some(issuer),
            unverified: Some(unverified),
        }
    }

    /// Classification of the underlying error
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

/// Startup configuration errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// `ALLOWED_REF_REGEX` does not compile
    #[error("invalid ref pattern {pattern:?}: {reason}")]
    InvalidRefPattern { pattern: String, reason: String },

    /// A configured URL is not a valid absolute URL
    #[error("invalid URL for {field}: {reason}")]
    InvalidUrl { field: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_wire_names() {
        assert_eq!(VerifyError::malformed("x").kind().to_string(), "MalformedToken");
        assert_eq!(
            VerifyError::AlgorithmNotAllowed("HS256".into()).to_string(),
            "alg_not_allowed: HS256"
        );
        assert_eq!(
            VerifyError::KeyNotFound("C".into()).kind(),
            ErrorKind::KeyNotFound
        );
    }

    #[test]
    fn test_key_set_unavailable_keeps_discovery_cause() {
        let err = VerifyError::from(ResolveError::DiscoveryFetch(
            "https://issuer/.well-known/openid-configuration returned HTTP 404".into(),
        ));

        assert_eq!(err.kind(), ErrorKind::KeySetUnavailable);
        assert!(err.to_string().starts_with("DiscoveryFetchError: "));
    }

    #[test]
    fn test_failure_display_prefixes_kind() {
        let failure = VerificationFailure::malformed(VerifyError::malformed("not enough segments"));
        assert_eq!(failure.to_string(), "MalformedToken: not enough segments");
        assert!(failure.issuer.is_none());
    }
}
