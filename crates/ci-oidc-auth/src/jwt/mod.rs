//! JWT handling for CI identity tokens
//!
//! ```text
//! token ──► peek (header, unverified claims) ──► issuer
//!                                                 │
//!              KeySetResolver ◄───────────────────┘
//!                    │
//!              select_key(header) ──► jsonwebtoken::decode ──► VerifiedClaims
//! ```
//!
//! # Modules
//!
//! - `jwks` - key set resolution through the issuer's discovery document
//! - `selector` - picking the signing key for a token header
//! - `verifier` - the verification pipeline

pub mod jwks;
pub mod selector;
pub mod verifier;

pub use jwks::{IssuerMetadata, KeySet, KeySetResolver};
pub use selector::{ALLOWED_ALGORITHMS, SigningKey, select_key, select_key_allowing};
pub use verifier::{TokenVerifier, Verified};

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{VerifyError, VerifyResult};

/// Claims read from a token payload without any trust guarantee
///
/// Used to discover the issuer and reported back on failure. Never an input
/// to policy evaluation.
pub type UnverifiedClaims = Map<String, Value>;

/// Unverified JOSE header fields the key selector needs
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TokenHeader {
    /// Declared signing algorithm
    #[serde(default)]
    pub alg: Option<String>,
    /// Declared key identifier
    #[serde(default)]
    pub kid: Option<String>,
}

/// The `aud` claim, which may be a single string or an array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    /// `"aud": "x"`
    One(String),
    /// `"aud": ["x", "y"]`; non-string members are ignored
    Many(Vec<Value>),
    /// Any other JSON shape
    Other(Value),
}

impl Audience {
    fn from_claim(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::String(aud) => Some(Self::One(aud.clone())),
            Value::Array(auds) => Some(Self::Many(auds.clone())),
            other => Some(Self::Other(other.clone())),
        }
    }

    /// Audience values as strings, in token order
    pub fn values(&self) -> Vec<&str> {
        match self {
            Self::One(aud) => vec![aud.as_str()],
            Self::Many(auds) => auds.iter().filter_map(Value::as_str).collect(),
            Self::Other(_) => Vec::new(),
        }
    }
}

/// Claims of a token whose signature, time window and issuer were verified
///
/// The CI-context claims the policy engine reads are typed fields; every other
/// claim is carried in `additional` so the full claim set round-trips.
///
/// Deserialization never fails on claim types: a typed claim whose value has
/// the wrong JSON type stays in `additional` under its own name, where the
/// policy tiers still see (and report) it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>")]
pub struct VerifiedClaims {
    /// Issuer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Subject
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Audience
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,
    /// Expiration time (Unix seconds)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,
    /// Not before (Unix seconds)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nbf: Option<u64>,
    /// Issued at (Unix seconds)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,

    /// `owner/name` of the repository the workflow ran in
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    /// Event that triggered the workflow (`push`, `workflow_dispatch`, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_name: Option<String>,
    /// Git ref the workflow ran on
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<String>,
    /// Workflow definition that requested the token (reusable workflows)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_workflow_ref: Option<String>,
    /// Workflow definition of the calling workflow
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_ref: Option<String>,
    /// Deployment environment, when the job targets one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,

    /// Every other claim, untouched
    #[serde(flatten)]
    pub additional: Map<String, Value>,
}

impl From<Map<String, Value>> for VerifiedClaims {
    fn from(mut raw: Map<String, Value>) -> Self {
        let string = |v: &Value| v.as_str().map(str::to_string);
        Self {
            iss: take(&mut raw, "iss", string),
            sub: take(&mut raw, "sub", string),
            aud: take(&mut raw, "aud", Audience::from_claim),
            exp: take(&mut raw, "exp", Value::as_u64),
            nbf: take(&mut raw, "nbf", Value::as_u64),
            iat: take(&mut raw, "iat", Value::as_u64),
            repository: take(&mut raw, "repository", string),
            event_name: take(&mut raw, "event_name", string),
            git_ref: take(&mut raw, "ref", string),
            job_workflow_ref: take(&mut raw, "job_workflow_ref", string),
            workflow_ref: take(&mut raw, "workflow_ref", string),
            environment: take(&mut raw, "environment", string),
            additional: raw,
        }
    }
}

/// Move `key` out of `raw` if `convert` accepts its value; otherwise leave it
fn take<T>(
    raw: &mut Map<String, Value>,
    key: &str,
    convert: impl Fn(&Value) -> Option<T>,
) -> Option<T> {
    let value = raw.get(key).and_then(convert)?;
    raw.remove(key);
    Some(value)
}

impl VerifiedClaims {
    /// A claim that did not fit its typed field, as carried in `additional`
    pub fn untyped(&self, name: &str) -> Option<&Value> {
        self.additional.get(name)
    }

    /// `job_workflow_ref`, falling back to `workflow_ref`
    pub fn effective_workflow_ref(&self) -> Option<&str> {
        self.job_workflow_ref
            .as_deref()
            .filter(|r| !r.is_empty())
            .or_else(|| self.workflow_ref.as_deref().filter(|r| !r.is_empty()))
    }

    /// Normalised audience list (empty when `aud` is absent or unusable)
    pub fn audiences(&self) -> Vec<&str> {
        self.aud.as_ref().map(Audience::values).unwrap_or_default()
    }
}

/// Split a compact JWS into its three segments
fn segments(token: &str) -> VerifyResult<[&str; 3]> {
    let mut parts = token.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(header), Some(payload), Some(signature), None) => Ok([header, payload, signature]),
        _ => Err(VerifyError::malformed(
            "token must have exactly three dot-separated segments",
        )),
    }
}

/// Decode one base64url segment into a JSON object
fn decode_segment<T: serde::de::DeserializeOwned>(segment: &str, what: &str) -> VerifyResult<T> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|e| VerifyError::malformed(format!("invalid {what} encoding: {e}")))?;

    serde_json::from_slice(&bytes)
        .map_err(|e| VerifyError::malformed(format!("invalid {what} JSON: {e}")))
}

/// Read the JOSE header without verifying anything
///
/// # Errors
///
/// Returns [`VerifyError::MalformedToken`] if the token does not have three
/// segments or the header is not a base64url JSON object.
pub fn peek_header(token: &str) -> VerifyResult<TokenHeader> {
    let [header, _, _] = segments(token)?;
    decode_segment(header, "header")
}

/// Read the payload claims without verifying anything
///
/// # Errors
///
/// Returns [`VerifyError::MalformedToken`] if the token does not have three
/// segments or the payload is not a base64url JSON object.
pub fn peek_claims(token: &str) -> VerifyResult<UnverifiedClaims> {
    let [_, payload, _] = segments(token)?;
    decode_segment(payload, "payload")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn encode(value: &Value) -> String {
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(value).unwrap())
    }

    fn token(header: &Value, claims: &Value) -> String {
        format!("{}.{}.c2ln", encode(header), encode(claims))
    }

    #[test]
    fn test_peek_header_and_claims() {
        let t = token(
            &json!({"alg": "RS256", "kid": "k1", "typ": "JWT"}),
            &json!({"iss": "https://issuer.example", "ref": "refs/heads/main"}),
        );

        let header = peek_header(&t).unwrap();
        assert_eq!(header.alg.as_deref(), Some("RS256"));
        assert_eq!(header.kid.as_deref(), Some("k1"));

        let claims = peek_claims(&t).unwrap();
        assert_eq!(claims["iss"], "https://issuer.example");
    }

    #[test]
    fn test_garbage_is_malformed() {
        for bad in ["", "abc", "a.b", "a.b.c.d", "!!!.###.$$$"] {
            let err = peek_claims(bad).unwrap_err();
            assert!(
                matches!(err, VerifyError::MalformedToken(_)),
                "{bad:?} -> {err:?}"
            );
        }
    }

    #[test]
    fn test_non_object_payload_is_malformed() {
        let t = format!("{}.{}.sig", encode(&json!({"alg": "RS256"})), encode(&json!([1, 2])));
        assert!(matches!(
            peek_claims(&t),
            Err(VerifyError::MalformedToken(_))
        ));
    }

    #[test]
    fn test_audience_normalisation() {
        let one: Audience = serde_json::from_value(json!("ci-oidc-lab")).unwrap();
        assert_eq!(one.values(), vec!["ci-oidc-lab"]);

        let many: Audience = serde_json::from_value(json!(["a", 7, "b"])).unwrap();
        assert_eq!(many.values(), vec!["a", "b"]);

        let other: Audience = serde_json::from_value(json!({"x": 1})).unwrap();
        assert!(other.values().is_empty());
    }

    #[test]
    fn test_verified_claims_keep_unknown_fields() {
        let raw = json!({
            "iss": "https://issuer.example",
            "aud": ["a", "ci-oidc-lab"],
            "ref": "refs/heads/main",
            "workflow_ref": "o/r/.github/workflows/ci.yml@refs/heads/main",
            "runner_environment": "github-hosted",
        });

        let claims: VerifiedClaims = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(claims.git_ref.as_deref(), Some("refs/heads/main"));
        assert_eq!(claims.audiences(), vec!["a", "ci-oidc-lab"]);
        assert_eq!(
            claims.effective_workflow_ref(),
            Some("o/r/.github/workflows/ci.yml@refs/heads/main")
        );
        assert_eq!(claims.additional["runner_environment"], "github-hosted");
        assert_eq!(serde_json::to_value(&claims).unwrap(), raw);
    }

    #[test]
    fn test_mistyped_claims_stay_untyped() {
        let raw = json!({
            "iss": "https://issuer.example",
            "environment": 7,
            "ref": ["refs/heads/main"],
            "exp": "soon",
            "aud": null,
            "repository": "octo-org/octo-repo",
        });

        let claims: VerifiedClaims = serde_json::from_value(raw.clone()).unwrap();

        assert_eq!(claims.environment, None);
        assert_eq!(claims.untyped("environment"), Some(&json!(7)));
        assert_eq!(claims.git_ref, None);
        assert_eq!(claims.untyped("ref"), Some(&json!(["refs/heads/main"])));
        assert_eq!(claims.exp, None);
        assert!(claims.aud.is_none());
        assert_eq!(claims.repository.as_deref(), Some("octo-org/octo-repo"));
        assert_eq!(serde_json::to_value(&claims).unwrap(), raw);
    }
}
