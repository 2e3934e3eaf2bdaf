//! HTTP routes
//!
//! | Method | Path | Response |
//! |--------|------|----------|
//! | `GET` | `/health` | `{"status": "ok"}` |
//! | `GET` | `/policies` | active policy configuration |
//! | `POST` | `/introspect` | verification result and policy tiers for a bearer token |
//!
//! `/introspect` answers 200 for every token it gets to look at, valid or not.
//! Only a missing or empty bearer credential is a 401.

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::response::Json;
use axum::routing::{get, post};
use ci_oidc_auth::jwt::{TokenVerifier, UnverifiedClaims, Verified, VerifiedClaims};
use ci_oidc_auth::policy::{PolicyResults, evaluate};
use ci_oidc_auth::{PolicyConfig, VerificationFailure};
use serde::Serialize;
use serde_json::{Value, json};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::error::ApiError;

/// Bodies are never read; anything larger is rejected early.
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Note returned alongside the policy configuration
pub const POLICIES_NOTE: &str = "Adjust with env vars (EXPECTED_REPOSITORY, ALLOWED_WORKFLOWS, \
     ALLOWED_EVENT_NAMES, ALLOWED_REF_REGEX, ALLOWED_AUDIENCES, ALLOWED_ENVIRONMENTS).";

/// Shared, immutable state of the HTTP surface
#[derive(Debug, Clone)]
pub struct AppState {
    /// Token verifier (shares its caches across requests)
    pub verifier: TokenVerifier,
    /// Policy configuration read at startup
    pub policy: Arc<PolicyConfig>,
}

impl AppState {
    /// Bundle a verifier and policy configuration
    pub fn new(verifier: TokenVerifier, policy: PolicyConfig) -> Self {
        Self {
            verifier,
            policy: Arc::new(policy),
        }
    }
}

/// Body of a `/introspect` response
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntrospectResponse {
    /// Whether the token verified
    pub ok: bool,
    /// `jwt_unverified_claims_failed: ...` or `jwt_decode_failed: ...`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Issuer the token was checked against
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    /// Untrusted claims of a rejected token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unverified: Option<UnverifiedClaims>,
    /// Trusted claims of a verified token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claims: Option<VerifiedClaims>,
    /// Policy tiers for a verified token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_results: Option<PolicyResults>,
}

impl IntrospectResponse {
    /// Response for a verified token
    pub fn verified(verified: Verified, policy_results: PolicyResults) -> Self {
        Self {
            ok: true,
            error: None,
            issuer: Some(verified.issuer),
            unverified: None,
            claims: Some(verified.claims),
            policy_results: Some(policy_results),
        }
    }

    /// Response for a rejected token
    ///
    /// A failure with no issuer never got past parsing the payload.
    pub fn rejected(failure: VerificationFailure) -> Self {
        let stage = if failure.issuer.is_some() {
            "jwt_decode_failed"
        } else {
            "jwt_unverified_claims_failed"
        };
        let error = format!("{stage}: {failure}");
        Self {
            ok: false,
            error: Some(error),
            issuer: failure.issuer,
            unverified: failure.unverified,
            claims: None,
            policy_results: None,
        }
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/policies", get(policies))
        .route("/introspect", post(introspect))
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn policies(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "expected": &*state.policy,
        "notes": POLICIES_NOTE,
    }))
}

async fn introspect(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<IntrospectResponse>, ApiError> {
    let token = bearer_token(&headers)?;

    let response = match state.verifier.verify(token).await {
        Ok(verified) => {
            let results = evaluate(&verified.claims, &state.policy);
            debug!(
                issuer = %verified.issuer,
                lax = results.lax.ok,
                strict = results.strict.ok,
                "policies evaluated"
            );
            IntrospectResponse::verified(verified, results)
        }
        Err(failure) => IntrospectResponse::rejected(failure),
    };

    Ok(Json(response))
}

/// Extract the token from `Authorization: Bearer <token>`
///
/// The scheme is matched case-insensitively and surrounding whitespace is
/// trimmed from the token.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let value = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::MissingBearer)?;

    let (scheme, rest) = value.split_once(' ').ok_or(ApiError::MissingBearer)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(ApiError::MissingBearer);
    }

    match rest.trim() {
        "" => Err(ApiError::EmptyBearer),
        token => Ok(token),
    }
}
