//! Common test utilities for integration tests
//!
//! Re-exports the crate's fixtures and adds helpers for building verifiers
//! against a [`MockIssuer`].

#![allow(dead_code)]

pub use ci_oidc_auth::testutil::*;

use ci_oidc_auth::config::VerifierConfig;
use ci_oidc_auth::jwt::TokenVerifier;

/// Verifier with default settings and fresh caches
pub fn verifier() -> TokenVerifier {
    verifier_with(VerifierConfig::default())
}

/// Verifier with custom settings and fresh caches
pub fn verifier_with(config: VerifierConfig) -> TokenVerifier {
    TokenVerifier::from_config(config).expect("failed to build HTTP client")
}

/// Start an issuer publishing the primary signer's key
pub async fn published_issuer() -> (MockIssuer, TestSigner) {
    let signer = TestSigner::primary();
    let issuer = MockIssuer::publishing(signer.jwks()).await;
    (issuer, signer)
}
