//! End-to-end verification against a mock issuer
//!
//! Every test runs the full pipeline over HTTP: discovery document, key set,
//! key selection, signature and claim validation, then policy evaluation.

mod common;

use std::time::Duration;

use ci_oidc_auth::config::{PolicyConfig, VerifierConfig};
use ci_oidc_auth::error::{ErrorKind, ResolveError, VerifyError};
use ci_oidc_auth::policy::evaluate;
use common::{
    DISCOVERY_PATH, JWKS_PATH, MockIssuer, PRIMARY_KID, TestSigner, ci_claims, current_timestamp,
    published_issuer, verifier, verifier_with,
};
use pretty_assertions::assert_eq;
use serde_json::json;

#[tokio::test]
async fn test_push_to_main_passes_strict() {
    // GIVEN: an issuer publishing our key and a token for a push to main
    let (issuer, signer) = published_issuer().await;
    let token = signer.sign(&ci_claims(&issuer.issuer()));

    // WHEN: verifying and evaluating with the default policy
    let verified = verifier().verify(&token).await.expect("token should verify");
    let results = evaluate(&verified.claims, &PolicyConfig::default());

    // THEN: every tier passes
    assert_eq!(verified.issuer, issuer.issuer());
    assert!(results.strict.ok);
    assert!(results.strict.reasons.is_empty());
    assert!(results.lax.ok);
    assert!(results.strict_plus.ok);
}

#[tokio::test]
async fn test_feature_branch_is_verified_but_rejected_by_strict() {
    let (issuer, signer) = published_issuer().await;
    let mut claims = ci_claims(&issuer.issuer());
    claims["ref"] = json!("refs/heads/feature-x");

    let verified = verifier().verify(&signer.sign(&claims)).await.unwrap();
    let results = evaluate(&verified.claims, &PolicyConfig::default());

    // Cryptographically valid, policy-rejected: both facts are visible.
    assert!(!results.strict.ok);
    assert_eq!(results.strict.reasons, vec!["ref_not_allowed: refs/heads/feature-x"]);
    assert!(results.lax.ok);
}

#[tokio::test]
async fn test_missing_iss_falls_back_to_unreachable_default_issuer() {
    // GIVEN: the default issuer points at a port nothing listens on
    let default_issuer = "http://127.0.0.1:9";
    let verifier = verifier_with(
        VerifierConfig::default()
            .with_default_issuer(default_issuer)
            .unwrap()
            .with_fetch_timeout(Duration::from_secs(2)),
    );
    let mut claims = ci_claims("ignored");
    claims.as_object_mut().unwrap().remove("iss");

    // WHEN
    let failure = verifier
        .verify(&TestSigner::primary().sign(&claims))
        .await
        .unwrap_err();

    // THEN: a structured key-set failure naming the default issuer
    assert_eq!(failure.kind(), ErrorKind::KeySetUnavailable);
    assert_eq!(failure.issuer.as_deref(), Some(default_issuer));
    assert!(
        failure.to_string().starts_with("KeySetUnavailable: DiscoveryFetchError: "),
        "{failure}"
    );
    assert_eq!(failure.unverified.unwrap()["event_name"], "push");
}

#[tokio::test]
async fn test_token_signed_by_unpublished_key() {
    let (issuer, _) = published_issuer().await;
    let forged = TestSigner::rogue().sign(&ci_claims(&issuer.issuer()));

    let failure = verifier().verify(&forged).await.unwrap_err();

    assert_eq!(failure.kind(), ErrorKind::SignatureOrClaimInvalid);
    assert_eq!(failure.issuer, Some(issuer.issuer()));
}

#[tokio::test]
async fn test_expired_token() {
    let (issuer, signer) = published_issuer().await;
    let mut claims = ci_claims(&issuer.issuer());
    claims["exp"] = json!(current_timestamp() - 3600);

    let failure = verifier().verify(&signer.sign(&claims)).await.unwrap_err();

    assert_eq!(failure.error, VerifyError::invalid("token has expired"));
}

#[tokio::test]
async fn test_not_yet_valid_token() {
    let (issuer, signer) = published_issuer().await;
    let mut claims = ci_claims(&issuer.issuer());
    claims["nbf"] = json!(current_timestamp() + 3600);

    let failure = verifier().verify(&signer.sign(&claims)).await.unwrap_err();

    assert_eq!(failure.kind(), ErrorKind::SignatureOrClaimInvalid);
}

#[tokio::test]
async fn test_issuer_claim_must_match_resolved_issuer() {
    // GIVEN: an empty `iss`, so the default issuer (our mock) is used for key lookup
    let (issuer, signer) = published_issuer().await;
    let verifier = verifier_with(
        VerifierConfig::default()
            .with_default_issuer(issuer.issuer())
            .unwrap(),
    );
    let mut claims = ci_claims(&issuer.issuer());
    claims["iss"] = json!("");

    // WHEN
    let failure = verifier.verify(&signer.sign(&claims)).await.unwrap_err();

    // THEN: the key is found and the signature is fine, but `iss` does not match
    assert_eq!(failure.error, VerifyError::invalid("issuer does not match"));
    assert_eq!(failure.issuer, Some(issuer.issuer()));
}

#[tokio::test]
async fn test_unknown_kid() {
    let (issuer, _) = published_issuer().await;
    let token = TestSigner::primary()
        .with_kid("retired-key")
        .sign(&ci_claims(&issuer.issuer()));

    let failure = verifier().verify(&token).await.unwrap_err();

    assert_eq!(failure.error, VerifyError::KeyNotFound("retired-key".into()));
}

#[tokio::test]
async fn test_null_key_list_means_no_matching_key() {
    // GIVEN: an issuer whose JWKS has `"keys": null`
    let issuer = MockIssuer::publishing(json!({ "keys": null })).await;
    let token = TestSigner::primary().sign(&ci_claims(&issuer.issuer()));

    // WHEN: verifying a token against it
    let failure = verifier().verify(&token).await.unwrap_err();

    // THEN: the key set was fetched fine, it just holds no key for this kid
    assert_eq!(failure.kind(), ErrorKind::KeyNotFound);
    assert_eq!(failure.error, VerifyError::KeyNotFound(PRIMARY_KID.into()));
}

#[tokio::test]
async fn test_key_rotation_picks_new_kid() {
    // GIVEN: the issuer publishes both the old and the new key
    let old = TestSigner::primary().with_kid("2024-key");
    let new = TestSigner::primary().with_kid("2025-key");
    let issuer = MockIssuer::publishing(json!({ "keys": [old.jwk(), new.jwk()] })).await;

    // THEN: tokens from either key verify
    let verifier = verifier();
    for signer in [&new, &old] {
        let verified = verifier
            .verify(&signer.sign(&ci_claims(&issuer.issuer())))
            .await
            .unwrap();
        assert_eq!(verified.kid, signer.kid());
    }
}

#[tokio::test]
async fn test_discovery_and_jwks_are_cached() {
    let (issuer, signer) = published_issuer().await;
    let verifier = verifier();

    for _ in 0..3 {
        verifier
            .verify(&signer.sign(&ci_claims(&issuer.issuer())))
            .await
            .unwrap();
    }

    assert_eq!(issuer.hits(DISCOVERY_PATH).await, 1);
    assert_eq!(issuer.hits(JWKS_PATH).await, 1);
}

#[tokio::test]
async fn test_discovery_without_jwks_uri() {
    let issuer = MockIssuer::start().await;
    issuer
        .mount_discovery(json!({ "issuer": issuer.issuer() }))
        .await;

    let token = TestSigner::primary().sign(&ci_claims(&issuer.issuer()));
    let failure = verifier().verify(&token).await.unwrap_err();

    assert_eq!(
        failure.error,
        VerifyError::KeySetUnavailable(ResolveError::MissingJwksUri {
            issuer: issuer.issuer()
        })
    );
}

#[tokio::test]
async fn test_jwks_endpoint_failure_is_retried_on_next_call() {
    // GIVEN: the key set endpoint is down
    let issuer = MockIssuer::start().await;
    issuer.mount_discovery(issuer.discovery_document()).await;
    issuer.mount_status(JWKS_PATH, 503).await;

    let signer = TestSigner::primary();
    let verifier = verifier();
    let token = signer.sign(&ci_claims(&issuer.issuer()));

    let failure = verifier.verify(&token).await.unwrap_err();
    assert!(matches!(
        failure.error,
        VerifyError::KeySetUnavailable(ResolveError::KeySetFetch(_))
    ));

    // WHEN: it recovers
    issuer.server.reset().await;
    issuer.mount_discovery(issuer.discovery_document()).await;
    issuer.mount_jwks(signer.jwks()).await;

    // THEN: the failure was not cached
    assert!(verifier.verify(&token).await.is_ok());
}

#[tokio::test]
async fn test_garbage_token_is_malformed() {
    let failure = verifier().verify("definitely.not.a-jwt").await.unwrap_err();

    assert_eq!(failure.kind(), ErrorKind::MalformedToken);
    assert!(failure.issuer.is_none());
}
