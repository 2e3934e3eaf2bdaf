//! Test fixtures for CI identity tokens
//!
//! - [`TestSigner`] mints RS256 tokens from fixture RSA keys and publishes the
//!   matching JWK
//! - [`MockIssuer`] is a wiremock-backed OIDC issuer serving a discovery
//!   document and a key set
//! - [`ci_claims`] builds a realistic claim set for a push to `main`
//!
//! Enabled with the `test-utils` feature.

#![allow(clippy::missing_panics_doc)]

use std::time::{SystemTime, UNIX_EPOCH};

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// PKCS#8 RSA key whose public half is published by default
pub const SIGNING_KEY_PEM: &str = include_str!("../fixtures/signing_key.pem");

/// PKCS#8 RSA key that is never published
pub const ROGUE_KEY_PEM: &str = include_str!("../fixtures/rogue_key.pem");

/// `kid` used for the published fixture key
pub const PRIMARY_KID: &str = "ci-oidc-test-key";

/// Audience accepted by the default policy
pub const TEST_AUDIENCE: &str = "ci-oidc-lab";

/// Repository used by [`ci_claims`]
pub const TEST_REPOSITORY: &str = "octo-org/octo-repo";

/// Path the mock issuer serves its key set on
pub const JWKS_PATH: &str = "/.well-known/jwks";

/// Path of the discovery document
pub const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";

const SIGNING_KEY_MODULUS: &str = "ohj8MKIuxmZ0ENPclpDBzb5jdq059IaqSm1mkakymHaCTyO8wGWsQuoOH8kJ2vi5ttrUPIOyIOVTa1ofQ7rbCvKvWvQvTSUVjgLyVucU5UXmW7FqJiWju3Fxmu3QRDeGJcuGCiPjnFlyLSaiilAgFJ7zA3pBtYTgbu4Yi_v-Pr6Vt0zB9or9mzzC9tOIN_lJDNWPnM22dvbh8N1J3w9ZkarXcolnVsAK7NHlACIv3yEPoUdfJVbASt73ceiQDwB0L9Vq0rbwCEgtG98fcMEznJdhB-5VpA1kllxINk3On63KQpLNLcP_8H2rhqdXQzNmNxMY-Sj3DEuY_s-CTe4nHw";

const ROGUE_KEY_MODULUS: &str = "wogRJh4iPqxFyBsHdOTkE7ZwNsBs9Cp5seJiisVoHKjxEmDCBzo-7nC2DgBzC1o2Te954-FXcYc7FvWB-lOlQkRiOO1PzekNv4cNsjbQHltWMERTbxCWdYmqEYbrFvGo5M88HMB21MK45lp6U4l1g3SDJ1heYjP4VgGbiO_m4O1GWc4EsXP2U5hWBt0Vc-n-urujftPYDPtfXCdXdFZ4q9SrLpau1IzGo-q9FaGwe7_dEh1t5yUsVBLlCLQsYm7K6DOEzqGIMENF6_bkEHrZ246KqnbdTqlhBf5qH4Xkgs_QOaS_xEsa30aHGnbcjfV8UMiqNkecx5UHPWQxy0CkXw";

/// RSA key pair that signs test tokens
#[derive(Clone)]
pub struct TestSigner {
    kid: String,
    encoding_key: EncodingKey,
    modulus: &'static str,
}

impl std::fmt::Debug for TestSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestSigner").field("kid", &self.kid).finish()
    }
}

impl TestSigner {
    /// The key whose JWK the mock issuer publishes
    pub fn primary() -> Self {
        Self::from_pem(SIGNING_KEY_PEM, SIGNING_KEY_MODULUS)
    }

    /// A different key claiming the same `kid` as [`TestSigner::primary`]
    pub fn rogue() -> Self {
        Self::from_pem(ROGUE_KEY_PEM, ROGUE_KEY_MODULUS)
    }

    fn from_pem(pem: &str, modulus: &'static str) -> Self {
        Self {
            kid: PRIMARY_KID.to_string(),
            encoding_key: EncodingKey::from_rsa_pem(pem.as_bytes())
                .expect("fixture key is valid PKCS#8 PEM"),
            modulus,
        }
    }

    /// Use a different `kid`
    pub fn with_kid(mut self, kid: impl Into<String>) -> Self {
        self.kid = kid.into();
        self
    }

    /// Key identifier placed in token headers and the JWK
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Public JWK for this key
    pub fn jwk(&self) -> Value {
        json!({
            "kty": "RSA",
            "use": "sig",
            "alg": "RS256",
            "kid": self.kid,
            "n": self.modulus,
            "e": "AQAB",
        })
    }

    /// A key set containing only this key
    pub fn jwks(&self) -> Value {
        json!({ "keys": [self.jwk()] })
    }

    /// Sign `claims` as an RS256 JWT carrying this signer's `kid`
    pub fn sign(&self, claims: &Value) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.typ = Some("JWT".to_string());
        header.kid = Some(self.kid.clone());
        self.sign_with_header(&header, claims)
    }

    /// Sign `claims` with an explicit header
    pub fn sign_with_header(&self, header: &Header, claims: &Value) -> String {
        encode(header, claims, &self.encoding_key).expect("failed to encode test JWT")
    }
}

/// A token with arbitrary header and claims and a bogus signature
pub fn unsigned_token(header: &Value, claims: &Value) -> String {
    let encode = |value: &Value| {
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(value).expect("JSON encodes"))
    };
    format!("{}.{}.c2lnbmF0dXJl", encode(header), encode(claims))
}

/// Current Unix time in seconds
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock is after the Unix epoch")
        .as_secs()
}

/// Claims a CI provider would issue for a push to `main`, valid for five minutes
pub fn ci_claims(issuer: &str) -> Value {
    let now = current_timestamp();
    json!({
        "iss": issuer,
        "aud": TEST_AUDIENCE,
        "sub": format!("repo:{TEST_REPOSITORY}:ref:refs/heads/main"),
        "iat": now - 5,
        "nbf": now - 5,
        "exp": now + 300,
        "jti": "6f1c5a4e-0d0e-4c63-9c6b-3f1d9c1f2a7e",
        "repository": TEST_REPOSITORY,
        "repository_owner": "octo-org",
        "event_name": "push",
        "ref": "refs/heads/main",
        "ref_type": "branch",
        "sha": "9f2c1b0c3d7e4a5b6c7d8e9f0a1b2c3d4e5f6a7b",
        "workflow_ref": format!("{TEST_REPOSITORY}/.github/workflows/oidc.yml@refs/heads/main"),
        "job_workflow_ref": format!("{TEST_REPOSITORY}/.github/workflows/oidc.yml@refs/heads/main"),
        "runner_environment": "github-hosted",
    })
}

/// Mock OIDC issuer
///
/// The issuer identifier is the server's base URI, so discovery requests for
/// that issuer land on this server.
pub struct MockIssuer {
    /// Underlying wiremock server
    pub server: MockServer,
}

impl MockIssuer {
    /// Start an issuer with nothing mounted
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Start an issuer publishing `jwks` behind a standard discovery document
    pub async fn publishing(jwks: Value) -> Self {
        let issuer = Self::start().await;
        issuer.mount_discovery(issuer.discovery_document()).await;
        issuer.mount_jwks(jwks).await;
        issuer
    }

    /// Issuer identifier (`iss`)
    pub fn issuer(&self) -> String {
        self.server.uri()
    }

    /// Where the key set is served
    pub fn jwks_uri(&self) -> String {
        format!("{}{JWKS_PATH}", self.server.uri())
    }

    /// Discovery document pointing at [`MockIssuer::jwks_uri`]
    pub fn discovery_document(&self) -> Value {
        json!({
            "issuer": self.issuer(),
            "jwks_uri": self.jwks_uri(),
            "response_types_supported": ["id_token"],
            "subject_types_supported": ["public", "pairwise"],
            "id_token_signing_alg_values_supported": ["RS256"],
        })
    }

    /// Serve `document` as the discovery document
    pub async fn mount_discovery(&self, document: Value) {
        Mock::given(method("GET"))
            .and(path(DISCOVERY_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(document))
            .mount(&self.server)
            .await;
    }

    /// Serve `jwks` as the key set
    pub async fn mount_jwks(&self, jwks: Value) {
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks))
            .mount(&self.server)
            .await;
    }

    /// Answer requests for `route` with `status`
    pub async fn mount_status(&self, route: &str, status: u16) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Number of requests received for `route`
    pub async fn hits(&self, route: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|request| request.url.path() == route)
            .count()
    }
}
