//! # ci-oidc-auth
//!
//! Verification and trust policies for OIDC identity tokens issued to CI
//! workloads (e.g. GitHub Actions runners).
//!
//! Answers two questions about a bearer token:
//!
//! 1. Is it genuine? The token's issuer is discovered, the issuer's key set is
//!    fetched (and cached), and the signature, `exp`, `nbf` and `iss` are checked.
//! 2. Should the workload be trusted? Verified claims are evaluated against
//!    three policy tiers (LAX, STRICT, STRICT_PLUS) that pin repository, trigger
//!    event, ref, workflow, audience and environment.
//!
//! ## Architecture
//!
//! - [`cache`] - time-bounded per-issuer document cache
//! - [`fetch`] - outbound JSON fetching (`DocumentFetcher` seam, reqwest impl)
//! - [`discovery`] - OpenID configuration resolution
//! - [`jwt`] - key set resolution, key selection and token verification
//! - [`policy`] - policy tier evaluation
//! - [`config`] - policy and verifier configuration
//! - [`error`] - error taxonomy
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ci_oidc_auth::config::{PolicyConfig, VerifierConfig};
//! use ci_oidc_auth::jwt::TokenVerifier;
//! use ci_oidc_auth::policy::evaluate;
//!
//! # tokio_test::block_on(async {
//! let policy = PolicyConfig::from_env()?;
//! let verifier = TokenVerifier::from_config(VerifierConfig::default())?;
//!
//! # let token = "";
//! match verifier.verify(token).await {
//!     Ok(verified) => {
//!         let results = evaluate(&verified.claims, &policy);
//!         println!("STRICT ok: {}", results.strict.ok);
//!     }
//!     Err(failure) => println!("rejected: {failure}"),
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```
//!
//! ## Feature Flags
//!
//! - `test-utils` - fixture keys, token minting and a wiremock-backed issuer

pub mod cache;
pub mod config;
pub mod discovery;
pub mod error;
pub mod fetch;
pub mod jwt;
pub mod policy;

#[cfg(any(test, feature = "test-utils"))]
pub mod testutil;

#[doc(inline)]
pub use config::{PolicyConfig, VerifierConfig};
#[doc(inline)]
pub use error::{ConfigError, ErrorKind, VerificationFailure, VerifyError};
#[doc(inline)]
pub use jwt::{TokenVerifier, Verified, VerifiedClaims};
#[doc(inline)]
pub use policy::{PolicyResults, PolicyTier, evaluate};
