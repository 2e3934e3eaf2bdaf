//! # ci-oidc-server
//!
//! HTTP surface for [`ci_oidc_auth`]: verifies bearer tokens issued to CI
//! workloads and reports the LAX / STRICT / STRICT_PLUS policy outcomes.
//!
//! ## Architecture
//!
//! - [`routes`] - axum router, handlers and response types
//! - [`settings`] - clap settings (flags and environment)
//! - [`logging`] - tracing subscriber setup
//! - [`error`] - API and startup errors
//!
//! ## Example
//!
//! ```rust,no_run
//! use ci_oidc_auth::{PolicyConfig, TokenVerifier, VerifierConfig};
//! use ci_oidc_server::{AppState, serve};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let state = AppState::new(
//!     TokenVerifier::from_config(VerifierConfig::default())?,
//!     PolicyConfig::from_env()?,
//! );
//! serve("127.0.0.1:8000".parse()?, state).await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod logging;
pub mod routes;
pub mod settings;

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::info;

pub use error::{ApiError, ServerError, ServerResult};
pub use routes::{AppState, IntrospectResponse, router};
pub use settings::Settings;

/// Bind `addr` and serve the router until Ctrl-C
///
/// # Errors
///
/// Returns [`ServerError::Bind`] if the address cannot be bound and
/// [`ServerError::Serve`] if serving fails.
pub async fn serve(addr: SocketAddr, state: AppState) -> ServerResult<()> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;

    info!(
        bind = %addr,
        default_issuer = %state.verifier.config().default_issuer,
        "ci-oidc-server listening"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(ServerError::Serve)
}

/// Build the state from settings and the process environment, then serve
///
/// # Errors
///
/// Any configuration, client construction, bind or serve failure.
pub async fn run(settings: Settings) -> ServerResult<()> {
    let policy = ci_oidc_auth::PolicyConfig::from_env()?;
    let verifier = ci_oidc_auth::TokenVerifier::from_config(settings.verifier_config()?)?;

    info!(
        repository = %policy.repository,
        allowed_ref_regex = %policy.allowed_ref_regex,
        "policy configuration loaded"
    );

    serve(settings.bind, AppState::new(verifier, policy)).await
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown signal received");
    }
}
