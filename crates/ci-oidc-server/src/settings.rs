//! Command-line and environment settings
//!
//! Server settings come from flags or their environment variables. The policy
//! configuration is read separately, from the `EXPECTED_REPOSITORY` /
//! `ALLOWED_*` variables, by [`ci_oidc_auth::PolicyConfig::from_env`].

use std::net::SocketAddr;

use ci_oidc_auth::config::{DEFAULT_ISSUER, VerifierConfig};
use ci_oidc_auth::error::ConfigError;
use clap::Parser;

/// ci-oidc-server - verify CI identity tokens and evaluate trust policies
#[derive(Parser, Debug, Clone)]
#[command(
    name = "ci-oidc-server",
    version,
    about = "Introspection service for CI-issued OIDC identity tokens",
    long_about = "Verifies OIDC identity tokens issued to CI workloads against their \
                  issuer's published keys and evaluates LAX / STRICT / STRICT_PLUS trust \
                  policies over the verified claims.\n\n\
                  Policy expectations are read from EXPECTED_REPOSITORY, ALLOWED_WORKFLOWS, \
                  ALLOWED_EVENT_NAMES, ALLOWED_REF_REGEX, ALLOWED_AUDIENCES and \
                  ALLOWED_ENVIRONMENTS."
)]
pub struct Settings {
    /// Address to listen on
    #[arg(long, env = "CI_OIDC_BIND", default_value = "127.0.0.1:8000")]
    pub bind: SocketAddr,

    /// Issuer assumed for tokens without an `iss` claim
    #[arg(long, env = "DEFAULT_ISSUER", default_value = DEFAULT_ISSUER)]
    pub default_issuer: String,

    /// Log level used when RUST_LOG is not set
    #[arg(long, env = "CI_OIDC_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "CI_OIDC_JSON_LOGS")]
    pub json_logs: bool,
}

impl Settings {
    /// Verifier configuration implied by these settings
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidUrl`] if the default issuer is not a URL.
    pub fn verifier_config(&self) -> Result<VerifierConfig, ConfigError> {
        VerifierConfig::default().with_default_issuer(self.default_issuer.clone())
    }
}
