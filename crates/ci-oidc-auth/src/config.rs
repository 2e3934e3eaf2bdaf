//! Configuration types
//!
//! Two immutable values are built once at startup and shared behind `Arc`s:
//!
//! - [`PolicyConfig`] - what the trust policies expect of a verified token
//! - [`VerifierConfig`] - how tokens are verified (default issuer, caching, timeouts)

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Serialize, Serializer};

use crate::cache::DEFAULT_CACHE_TTL;
use crate::error::ConfigError;
use crate::fetch::DEFAULT_FETCH_TIMEOUT;
use crate::jwt::ALLOWED_ALGORITHMS;

/// Issuer assumed for tokens that carry no `iss` claim
pub const DEFAULT_ISSUER: &str = "https://token.actions.githubusercontent.com";

/// Default `ALLOWED_EVENT_NAMES`
pub const DEFAULT_ALLOWED_EVENT_NAMES: &str = "push,workflow_dispatch,workflow_call";

/// Default `ALLOWED_REF_REGEX`
pub const DEFAULT_ALLOWED_REF_REGEX: &str = "^refs/heads/main$";

/// Default `ALLOWED_AUDIENCES`
pub const DEFAULT_ALLOWED_AUDIENCES: &str = "ci-oidc-lab";

/// Environment variable names read by [`PolicyConfig::from_env`]
pub mod env {
    /// Exact `owner/name` repository to pin (empty: unchecked)
    pub const EXPECTED_REPOSITORY: &str = "EXPECTED_REPOSITORY";
    /// Comma-separated exact workflow refs (empty: unchecked)
    pub const ALLOWED_WORKFLOWS: &str = "ALLOWED_WORKFLOWS";
    /// Comma-separated trigger events
    pub const ALLOWED_EVENT_NAMES: &str = "ALLOWED_EVENT_NAMES";
    /// Regex the `ref` claim must match
    pub const ALLOWED_REF_REGEX: &str = "ALLOWED_REF_REGEX";
    /// Comma-separated accepted audiences (empty: unchecked)
    pub const ALLOWED_AUDIENCES: &str = "ALLOWED_AUDIENCES";
    /// Comma-separated deployment environments (empty: unchecked)
    pub const ALLOWED_ENVIRONMENTS: &str = "ALLOWED_ENVIRONMENTS";
}

/// Deployment expectations the policy tiers check claims against
///
/// Empty `repository`, `allowed_workflows`, `allowed_audiences` and
/// `allowed_environments` disable the corresponding check.
/// `allowed_event_names` is always enforced by STRICT.
#[derive(Debug, Clone, Serialize)]
pub struct PolicyConfig {
    /// Exact repository pin
    pub repository: String,
    /// Exact `job_workflow_ref` / `workflow_ref` values
    pub allowed_workflows: Vec<String>,
    /// Accepted `event_name` values
    pub allowed_event_names: Vec<String>,
    /// Pattern the `ref` claim must match (not implicitly anchored)
    #[serde(serialize_with = "serialize_regex")]
    pub allowed_ref_regex: Regex,
    /// Accepted audiences; one overlap with `aud` is enough
    pub allowed_audiences: Vec<String>,
    /// Accepted deployment environments
    pub allowed_environments: Vec<String>,
}

impl PolicyConfig {
    /// Read the configuration from the process environment
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidRefPattern`] if `ALLOWED_REF_REGEX` does not compile.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable lookup
    ///
    /// List variables are trimmed; a blank value is an empty list, otherwise
    /// the value is split on `,` and blank items are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidRefPattern`] if `ALLOWED_REF_REGEX` does not compile.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let list = |name: &str, default: &str| {
            parse_list(lookup(name).as_deref().unwrap_or(default))
        };

        let pattern = lookup(env::ALLOWED_REF_REGEX)
            .unwrap_or_else(|| DEFAULT_ALLOWED_REF_REGEX.to_string());

        Ok(Self {
            repository: lookup(env::EXPECTED_REPOSITORY)
                .unwrap_or_default()
                .trim()
                .to_string(),
            allowed_workflows: list(env::ALLOWED_WORKFLOWS, ""),
            allowed_event_names: list(env::ALLOWED_EVENT_NAMES, DEFAULT_ALLOWED_EVENT_NAMES),
            allowed_ref_regex: compile_ref_pattern(&pattern)?,
            allowed_audiences: list(env::ALLOWED_AUDIENCES, DEFAULT_ALLOWED_AUDIENCES),
            allowed_environments: list(env::ALLOWED_ENVIRONMENTS, ""),
        })
    }

    /// Replace the ref pattern
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidRefPattern`] if `pattern` does not compile.
    pub fn with_ref_pattern(mut self, pattern: &str) -> Result<Self, ConfigError> {
        self.allowed_ref_regex = compile_ref_pattern(pattern)?;
        Ok(self)
    }
}

/// [`DEFAULT_ALLOWED_REF_REGEX`], compiled once
static DEFAULT_REF_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(DEFAULT_ALLOWED_REF_REGEX).expect("DEFAULT_ALLOWED_REF_REGEX is a valid pattern")
});

/// Defaults of every `ALLOWED_*` variable, no repository pin
///
/// # Panics
///
/// Only if [`DEFAULT_ALLOWED_REF_REGEX`] stops compiling, which
/// `test_default_ref_pattern_compiles` guards against.
impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            repository: String::new(),
            allowed_workflows: Vec::new(),
            allowed_event_names: parse_list(DEFAULT_ALLOWED_EVENT_NAMES),
            allowed_ref_regex: DEFAULT_REF_PATTERN.clone(),
            allowed_audiences: parse_list(DEFAULT_ALLOWED_AUDIENCES),
            allowed_environments: Vec::new(),
        }
    }
}

/// Split a comma-separated list, trimming items and dropping blanks
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect()
}

fn compile_ref_pattern(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|e| ConfigError::InvalidRefPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

fn serialize_regex<S>(regex: &Regex, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(regex.as_str())
}

/// Token verification settings
///
/// Registered claims are validated strictly: `iss` must equal the resolved
/// issuer, `nbf` is honoured, and `exp` is required. A token without `exp` is
/// rejected (`token is missing required claim: exp`) even though plain JOSE
/// libraries commonly accept one; CI identity tokens always carry an expiry.
/// `clock_skew_leeway` applies to `exp` and `nbf`.
#[derive(Debug, Clone, Serialize)]
pub struct VerifierConfig {
    /// Issuer substituted when a token has no `iss` claim
    pub default_issuer: String,
    /// Accepted JOSE `alg` values
    pub allowed_algorithms: Vec<String>,
    /// Lifetime of cached discovery documents and key sets
    pub cache_ttl: Duration,
    /// Per-request timeout for discovery and JWKS fetches
    pub fetch_timeout: Duration,
    /// Tolerance applied to `exp` and `nbf`
    pub clock_skew_leeway: Duration,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            default_issuer: DEFAULT_ISSUER.to_string(),
            allowed_algorithms: ALLOWED_ALGORITHMS.iter().map(|a| a.to_string()).collect(),
            cache_ttl: DEFAULT_CACHE_TTL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            clock_skew_leeway: Duration::ZERO,
        }
    }
}

impl VerifierConfig {
    /// Set the default issuer
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidUrl`] unless `issuer` is an absolute URL.
    pub fn with_default_issuer(mut self, issuer: impl Into<String>) -> Result<Self, ConfigError> {
        let issuer = issuer.into();
        url::Url::parse(&issuer).map_err(|e| ConfigError::InvalidUrl {
            field: "default_issuer",
            reason: e.to_string(),
        })?;
        self.default_issuer = issuer;
        Ok(self)
    }

    /// Set the cache TTL
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Set the outbound fetch timeout
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Set the clock skew leeway for `exp`/`nbf`
    pub fn with_clock_skew(mut self, leeway: Duration) -> Self {
        self.clock_skew_leeway = leeway;
        self
    }
}
