//! Trust policy tiers
//!
//! Verified claims are checked against a [`PolicyConfig`] at three tiers:
//!
//! - **LAX** - pins the repository when one is configured, nothing else
//! - **STRICT** - the LAX check plus trigger event, ref, workflow, audience and
//!   environment
//! - **STRICT_PLUS** - STRICT's outcome with a note reserving room for
//!   deployment-specific pins
//!
//! Evaluation is total: a missing claim is a violation, never an error. All
//! sub-checks run, so every violation is reported at once.

use std::borrow::Cow;

use serde::Serialize;

use crate::config::PolicyConfig;
use crate::jwt::VerifiedClaims;

/// Note attached to STRICT_PLUS results
pub const STRICT_PLUS_NOTE: &str =
    "Placeholder: add deployment-specific pins (e.g. job_workflow_sha) for a real STRICT_PLUS.";

/// How an absent claim is rendered in a reason
const ABSENT: &str = "None";

/// Policy strictness tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PolicyTier {
    /// Repository pin only
    #[serde(rename = "LAX")]
    Lax,
    /// Full CI-context binding
    #[serde(rename = "STRICT")]
    Strict,
    /// STRICT plus future pins
    #[serde(rename = "STRICT_PLUS")]
    StrictPlus,
}

impl PolicyTier {
    /// Wire name of the tier
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lax => "LAX",
            Self::Strict => "STRICT",
            Self::StrictPlus => "STRICT_PLUS",
        }
    }
}

impl std::fmt::Display for PolicyTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyResult {
    /// Tier this result belongs to
    #[serde(skip)]
    pub tier: PolicyTier,
    /// Whether every check passed
    pub ok: bool,
    /// One entry per failed check, in evaluation order
    pub reasons: Vec<String>,
    /// Advisory note
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl PolicyResult {
    fn from_reasons(tier: PolicyTier, reasons: Vec<String>) -> Self {
        Self {
            tier,
            ok: reasons.is_empty(),
            reasons,
            note: None,
        }
    }
}

/// Results for all tiers, computed from the same claims
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyResults {
    /// LAX outcome
    #[serde(rename = "LAX")]
    pub lax: PolicyResult,
    /// STRICT outcome
    #[serde(rename = "STRICT")]
    pub strict: PolicyResult,
    /// STRICT_PLUS outcome
    #[serde(rename = "STRICT_PLUS")]
    pub strict_plus: PolicyResult,
}

impl PolicyResults {
    /// Result for `tier`
    pub fn get(&self, tier: PolicyTier) -> &PolicyResult {
        match tier {
            PolicyTier::Lax => &self.lax,
            PolicyTier::Strict => &self.strict,
            PolicyTier::StrictPlus => &self.strict_plus,
        }
    }
}

/// Evaluate all tiers for `claims`
///
/// Pure and deterministic; identical inputs give identical results.
pub fn evaluate(claims: &VerifiedClaims, config: &PolicyConfig) -> PolicyResults {
    let lax = PolicyResult::from_reasons(
        PolicyTier::Lax,
        check_repository(claims, config).into_iter().collect(),
    );

    let strict_reasons: Vec<String> = [
        check_repository(claims, config),
        check_event_name(claims, config),
        check_ref(claims, config),
        check_workflow(claims, config),
        check_audience(claims, config),
        check_environment(claims, config),
    ]
    .into_iter()
    .flatten()
    .collect();

    let strict = PolicyResult::from_reasons(PolicyTier::Strict, strict_reasons.clone());
    let strict_plus = PolicyResult {
        note: Some(STRICT_PLUS_NOTE.to_string()),
        ..PolicyResult::from_reasons(PolicyTier::StrictPlus, strict_reasons)
    };

    PolicyResults {
        lax,
        strict,
        strict_plus,
    }
}

/// Rendering of a claim in a reason: the typed value, else whatever untyped
/// value the token carried under one of `names`, else `None`
fn shown<'a>(
    claims: &'a VerifiedClaims,
    value: Option<&'a str>,
    names: &[&str],
) -> Cow<'a, str> {
    if let Some(value) = value {
        return Cow::Borrowed(value);
    }
    names
        .iter()
        .find_map(|name| claims.untyped(name).filter(|v| !v.is_null()))
        .map_or(Cow::Borrowed(ABSENT), |v| Cow::Owned(v.to_string()))
}

fn contains(allowed: &[String], value: Option<&str>) -> bool {
    value.is_some_and(|v| allowed.iter().any(|a| a == v))
}

fn check_repository(claims: &VerifiedClaims, config: &PolicyConfig) -> Option<String> {
    let repository = claims.repository.as_deref();
    (!config.repository.is_empty() && repository != Some(config.repository.as_str()))
        .then(|| format!("repository_mismatch: {}", shown(claims, repository, &["repository"])))
}

fn check_event_name(claims: &VerifiedClaims, config: &PolicyConfig) -> Option<String> {
    let event_name = claims.event_name.as_deref();
    (!contains(&config.allowed_event_names, event_name))
        .then(|| format!("event_name_not_allowed: {}", shown(claims, event_name, &["event_name"])))
}

fn check_ref(claims: &VerifiedClaims, config: &PolicyConfig) -> Option<String> {
    let git_ref = claims.git_ref.as_deref();
    let allowed = git_ref.is_some_and(|r| !r.is_empty() && config.allowed_ref_regex.is_match(r));
    (!allowed).then(|| format!("ref_not_allowed: {}", shown(claims, git_ref, &["ref"])))
}

fn check_workflow(claims: &VerifiedClaims, config: &PolicyConfig) -> Option<String> {
    if config.allowed_workflows.is_empty() {
        return None;
    }
    let workflow_ref = claims.effective_workflow_ref();
    (!contains(&config.allowed_workflows, workflow_ref))
        .then(|| format!("workflow_ref_not_allowed: {}", shown(claims, workflow_ref, &["job_workflow_ref", "workflow_ref"])))
}

fn check_audience(claims: &VerifiedClaims, config: &PolicyConfig) -> Option<String> {
    if config.allowed_audiences.is_empty() {
        return None;
    }
    let audiences = claims.audiences();
    let allowed = audiences
        .iter()
        .any(|aud| config.allowed_audiences.iter().any(|a| a == aud));
    (!allowed).then(|| {
        let rendered = serde_json::to_string(&audiences).unwrap_or_else(|_| "[]".to_string());
        format!("aud_not_allowed: {rendered}")
    })
}

fn check_environment(claims: &VerifiedClaims, config: &PolicyConfig) -> Option<String> {
    if config.allowed_environments.is_empty() {
        return None;
    }
    let environment = claims.environment.as_deref();
    (!contains(&config.allowed_environments, environment))
        .then(|| format!("environment_not_allowed: {}", shown(claims, environment, &["environment"])))
}
