//! Result loading and the diff report
//!
//! A stored result is the JSON body of an `/introspect` response, optionally
//! with a `workflow_context` object added by whoever saved it. Missing or
//! `null` sections count as empty.

use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::error::{CliError, CliResult};

/// One stored verification result
#[derive(Debug, Clone, PartialEq)]
pub struct StoredResult {
    /// File name shown in the report
    pub name: String,
    /// `claims`
    pub claims: Map<String, Value>,
    /// `workflow_context`
    pub workflow_context: Map<String, Value>,
    /// `policy_results`, `null` when absent
    pub policy_results: Value,
}

impl StoredResult {
    /// Read and parse a result file
    ///
    /// # Errors
    ///
    /// Returns [`CliError::Read`] or [`CliError::Json`] if the file cannot be
    /// loaded, and [`CliError::Shape`] if it or one of its sections is not an object.
    pub fn load(path: &Path) -> CliResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| CliError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let document: Value = serde_json::from_str(&raw).map_err(|source| CliError::Json {
            path: path.to_path_buf(),
            source,
        })?;

        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        Self::from_value(name, document, path)
    }

    fn from_value(name: String, document: Value, path: &Path) -> CliResult<Self> {
        let shape = |what: &'static str| CliError::Shape {
            path: PathBuf::from(path),
            what,
        };
        let Value::Object(mut document) = document else {
            return Err(shape("the document"));
        };

        let mut section = |key: &'static str| match document.remove(key) {
            None | Some(Value::Null) => Ok(Map::new()),
            Some(Value::Object(map)) => Ok(map),
            Some(_) => Err(shape(key)),
        };
        let claims = section("claims")?;
        let workflow_context = section("workflow_context")?;

        Ok(Self {
            name,
            claims,
            workflow_context,
            policy_results: document.remove("policy_results").unwrap_or(Value::Null),
        })
    }
}

/// Differences between two maps, over the sorted union of their keys
///
/// `+ k = v` only in `b`, `- k = v` only in `a`, `~ k: a -> b` changed.
pub fn diff_maps(a: &Map<String, Value>, b: &Map<String, Value>) -> Vec<String> {
    let keys: BTreeSet<&String> = a.keys().chain(b.keys()).collect();

    keys.into_iter()
        .filter_map(|key| match (a.get(key), b.get(key)) {
            (None, Some(vb)) => Some(format!("+ {key} = {}", compact(vb))),
            (Some(va), None) => Some(format!("- {key} = {}", compact(va))),
            (Some(va), Some(vb)) if va != vb => {
                Some(format!("~ {key}: {} -> {}", compact(va), compact(vb)))
            }
            _ => None,
        })
        .collect()
}

/// Write the full report for `a` against `b`
///
/// # Errors
///
/// Returns [`CliError::Io`] if writing to `out` fails.
pub fn write_report(out: &mut dyn Write, a: &StoredResult, b: &StoredResult) -> CliResult<()> {
    writeln!(
        out,
        "== Claims keys: {} ({}) vs {} ({})",
        a.name,
        a.claims.len(),
        b.name,
        b.claims.len()
    )?;
    writeln!(out, "== Claims diff")?;
    for line in diff_maps(&a.claims, &b.claims) {
        writeln!(out, "{line}")?;
    }

    writeln!(out, "\n== Workflow context diff")?;
    for line in diff_maps(&a.workflow_context, &b.workflow_context) {
        writeln!(out, "{line}")?;
    }

    writeln!(out, "\n== Policy results (A, then B)")?;
    writeln!(out, "{}", pretty(&a.policy_results))?;
    writeln!(out, "{}", pretty(&b.policy_results))?;
    Ok(())
}

fn compact(value: &Value) -> String {
    sorted(value).to_string()
}

fn pretty(value: &Value) -> String {
    // Serializing a Value only fails for non-string map keys, which it cannot hold.
    serde_json::to_string_pretty(&sorted(value)).unwrap_or_else(|_| value.to_string())
}

/// Copy of `value` with every object's keys in sorted order
fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|(ka, _), (kb, _)| ka.cmp(kb));
            Value::Object(entries.into_iter().map(|(k, v)| (k.clone(), sorted(v))).collect())
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}
