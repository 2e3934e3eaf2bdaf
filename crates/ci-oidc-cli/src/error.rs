//! Error types for the diff tool

use std::path::PathBuf;

use colored::Colorize;
use thiserror::Error;

/// Result type for diff operations
pub type CliResult<T> = std::result::Result<T, CliError>;

/// Failures that stop a diff
#[derive(Error, Debug)]
pub enum CliError {
    /// A result file could not be read
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A result file is not JSON
    #[error("{} is not valid JSON: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A result, or one of its sections, is not a JSON object
    #[error("{} has an unexpected shape: {what} is not an object", path.display())]
    Shape { path: PathBuf, what: &'static str },

    /// Writing the report failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        1
    }
}

/// Print an error to stderr and return its exit code
pub fn display_error(error: &CliError, color: bool) -> i32 {
    if color {
        eprintln!("{}: {error}", "Error".bold().red());
    } else {
        eprintln!("Error: {error}");
    }
    error.exit_code()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_file() {
        let err = CliError::Shape {
            path: PathBuf::from("runs/a.json"),
            what: "claims",
        };
        assert_eq!(
            err.to_string(),
            "runs/a.json has an unexpected shape: claims is not an object"
        );
        assert_eq!(err.exit_code(), 1);
    }
}
