//! CLI argument parsing

use std::path::PathBuf;

use clap::Parser;

/// Compare two stored verification results
#[derive(Parser, Debug, Clone)]
#[command(
    name = "ci-oidc-diff",
    version,
    about = "Diff the claims and policy outcomes of two stored verification results",
    long_about = "Reads two /introspect results saved as JSON and reports which claims and \
                  workflow context entries were added, removed or changed between them, \
                  followed by both policy_results documents."
)]
pub struct Cli {
    /// First result (A)
    #[arg(value_name = "RESULT_A")]
    pub result_a: PathBuf,

    /// Second result (B)
    #[arg(value_name = "RESULT_B")]
    pub result_b: PathBuf,

    /// Disable colored error output
    #[arg(long)]
    pub no_color: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn test_two_paths() {
        let cli = Cli::try_parse_from(["ci-oidc-diff", "a.json", "b.json"]).unwrap();
        assert_eq!(cli.result_a, PathBuf::from("a.json"));
        assert_eq!(cli.result_b, PathBuf::from("b.json"));
        assert!(!cli.no_color);
    }

    #[test]
    fn test_missing_argument_is_usage_error() {
        let err = Cli::try_parse_from(["ci-oidc-diff", "a.json"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
        assert_eq!(err.exit_code(), 2);
    }
}
