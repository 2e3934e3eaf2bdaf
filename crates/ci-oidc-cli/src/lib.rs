//! # ci-oidc-cli
//!
//! `ci-oidc-diff` compares two stored `/introspect` results: which claims and
//! workflow context entries changed, and how each side's policy tiers came out.
//!
//! ```text
//! ci-oidc-diff runs/main.json runs/feature.json
//! ```

pub mod cli;
pub mod diff;
pub mod error;

use std::io::Write;

pub use cli::Cli;
pub use diff::{StoredResult, diff_maps, write_report};
pub use error::{CliError, CliResult, display_error};

/// Load both results named by `cli` and write the report to `out`
///
/// # Errors
///
/// Any load failure, or a failure writing to `out`.
pub fn run(cli: &Cli, out: &mut dyn Write) -> CliResult<()> {
    let a = StoredResult::load(&cli.result_a)?;
    let b = StoredResult::load(&cli.result_b)?;
    write_report(out, &a, &b)?;
    out.flush()?;
    Ok(())
}
