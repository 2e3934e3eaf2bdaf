use std::io::IsTerminal;

use ci_oidc_cli::{Cli, display_error, run};
use clap::Parser;

fn main() {
    // Missing arguments exit with clap's usage code (2).
    let cli = Cli::parse();

    let stdout = std::io::stdout();
    if let Err(e) = run(&cli, &mut stdout.lock()) {
        let color = !cli.no_color && std::io::stderr().is_terminal();
        std::process::exit(display_error(&e, color));
    }
}
