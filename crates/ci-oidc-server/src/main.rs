//! ci-oidc-server entry point

use ci_oidc_server::{Settings, logging, run};
use clap::Parser;

#[tokio::main]
async fn main() {
    let settings = Settings::parse();

    if let Err(e) = logging::init_tracing(&settings.log_level, settings.json_logs) {
        eprintln!("{e}");
        std::process::exit(1);
    }

    if let Err(e) = run(settings).await {
        tracing::error!(error = %e, "server exited with error");
        eprintln!("{e}");
        std::process::exit(1);
    }
}
