//! Verifies a running FROST-T demo signing service end to end.
//!
//! Takes no flags. See `frost_verify::config` for the environment variables
//! it reads. Exit status: 0 when every check passed, 1 when a check failed or
//! the service was unreachable, 130 when interrupted.

use anyhow::Context;
use frost_verify::orchestrator::EXIT_FAILURE;
use frost_verify::{logging, HttpServiceClient, Verifier, VerifierConfig};
use std::process;
use tracing::{error, warn};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    logging::init_logging();

    let verifier = match build_verifier() {
        Ok(verifier) => verifier,
        Err(e) => {
            error!("Failed to start verifier: {:#}", e);
            eprintln!("Failed to start verifier: {:#}", e);
            process::exit(EXIT_FAILURE);
        }
    };

    let outcome = verifier.run_until(interrupted()).await;
    process::exit(outcome.exit_code());
}

fn build_verifier() -> anyhow::Result<Verifier<HttpServiceClient>> {
    let config = VerifierConfig::load().context("Failed to load configuration")?;
    let client =
        HttpServiceClient::new(&config.base_url).context("Failed to create HTTP client")?;
    Ok(Verifier::new(client, config))
}

/// Resolves on Ctrl+C. If the handler cannot be installed the run simply
/// cannot be interrupted.
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}
