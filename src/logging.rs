//! Logging initialisation
//!
//! Diagnostics go to stderr through `tracing`; the verification report itself
//! is plain console text on stdout. The filter comes from `RUST_LOG` and
//! defaults to warnings from this crate only.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const DEFAULT_FILTER: &str = "frost_verify=warn";

/// Install the global subscriber. Later calls are no-ops.
pub fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init();
}
