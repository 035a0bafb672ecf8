//! Diagnostic tracing for the core and the CLI.
//!
//! Output goes to stderr only: stdout carries protocol responses and command
//! results. `RUST_LOG` wins over the directive passed in.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter when neither `RUST_LOG` nor config `log_level` is set.
pub const DEFAULT_DIRECTIVE: &str = "warn";

/// Install the global subscriber. Calling it twice is a no-op.
///
/// ```bash
/// RUST_LOG=ralph=debug ralph serve
/// ```
pub fn init(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}
