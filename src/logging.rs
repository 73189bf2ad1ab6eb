//! Tracing setup for the CLI.
//!
//! Filter comes from `RUST_LOG` when set; otherwise the `-v` count picks the
//! level. Output goes to stderr so stdout stays clean for listings.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. Safe to call once per process.
///
/// ```bash
/// RUST_LOG=lintloop=debug lintloop improve app.py
/// ```
pub fn init(verbosity: u8) {
    let fallback = match verbosity {
        0 => "warn",
        1 => "lintloop=info,warn",
        _ => "lintloop=debug,info",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}
