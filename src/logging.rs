//! Process-level tracing setup.

use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

static INIT: OnceLock<()> = OnceLock::new();

/// Filter used when `RUST_LOG` is unset.
pub fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "info,sleep_outbox=debug"
    } else {
        "info"
    }
}

/// Initialize tracing output on stderr.
///
/// `RUST_LOG` takes precedence; otherwise `verbose` turns on debug output
/// for this crate. Only the first call has an effect.
pub fn init(verbose: bool) {
    if INIT.get().is_some() {
        return;
    }
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
    let _ = INIT.set(());
}
