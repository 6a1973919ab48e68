use std::env;

use once_cell::sync::OnceCell;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

static INIT: OnceCell<()> = OnceCell::new();

/// Filter directive: `GPIS_LOG`, else `RUST_LOG`, else `info` (`debug` when verbose).
fn filter_directive(verbose: bool, gpis_log: Option<String>, rust_log: Option<String>) -> String {
    gpis_log
        .or(rust_log)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| if verbose { "debug" } else { "info" }.to_string())
}

/// Install the stderr fmt subscriber once per process. Returns false when a
/// subscriber was already installed (by us or by someone else).
pub fn telemetry_init(verbose: bool) -> bool {
    if INIT.get().is_some() {
        return false;
    }

    let directive = filter_directive(verbose, env::var("GPIS_LOG").ok(), env::var("RUST_LOG").ok());
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|e| {
        eprintln!("gpis: invalid log filter {directive:?}: {e}; using \"info\"");
        EnvFilter::new("info")
    });
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(crate::color::color_enabled_stderr());

    if tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .is_err()
    {
        return false;
    }
    let _ = INIT.set(());
    true
}
