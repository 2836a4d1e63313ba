//! Tracing setup for binaries and demos built on the runtime.
//!
//! The library only emits `tracing` events: phase transitions at `debug`,
//! workflow start/end at `info`, discovery ambiguities at `warn`, and
//! uncontained failures at `error`. Nothing is printed unless a subscriber
//! is installed, except the diagnostic channel's stderr fallback.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install a compact stderr subscriber filtered by `RUST_LOG`, defaulting
/// to `default_filter` (for example `"info"` or `"agent_runtime=debug"`).
///
/// Returns `false` if a global subscriber was already set.
pub fn init(default_filter: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_reports_already_set() {
        init("warn");
        assert!(!init("warn"));
    }
}
