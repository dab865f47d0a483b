//! Process-wide log output for the `ohsync` binary.

use tracing_subscriber::{fmt, EnvFilter};

/// Install the stderr subscriber. `RUST_LOG` wins over `default_level`.
///
/// Records from crates that log through the `log` facade are bridged by
/// `tracing-subscriber`'s `tracing-log` feature. Calling this twice is a
/// no-op.
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Default filter for the CLI verbosity flags.
pub fn level_for(verbose: bool, debug: bool) -> &'static str {
    if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        "warn"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_wins_over_verbose() {
        assert_eq!(level_for(true, true), "debug");
        assert_eq!(level_for(true, false), "info");
        assert_eq!(level_for(false, false), "warn");
    }

    #[test]
    fn init_twice_is_harmless() {
        init_tracing("warn");
        init_tracing("debug");
    }
}
