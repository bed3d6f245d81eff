//! Structured logging with `tracing`.
//!
//! Library crates only emit events; the binary calls [`init_subscriber`]
//! once at startup. `RUST_LOG` takes precedence over the configured level.

use tracing_subscriber::EnvFilter;

/// Default level when neither settings nor `RUST_LOG` specify one.
pub const DEFAULT_LEVEL: &str = "warn";

/// Build the filter: `RUST_LOG` if set and valid, otherwise `level`.
fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL))
}

/// Initialize the global tracing subscriber writing to stderr.
///
/// `json` selects the JSON formatter (one object per line) instead of the
/// compact human-readable one. Subsequent calls are no-ops.
pub fn init_subscriber(level: &str, json: bool) {
    let filter = build_filter(level);

    if json {
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .json();
        let _ = subscriber.try_init();
    } else {
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .compact();
        let _ = subscriber.try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_subscriber_does_not_panic() {
        init_subscriber("warn", false);
        init_subscriber("debug", true);
    }

    #[test]
    fn invalid_level_falls_back() {
        // Garbage directives must not panic.
        let _filter = build_filter("not a [valid directive");
    }
}
