//! Tracing subscriber setup
//!
//! The library only emits `tracing` events; applications that do not install
//! their own subscriber can call [`init_tracing`]. The filter comes from
//! `RUST_LOG` and defaults to `info`.

use tracing_subscriber::{EnvFilter, fmt};

/// Output format of the installed subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install a human-readable subscriber; returns false if one was already set
pub fn init_tracing() -> bool {
    init_tracing_with(LogFormat::Text)
}

/// Install a subscriber in the given format; returns false if one was already set
pub fn init_tracing_with(format: LogFormat) -> bool {
    let builder = fmt()
        .with_env_filter(env_filter())
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false);

    match format {
        LogFormat::Text => builder.try_init().is_ok(),
        LogFormat::Json => builder.json().try_init().is_ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_tracing();
        assert!(!init_tracing());
        assert!(!init_tracing_with(LogFormat::Json));
    }
}
