//! Logging setup
//!
//! Installs the global tracing subscriber. Logs go to stderr so stdout
//! stays reserved for command output.

use std::io;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogFormat;

/// `RUST_LOG` when set, else `log_level`
pub fn env_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level))
}

/// Initialize the tracing subscriber with the given level and format
pub fn init_tracing(log_level: &str, format: LogFormat) -> anyhow::Result<()> {
    let registry = tracing_subscriber::registry().with(env_filter(log_level));

    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(io::stderr))
            .try_init()?,
        LogFormat::Pretty => registry
            .with(fmt::layer().pretty().with_writer(io::stderr))
            .try_init()?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_filter_uses_level() {
        std::env::remove_var("RUST_LOG");
        let filter = env_filter("keypool=debug,warn");
        let rendered = filter.to_string();
        assert!(rendered.contains("keypool=debug"));
        assert!(rendered.contains("warn"));
    }

    #[test]
    fn test_second_init_is_an_error() {
        let _ = init_tracing("info", LogFormat::Json);
        assert!(init_tracing("info", LogFormat::Pretty).is_err());
    }
}
