//! Subscriber setup for hosts that do not install their own.
//!
//! Both initialisers honour `RUST_LOG` and fall back to the given filter.
//! They use `try_init`, so calling one after a subscriber is already set
//! returns an error instead of panicking.

use std::path::Path;

use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Compact console logging.
pub fn init_logging(filter: &str) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false).compact())
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))
}

/// Console logging plus a daily-rolling file in `logs_dir`.
///
/// Keep the returned guard alive; dropping it flushes and stops the file
/// writer.
pub fn init_logging_to_dir(logs_dir: &Path, filter: &str) -> Result<WorkerGuard> {
    std::fs::create_dir_all(logs_dir)?;

    let file_appender = tracing_appender::rolling::daily(logs_dir, "mesh-channel");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_ansi(false)
                .with_writer(non_blocking),
        )
        .with(fmt::layer().with_target(false).compact())
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))?;

    Ok(guard)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_to_dir_creates_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let logs_dir = tmp.path().join("nested").join("logs");
        assert!(!logs_dir.exists());

        // Only one global subscriber per process; the directory is created
        // whether or not this call wins.
        let result = init_logging_to_dir(&logs_dir, "warn");
        assert!(logs_dir.exists());
        drop(result);
    }

    #[test]
    fn test_second_init_reports_error() {
        let tmp = tempfile::tempdir().unwrap();
        let _first = init_logging_to_dir(tmp.path(), "info");

        let second = init_logging("info");
        let message = second.unwrap_err().to_string();
        assert!(message.contains("logging"), "unexpected error: {message}");
    }

    #[test]
    fn test_env_filter_accepts_module_directives() {
        for directive in ["info", "debug", "mesh_channel=debug,warn"] {
            let filter = EnvFilter::try_new(directive);
            assert!(filter.is_ok(), "rejected {directive}");
        }
    }
}
