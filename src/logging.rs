//! Tracing setup for the `keeper` binary.
//!
//! Logs go to stderr so stdout carries only the report. `KEEPER_LOG` takes
//! an `EnvFilter` directive; without it the level follows the `-v` count.

use std::fs::OpenOptions;
use std::path::Path;

use color_eyre::eyre::{Context, Result, eyre};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*};

const LOG_ENV: &str = "KEEPER_LOG";

/// Install the global subscriber.
///
/// The returned guard flushes the log file on drop and must be held until
/// the program exits.
pub fn init(verbose: u8, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let env_filter = build_env_filter(verbose);
    let stderr_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let (writer, guard) = file_writer(path)?;
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let subscriber = Registry::default()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer);
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| eyre!("Cannot install log subscriber: {e}"))?;
    Ok(guard)
}

fn build_env_filter(verbose: u8) -> EnvFilter {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(level))
}

fn file_writer(
    path: &Path,
) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    let file_name = path
        .file_name()
        .ok_or_else(|| eyre!("Log file path has no file name: {}", path.display()))?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)
        .wrap_err_with(|| format!("Cannot create log directory {}", dir.display()))?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .wrap_err_with(|| format!("Cannot open log file {}", path.display()))?;

    let appender = rolling::never(dir, file_name);
    Ok(tracing_appender::non_blocking(appender))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_levels() {
        // Only meaningful when the environment does not override the level.
        if std::env::var_os(LOG_ENV).is_some() {
            return;
        }
        assert_eq!(build_env_filter(0).to_string(), "warn");
        assert_eq!(build_env_filter(1).to_string(), "info");
        assert_eq!(build_env_filter(5).to_string(), "trace");
    }
}
