//! Logging for the Undertow server
//!
//! The console shows Undertow's own crates at the chosen level and keeps the
//! HTTP stack quiet. A file under `logs/` receives everything Undertow logs
//! at trace level for post-mortem of the last run.

use std::fs::{File, create_dir_all};
use std::path::Path;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// Crates whose events follow the user's chosen level.
const UNDERTOW_TARGETS: &[&str] = &["undertow_core", "undertow_web", "undertow_sim", "undertow_cli"];

/// Dependencies that log per request or per connection.
const NOISY_TARGETS: &[&str] = &["hyper", "hyper_util", "reqwest", "tower_http", "axum"];

const LOG_FILE_NAME: &str = "undertow-last-run.log";

/// Console filter: Undertow crates at `level`, chatty dependencies at warn,
/// everything else at info or the chosen level, whichever is quieter.
pub fn console_directives(level: Level) -> String {
    let fallback = if level < Level::INFO { level } else { Level::INFO };
    let mut directives = vec![fallback.to_string().to_lowercase()];
    directives.extend(
        UNDERTOW_TARGETS
            .iter()
            .map(|target| format!("{target}={}", level.to_string().to_lowercase())),
    );
    directives.extend(NOISY_TARGETS.iter().map(|target| format!("{target}=warn")));
    directives.join(",")
}

/// File filter: every Undertow event, dependencies only from info up.
pub fn file_directives() -> String {
    let mut directives = vec!["info".to_string()];
    directives.extend(UNDERTOW_TARGETS.iter().map(|target| format!("{target}=trace")));
    directives.join(",")
}

/// Installs the console and file layers.
///
/// `RUST_LOG` overrides the console filter when set. The log file in
/// `logs_dir` (default `./logs`) is truncated on every start.
///
/// # Errors
///
/// - `std::io::Error` - Logs directory or log file could not be created
pub fn init_tracing(console_level: Level, logs_dir: Option<&Path>) -> Result<(), std::io::Error> {
    let logs_path = logs_dir.unwrap_or_else(|| Path::new("logs"));
    create_dir_all(logs_path)?;

    let log_file_path = logs_path.join(LOG_FILE_NAME);
    let log_file = File::create(&log_file_path)?;

    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(console_directives(console_level)));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_filter(console_filter);

    let file_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_writer(log_file)
        .with_filter(EnvFilter::new(file_directives()));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();

    tracing::info!(
        "Logging to console at {} and to {}",
        console_level,
        log_file_path.display()
    );

    Ok(())
}

/// CLI log levels for user control
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CliLogLevel {
    /// Only error messages
    Error,
    /// Warning and error messages
    Warn,
    /// Informational, warning, and error messages
    Info,
    /// Debug, informational, warning, and error messages
    Debug,
    /// All messages including detailed tracing
    Trace,
}

impl CliLogLevel {
    /// Converts CLI log level to tracing Level enum.
    ///
    /// # Examples
    /// ```
    /// use undertow_core::tracing_setup::CliLogLevel;
    ///
    /// let level = CliLogLevel::Info.as_tracing_level();
    /// assert_eq!(level, tracing::Level::INFO);
    /// ```
    pub fn as_tracing_level(self) -> Level {
        match self {
            CliLogLevel::Error => Level::ERROR,
            CliLogLevel::Warn => Level::WARN,
            CliLogLevel::Info => Level::INFO,
            CliLogLevel::Debug => Level::DEBUG,
            CliLogLevel::Trace => Level::TRACE,
        }
    }
}

impl std::fmt::Display for CliLogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliLogLevel::Error => write!(f, "error"),
            CliLogLevel::Warn => write!(f, "warn"),
            CliLogLevel::Info => write!(f, "info"),
            CliLogLevel::Debug => write!(f, "debug"),
            CliLogLevel::Trace => write!(f, "trace"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_directives_quiet_dependencies() {
        let directives = console_directives(Level::DEBUG);

        assert!(directives.starts_with("info,"));
        assert!(directives.contains("undertow_core=debug"));
        assert!(directives.contains("undertow_web=debug"));
        assert!(directives.contains("hyper=warn"));
        assert!(EnvFilter::try_new(&directives).is_ok());
    }

    #[test]
    fn test_quiet_console_level_applies_everywhere() {
        let directives = console_directives(Level::ERROR);

        assert!(directives.starts_with("error,"));
        assert!(directives.contains("undertow_sim=error"));
    }

    #[test]
    fn test_file_directives_trace_own_crates() {
        let directives = file_directives();

        assert!(directives.contains("undertow_core=trace"));
        assert!(!directives.contains("hyper"));
        assert!(EnvFilter::try_new(&directives).is_ok());
    }
}
