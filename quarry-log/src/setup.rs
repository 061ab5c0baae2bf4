use std::env;
use std::io::IsTerminal;

use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

// Import CRATE_NAMES, which lists all crates in the workspace.
include!(concat!(env!("OUT_DIR"), "/constants.gen.rs"));

/// Controls the log format.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect the best format.
    ///
    /// This chooses [`LogFormat::Pretty`] for TTY, otherwise [`LogFormat::Simplified`].
    #[default]
    Auto,

    /// Pretty printing with colors.
    ///
    /// ```text
    ///  INFO  quarry_query::builder > compiled query with 2 aggregates
    /// ```
    Pretty,

    /// Simplified plain text output.
    ///
    /// ```text
    /// 2026-08-20T12:10:32Z INFO quarry_query::builder: compiled query with 2 aggregates
    /// ```
    Simplified,

    /// Dump out JSON lines.
    ///
    /// ```text
    /// {"timestamp":"2026-08-20T12:11:08.729716Z","level":"INFO","message":"compiled query with 2 aggregates"}
    /// ```
    Json,
}

/// The logging level parsed from configuration.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Log only error events.
    Error,
    /// Log error and warning events.
    Warn,
    /// Log error, warning, and info events.
    #[default]
    Info,
    /// Log error, warning, info, and debug events.
    Debug,
    /// Log all events.
    Trace,
}

impl LogLevel {
    /// Returns the tracing [`Level`] for this log level.
    pub const fn level(self) -> Level {
        match self {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

/// Controls the logging system.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// The log level for the Quarry crates.
    ///
    /// Third-party crates log at `info` regardless of this setting.
    pub level: LogLevel,

    /// Controls the log output format.
    ///
    /// Defaults to [`LogFormat::Auto`], which detects the best format based on the TTY.
    pub format: LogFormat,

    /// When set to `true`, backtraces are forced on.
    ///
    /// Otherwise, backtraces can be enabled by setting the `RUST_BACKTRACE` variable to `full`.
    pub enable_backtraces: bool,
}

/// Sets the default filters for all of the Quarry crates.
fn default_filters(config: &LogConfig) -> EnvFilter {
    CRATE_NAMES.iter().fold(
        EnvFilter::new(LogLevel::Info.level().as_str()),
        |filter, name| {
            match format!("{}={}", name, config.level.level()).parse() {
                Ok(directive) => filter.add_directive(directive),
                Err(_) => filter,
            }
        },
    )
}

/// Initialize the logging system.
///
/// The subscriber is installed globally, so this must be called only once at
/// startup. Subsequent calls are ignored.
///
/// # Example
///
/// ```
/// let config = quarry_log::LogConfig {
///     enable_backtraces: true,
///     ..Default::default()
/// };
///
/// quarry_log::init(&config);
/// ```
pub fn init(config: &LogConfig) {
    if config.enable_backtraces {
        // SAFETY: in all supported configurations, `init` runs on the main
        // thread before any other threads are spawned.
        unsafe {
            env::set_var("RUST_BACKTRACE", "full");
        }
    }

    let filter = match env::var(EnvFilter::DEFAULT_ENV) {
        Ok(value) => EnvFilter::new(value),
        Err(_) => default_filters(config),
    };

    let format = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    let format = match (config.format, std::io::stderr().is_terminal()) {
        (LogFormat::Auto, true) | (LogFormat::Pretty, _) => {
            format.compact().without_time().boxed()
        }
        (LogFormat::Auto, false) | (LogFormat::Simplified, _) => format.with_ansi(false).boxed(),
        (LogFormat::Json, _) => format
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(format.with_filter(filter))
        .try_init()
        .ok();
}
