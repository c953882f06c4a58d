//! Logging for Trellis.
//!
//! Every component logs through `tracing` with key-value fields. This module
//! re-exports the macros and installs a subscriber from a [`LogConfig`],
//! usually derived from the `log` section of the application options.
//!
//! ```no_run
//! use trellis_core::logging::*;
//!
//! let _guard = LogConfig {
//!     level: LogLevel::Debug,
//!     format: LogFormat::Pretty,
//!     ..LogConfig::default()
//! }
//! .init()
//! .expect("logging");
//!
//! info!(modules = 3, "application assembled");
//! ```

use crate::options::LogOptions;
use crate::Error;
use std::str::FromStr;
use tracing::Level;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{self, RollingFileAppender};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

pub use tracing::{debug, error, info, info_span, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Level name as accepted by `tracing`, plus `warning`.
    pub fn parse(value: &str) -> Option<Self> {
        if value.eq_ignore_ascii_case("warning") {
            return Some(LogLevel::Warn);
        }
        // tracing also accepts 1..=5; level names only here
        if value.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        Level::from_str(value).ok().map(Self::from)
    }
}

impl From<Level> for LogLevel {
    fn from(level: Level) -> Self {
        [
            (Level::TRACE, LogLevel::Trace),
            (Level::DEBUG, LogLevel::Debug),
            (Level::INFO, LogLevel::Info),
            (Level::WARN, LogLevel::Warn),
        ]
        .into_iter()
        .find(|(candidate, _)| *candidate == level)
        .map_or(LogLevel::Error, |(_, mapped)| mapped)
    }
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Plain,
    Pretty,
    Compact,
}

impl LogFormat {
    pub fn parse(value: &str) -> Option<Self> {
        [
            ("json", LogFormat::Json),
            ("plain", LogFormat::Plain),
            ("pretty", LogFormat::Pretty),
            ("compact", LogFormat::Compact),
        ]
        .into_iter()
        .find(|(name, _)| value.eq_ignore_ascii_case(name))
        .map(|(_, format)| format)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    Stderr,
    /// Appends to a single file
    File(String),
    RollingFile {
        directory: String,
        prefix: String,
        rotation: Rotation,
    },
}

impl LogOutput {
    fn writer(&self) -> Result<(NonBlocking, WorkerGuard), Error> {
        Ok(match self {
            LogOutput::Stdout => tracing_appender::non_blocking(std::io::stdout()),
            LogOutput::Stderr => tracing_appender::non_blocking(std::io::stderr()),
            LogOutput::File(path) => tracing_appender::non_blocking(
                std::fs::OpenOptions::new().create(true).append(true).open(path)?,
            ),
            LogOutput::RollingFile {
                directory,
                prefix,
                rotation,
            } => tracing_appender::non_blocking(RollingFileAppender::new(
                (*rotation).into(),
                directory,
                prefix,
            )),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    Minutely,
    Hourly,
    Daily,
    Never,
}

impl From<Rotation> for rolling::Rotation {
    fn from(rotation: Rotation) -> Self {
        match rotation {
            Rotation::Minutely => rolling::Rotation::MINUTELY,
            Rotation::Hourly => rolling::Rotation::HOURLY,
            Rotation::Daily => rolling::Rotation::DAILY,
            Rotation::Never => rolling::Rotation::NEVER,
        }
    }
}

/// Subscriber settings. Defaults to JSON on stdout at `info`.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    pub output: LogOutput,
    pub thread_ids: bool,
    pub targets: bool,
    pub file_line: bool,
    /// Emit span close events, which carry request timings
    pub spans: bool,
    pub ansi: bool,
    /// Filter directives such as `trellis_core=debug`; replaces `level`
    pub filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Json,
            output: LogOutput::Stdout,
            thread_ids: false,
            targets: true,
            file_line: false,
            spans: false,
            ansi: false,
            filter: None,
        }
    }
}

impl LogConfig {
    /// Settings for the `log` section of the application options.
    /// Unrecognised names keep the defaults.
    pub fn from_options(options: &LogOptions) -> Self {
        let defaults = Self::default();
        Self {
            level: LogLevel::parse(&options.level).unwrap_or(defaults.level),
            format: LogFormat::parse(&options.format).unwrap_or(defaults.format),
            filter: options.filter.clone(),
            ..defaults
        }
    }

    /// Explicit directives first, then `RUST_LOG`, then the level.
    fn env_filter(&self) -> EnvFilter {
        let level = Level::from(self.level);
        self.filter
            .as_deref()
            .and_then(|directives| EnvFilter::try_new(directives).ok())
            .or_else(|| EnvFilter::try_from_default_env().ok())
            .unwrap_or_else(|| EnvFilter::new(level.as_str()))
    }

    fn layer(&self, writer: NonBlocking) -> Box<dyn Layer<Registry> + Send + Sync> {
        let span_events = if self.spans { FmtSpan::CLOSE } else { FmtSpan::NONE };
        let base = fmt::layer()
            .with_writer(writer)
            .with_target(self.targets)
            .with_thread_ids(self.thread_ids)
            .with_file(self.file_line)
            .with_line_number(self.file_line)
            .with_span_events(span_events);

        match self.format {
            LogFormat::Json => base
                .json()
                .with_current_span(self.spans)
                .with_span_list(self.spans)
                .boxed(),
            LogFormat::Plain => base.with_ansi(self.ansi).boxed(),
            LogFormat::Pretty => base.pretty().with_ansi(self.ansi).boxed(),
            LogFormat::Compact => base.compact().with_ansi(self.ansi).boxed(),
        }
    }

    /// Install the global subscriber.
    ///
    /// Keep the guard alive for as long as logs should be flushed. When a
    /// subscriber is already installed it stays in place.
    pub fn init(self) -> Result<WorkerGuard, Error> {
        let (writer, guard) = self.output.writer()?;
        let installed = tracing_subscriber::registry()
            .with(self.layer(writer))
            .with(self.env_filter())
            .try_init();
        if installed.is_err() {
            debug!("subscriber already installed");
        }
        Ok(guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_names() {
        assert_eq!(LogLevel::parse("WARNING"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse("debug"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::parse("3"), None);
        assert_eq!(LogLevel::parse("loud"), None);
        assert_eq!(Level::from(LogLevel::Trace), Level::TRACE);
    }

    #[test]
    fn test_format_names() {
        assert_eq!(LogFormat::parse("Pretty"), Some(LogFormat::Pretty));
        assert_eq!(LogFormat::parse("xml"), None);
    }

    #[test]
    fn test_from_options() {
        let options = LogOptions {
            level: "debug".to_string(),
            format: "compact".to_string(),
            filter: None,
        };
        let config = LogConfig::from_options(&options);
        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.format, LogFormat::Compact);
        assert_eq!(config.output, LogOutput::Stdout);

        let options = LogOptions {
            level: "nonsense".to_string(),
            format: "xml".to_string(),
            filter: Some("trellis_core=trace".to_string()),
        };
        let config = LogConfig::from_options(&options);
        assert_eq!(config.level, LogLevel::Info);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.filter.as_deref(), Some("trellis_core=trace"));
    }
}
