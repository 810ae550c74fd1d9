use crate::{anyhow_loc, function_name};
use anyhow::Result;
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use tracing::{Event, Subscriber};
use tracing_chrome::FlushGuard;
use tracing_subscriber::fmt::format::{self, FormatEvent, FormatFields};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
    /// FullVerbose enables trace-level logging AND verbose output from external tools (cmake, cl.exe)
    FullVerbose,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
            LogLevel::FullVerbose => "trace", // FullVerbose uses trace for tracing crate
        }
    }

    /// Returns true if this log level enables verbose output from external tools
    pub fn is_verbose_tools(&self) -> bool {
        matches!(self, LogLevel::FullVerbose)
    }
}

impl std::str::FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            "fullverbose" => Ok(LogLevel::FullVerbose),
            _ => Err(anyhow_loc!(
                "Invalid log level '{}'. Valid options are: error, warn, info, debug, trace, fullverbose",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
    Compact,
    Simple,
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            "compact" => Ok(LogFormat::Compact),
            "simple" => Ok(LogFormat::Simple),
            _ => Err(anyhow_loc!(
                "Invalid log format '{}'. Valid options are: pretty, json, compact, simple",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    Stdout,
    File { path: PathBuf },
    Both { path: PathBuf },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    #[serde(default = "default_log_format")]
    pub format: LogFormat,

    #[serde(default = "default_log_output")]
    pub output: LogOutput,
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

fn default_log_format() -> LogFormat {
    LogFormat::Simple
}

fn default_log_output() -> LogOutput {
    LogOutput::Stdout
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            output: default_log_output(),
        }
    }
}

/// A custom event format that doesn't include span context in the output.
/// This keeps console logs clean while spans are still captured for profiling.
pub struct PlainEventFormat;

impl<S, N> FormatEvent<S, N> for PlainEventFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        let level = metadata.level();

        // Write level with ANSI colors if supported
        if writer.has_ansi_escapes() {
            // ANSI color codes: ERROR=red, WARN=yellow, INFO=green, DEBUG=blue, TRACE=magenta
            let color_code = match *level {
                tracing::Level::ERROR => "\x1b[31m",
                tracing::Level::WARN => "\x1b[33m",
                tracing::Level::INFO => "\x1b[32m",
                tracing::Level::DEBUG => "\x1b[34m",
                tracing::Level::TRACE => "\x1b[35m",
            };
            write!(writer, "{}{:>5}\x1b[0m ", color_code, level)?;
        } else {
            write!(writer, "{:>5} ", level)?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

fn stdout_layer<S>(format: LogFormat) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a> + Send + Sync,
{
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::layer().pretty().boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .compact()
            .with_target(false)
            .without_time()
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        LogFormat::Simple => tracing_subscriber::fmt::layer().event_format(PlainEventFormat).boxed(),
    }
}

pub fn init_logging(config: &LogConfig) -> Result<()> {
    let filter = EnvFilter::new(config.level.as_str());

    match &config.output {
        LogOutput::Stdout => {
            tracing_subscriber::registry().with(filter).with(stdout_layer(config.format)).init();
        }
        LogOutput::File { path } => {
            let file_appender = tracing_appender::rolling::never(
                path.parent().unwrap_or_else(|| std::path::Path::new(".")),
                path.file_name().unwrap_or_else(|| std::ffi::OsStr::new("maat.log")),
            );
            let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

            let file_layer = tracing_subscriber::fmt::layer().json().with_writer(non_blocking).boxed();

            tracing_subscriber::registry().with(filter).with(file_layer).init();

            // Store guard to prevent it from being dropped
            std::mem::forget(_guard);
        }
        LogOutput::Both { path } => {
            let file_appender = tracing_appender::rolling::never(
                path.parent().unwrap_or_else(|| std::path::Path::new(".")),
                path.file_name().unwrap_or_else(|| std::ffi::OsStr::new("maat.log")),
            );
            let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

            let file_layer = tracing_subscriber::fmt::layer().json().with_writer(non_blocking).boxed();

            tracing_subscriber::registry()
                .with(filter)
                .with(stdout_layer(config.format))
                .with(file_layer)
                .init();

            // Store guard to prevent it from being dropped
            std::mem::forget(_guard);
        }
    }

    tracing::debug!("Logging initialized with {} level", config.level.as_str());

    Ok(())
}

/// Initialize logging with chrome tracing support for profiling.
/// Returns a guard that MUST be held until the program exits to ensure the trace is flushed.
///
/// Console output uses PlainEventFormat so span context from the profile
/// layers doesn't clutter normal log lines.
pub fn init_logging_with_profile(config: &LogConfig, trace_path: &PathBuf) -> Result<FlushGuard> {
    let filter = EnvFilter::new(config.level.as_str());

    let (chrome_layer, guard) =
        tracing_chrome::ChromeLayerBuilder::new().file(trace_path).include_args(true).build();

    let console_layer = tracing_subscriber::fmt::layer().event_format(PlainEventFormat).boxed();

    tracing_subscriber::registry().with(filter).with(console_layer).with(chrome_layer).init();

    tracing::info!("Profiling enabled, trace will be written to: {:?}", trace_path);

    Ok(guard)
}
