//! Logging setup on top of `tracing`
//!
//! The library itself only emits events (targets `pylambda::runtime`,
//! `pylambda::registry`, `pylambda::lambda`, `pylambda::exec`). Hosts that do
//! not install their own subscriber can call `init_logging`.

use std::path::Path;
use std::str::FromStr;
use tracing::Level;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

pub const LEVEL_ENV: &str = "PYLAMBDA_LOG_LEVEL";
pub const FILE_ENV: &str = "PYLAMBDA_LOG_FILE";
pub const JSON_ENV: &str = "PYLAMBDA_LOG_JSON";

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("Unknown log format: {}", other)),
        }
    }
}

/// Log output destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    Stderr,
    /// Daily-rotated file `<directory>/<prefix>.<date>`
    File { directory: String, prefix: String },
}

impl LogOutput {
    /// File output for a path like `logs/pylambda.log`
    pub fn file(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let directory = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| ".".to_string(), |p| p.to_string_lossy().into_owned());
        let prefix = path
            .file_name()
            .map_or_else(|| "pylambda.log".to_string(), |n| n.to_string_lossy().into_owned());
        Self::File { directory, prefix }
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    pub format: LogFormat,
    pub output: LogOutput,
    /// Emit span open/close events
    pub span_events: bool,
    /// Extra filter directives (e.g. "pylambda::registry=trace")
    pub filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Compact,
            output: LogOutput::Stderr,
            span_events: false,
            filter: None,
        }
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.span_events = enabled;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Defaults overridden by `PYLAMBDA_LOG_LEVEL`, `PYLAMBDA_LOG_FILE` and
    /// `PYLAMBDA_LOG_JSON`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(level) = lookup(LEVEL_ENV).and_then(|v| Level::from_str(v.trim()).ok()) {
            config.level = level;
        }
        if let Some(path) = lookup(FILE_ENV).filter(|v| !v.trim().is_empty()) {
            config.output = LogOutput::file(path.trim());
        }
        if lookup(JSON_ENV).is_some_and(|v| matches!(v.trim(), "1" | "true" | "yes")) {
            config.format = LogFormat::Json;
        }
        config
    }
}

/// Install a global subscriber for `config`
///
/// Returns the writer's guard; keep it alive until exit so buffered events
/// are flushed. Returns `None` if a global subscriber is already installed.
pub fn init_logging(config: LogConfig) -> Option<WorkerGuard> {
    let (writer, guard) = match &config.output {
        LogOutput::Stdout => tracing_appender::non_blocking(std::io::stdout()),
        LogOutput::Stderr => tracing_appender::non_blocking(std::io::stderr()),
        LogOutput::File { directory, prefix } => {
            tracing_appender::non_blocking(rolling::daily(directory, prefix))
        }
    };

    install(writer, &config).then_some(guard)
}

fn install(writer: NonBlocking, config: &LogConfig) -> bool {
    let filter = build_filter(config);
    let spans = span_events_config(config.span_events);
    let layer = fmt::layer().with_writer(writer).with_span_events(spans);

    let layer = match config.format {
        LogFormat::Pretty => layer.pretty().with_filter(filter).boxed(),
        LogFormat::Compact => layer.compact().with_filter(filter).boxed(),
        LogFormat::Json => layer.json().with_filter(filter).boxed(),
    };

    tracing_subscriber::registry().with(layer).try_init().is_ok()
}

fn build_filter(config: &LogConfig) -> EnvFilter {
    let base = EnvFilter::from_default_env().add_directive(config.level.into());

    match &config.filter {
        Some(directives) => directives
            .split(',')
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .fold(base, |filter, directive| match directive.parse() {
                Ok(parsed) => filter.add_directive(parsed),
                Err(_) => {
                    tracing::warn!("Invalid filter directive: {}", directive);
                    filter
                }
            }),
        None => base,
    }
}

fn span_events_config(enabled: bool) -> FmtSpan {
    if enabled {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    }
}

/// Verbose stderr logging for development
pub fn init_dev_logging() -> Option<WorkerGuard> {
    init_logging(LogConfig {
        level: Level::DEBUG,
        format: LogFormat::Pretty,
        output: LogOutput::Stderr,
        span_events: true,
        filter: Some("pylambda=debug".to_string()),
    })
}
