//! Configuration file (`pylambda.toml`)
//!
//! ```toml
//! [runtime]
//! library = "/usr/lib/libpython3.12.so.1.0"
//! initialize = true
//! show_errors = true
//!
//! [interactive]
//! magic_marker = "%"
//!
//! [logging]
//! level = "info"
//! format = "compact"
//! json = false
//! file = "logs/pylambda.log"
//! ```

use crate::logging::{LogConfig, LogFormat, LogOutput};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, Level};

/// File names `discover` looks for, in order
pub const CONFIG_FILE_NAMES: &[&str] = &["pylambda.toml", ".pylambda.toml"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub runtime: RuntimeConfig,

    #[serde(default)]
    pub interactive: InteractiveConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Interpreter shared library; falls back to `$PYLAMBDA_LIBRARY`, then
    /// the platform's usual names
    #[serde(default)]
    pub library: Option<PathBuf>,

    /// Call `Py_Initialize` when the host has not started the interpreter
    #[serde(default = "default_true")]
    pub initialize: bool,

    /// Print interpreter tracebacks instead of clearing them silently
    #[serde(default = "default_true")]
    pub show_errors: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractiveConfig {
    #[serde(default = "default_marker")]
    pub magic_marker: char,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default = "default_format")]
    pub format: String,

    /// Shorthand for `format = "json"`
    #[serde(default)]
    pub json: bool,

    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            library: None,
            initialize: true,
            show_errors: true,
        }
    }
}

impl Default for InteractiveConfig {
    fn default() -> Self {
        Self { magic_marker: default_marker() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
            json: false,
            file: None,
        }
    }
}

fn default_true() -> bool { true }
fn default_marker() -> char { crate::exec::DEFAULT_MAGIC_MARKER }
fn default_level() -> String { "info".to_string() }
fn default_format() -> String { "compact".to_string() }

impl LoggingConfig {
    /// Resolve into a subscriber configuration
    pub fn to_log_config(&self) -> Result<LogConfig, ConfigError> {
        let level = Level::from_str(&self.level)
            .map_err(|_| ConfigError::Invalid(format!("unknown log level '{}'", self.level)))?;
        let format = if self.json {
            LogFormat::Json
        } else {
            LogFormat::from_str(&self.format).map_err(ConfigError::Invalid)?
        };
        let output = match &self.file {
            Some(path) => LogOutput::file(path),
            None => LogOutput::Stderr,
        };
        Ok(LogConfig::new().with_level(level).with_format(format).with_output(output))
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Nearest config file from the current directory upwards, or defaults
    pub fn discover() -> Self {
        std::env::current_dir()
            .ok()
            .and_then(|dir| Self::discover_from(&dir))
            .unwrap_or_default()
    }

    /// Nearest loadable config file from `start` upwards
    pub fn discover_from(start: &Path) -> Option<Self> {
        start.ancestors().find_map(|dir| {
            CONFIG_FILE_NAMES.iter().find_map(|name| {
                let path = dir.join(name);
                if !path.exists() {
                    return None;
                }
                match Self::load(&path) {
                    Ok(config) => {
                        debug!(path = %path.display(), "config loaded");
                        Some(config)
                    }
                    Err(err) => {
                        debug!(path = %path.display(), error = %err, "config skipped");
                        None
                    }
                }
            })
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        fs::write(path, content).map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))
    }

    /// Commented starter file
    pub fn generate_default() -> String {
        format!(
            r#"# pylambda configuration

[runtime]
# Interpreter shared library (default: $PYLAMBDA_LIBRARY, then libpython3.so et al.)
# library = "/usr/lib/x86_64-linux-gnu/libpython3.12.so.1.0"
initialize = true
show_errors = true

[interactive]
magic_marker = "{}"

[logging]
level = "info"
format = "compact"   # pretty | compact | json
json = false
# file = "logs/pylambda.log"
"#,
            default_marker()
        )
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let marker = self.interactive.magic_marker;
        if marker.is_alphanumeric() || marker.is_whitespace() || marker == '_' {
            return Err(ConfigError::Invalid(format!(
                "magic_marker '{}' would collide with ordinary source lines",
                marker
            )));
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "Failed to read config: {}", msg),
            Self::Parse(msg) => write!(f, "Failed to parse config: {}", msg),
            Self::Invalid(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
