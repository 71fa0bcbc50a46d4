//! Crate-level error type

use crate::config::ConfigError;
use crate::lambda::LambdaError;
use crate::runtime::BindError;
use std::fmt;

/// Any failure surfaced by `pylambda::init` and friends
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    Config(ConfigError),
    Bind(BindError),
    Lambda(LambdaError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(err) => write!(f, "{}", err),
            Self::Bind(err) => write!(f, "{}", err),
            Self::Lambda(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Bind(err) => Some(err),
            Self::Lambda(err) => Some(err),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

impl From<BindError> for Error {
    fn from(err: BindError) -> Self {
        Self::Bind(err)
    }
}

impl From<LambdaError> for Error {
    fn from(err: LambdaError) -> Self {
        Self::Lambda(err)
    }
}
