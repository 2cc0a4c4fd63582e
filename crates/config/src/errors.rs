use std::path::PathBuf;

use relayer_common::env::EnvParseError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    Env(#[from] EnvParseError),

    #[error("invalid override '{0}', expected <path>=<value>")]
    InvalidOverride(String),

    #[error("cannot override '{0}': it is not a table")]
    TraverseNonTableAt(String),

    #[error("missing required setting {key} (env {env})")]
    Missing {
        key: &'static str,
        env: &'static str,
    },

    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;
