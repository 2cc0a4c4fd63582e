//! Relayer configuration.
//!
//! Settings come from an optional TOML file, then environment variables, then command line
//! overrides, each layer replacing values of the one before it.

mod config;
mod errors;
mod loader;
mod overrides;

pub use config::{
    DispatchConfig, LedgerConfig, PayoutConfig, RelayerConfig, SourceConfig,
    DEFAULT_LEDGER_PATH,
};
pub use errors::{ConfigError, ConfigResult};
pub use loader::{load, load_with};
pub use overrides::{apply_override, env_overrides, parse_override, Override, ENV_OVERRIDES};
