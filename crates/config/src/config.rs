use std::{fmt, path::PathBuf, time::Duration};

use alloy_primitives::Address;
use relayer_primitives::prelude::DestinationKind;
use serde::{de::Error as _, Deserialize, Deserializer};

use crate::errors::{ConfigError, ConfigResult};

/// Default value for `ledger.path` in [`LedgerConfig`].
pub const DEFAULT_LEDGER_PATH: &str = "processed-deposits.json";

const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;
const DEFAULT_POLL_LOOKBACK_BLOCKS: u64 = 2_000;
const DEFAULT_MAX_BLOCK_RANGE: u64 = 2_000;
const DEFAULT_RPC_RETRY_COUNT: u8 = 3;
const DEFAULT_RPC_RETRY_INTERVAL_MS: u64 = 1_000;
const DEFAULT_INIT_RETRIES: u16 = 5;
const DEFAULT_MAX_PARALLEL_PAYOUTS: usize = 3;
const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, Deserialize)]
pub struct RelayerConfig {
    pub source: SourceConfig,
    pub payout: PayoutConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    /// How long in-flight payouts get to finish once shutdown starts.
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

/// Source chain connection and watcher behaviour.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// HTTP JSON-RPC endpoint, used for polling and the confirmation gate.
    pub rpc_url: String,

    /// WebSocket endpoint. When set, deposits are received through a log subscription instead of
    /// polling.
    #[serde(default)]
    pub ws_url: Option<String>,

    /// Address of the bridge contract emitting `Deposit` events.
    pub contract_address: Address,

    /// How often to poll for new logs, also the confirmation gate's head polling interval.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// How far behind the head the poll cursor starts on a cold start.
    #[serde(default = "default_poll_lookback_blocks")]
    pub poll_lookback_blocks: u64,

    /// Widest block range requested in a single `eth_getLogs` call.
    #[serde(default = "default_max_block_range")]
    pub max_block_range: u64,

    /// Confirmations a deposit needs before it is paid out. `0` pays as soon as seen.
    #[serde(default)]
    pub required_confirmations: u64,

    /// Network level retries for a single RPC request.
    #[serde(default = "default_rpc_retry_count")]
    pub rpc_retry_count: u8,

    #[serde(default = "default_rpc_retry_interval_ms")]
    pub rpc_retry_interval_ms: u64,
}

impl SourceConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn rpc_retry_interval(&self) -> Duration {
        Duration::from_millis(self.rpc_retry_interval_ms)
    }
}

/// Destination chain account and the flat payout sent per deposit.
#[derive(Clone, Deserialize)]
pub struct PayoutConfig {
    #[serde(default)]
    pub kind: DestinationKind,

    pub rpc_url: String,

    /// Paying account on the destination chain.
    pub account: String,

    /// Signing credential: the account seed for xrpl, the node account passphrase for evm.
    pub secret: String,

    /// Destination network id. Required for evm, optional `NetworkID` field for xrpl.
    #[serde(default)]
    pub network_id: Option<u64>,

    /// Flat payout per deposit, in the destination chain's smallest unit.
    #[serde(deserialize_with = "deserialize_amount")]
    pub amount: u128,

    /// Initialization attempts after the first one before giving up.
    #[serde(default = "default_init_retries")]
    pub init_retries: u16,
}

impl fmt::Debug for PayoutConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PayoutConfig")
            .field("kind", &self.kind)
            .field("rpc_url", &self.rpc_url)
            .field("account", &self.account)
            .field("secret", &"<redacted>")
            .field("network_id", &self.network_id)
            .field("amount", &self.amount)
            .field("init_retries", &self.init_retries)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Upper bound on payouts being processed at the same time.
    #[serde(default = "default_max_parallel_payouts")]
    pub max_parallel_payouts: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_parallel_payouts: DEFAULT_MAX_PARALLEL_PAYOUTS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// Processed deposits file. The submission journal lives next to it with a `.pending` suffix.
    #[serde(default = "default_ledger_path")]
    pub path: PathBuf,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: default_ledger_path(),
        }
    }
}

impl RelayerConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Rejects settings that would make the relayer misbehave rather than fail loudly.
    pub fn validate(&self) -> ConfigResult<()> {
        let source = &self.source;
        check_url("source.rpc_url", &source.rpc_url, &["http://", "https://"])?;
        if let Some(ws_url) = &source.ws_url {
            check_url("source.ws_url", ws_url, &["ws://", "wss://"])?;
        }
        non_zero("source.poll_interval_ms", source.poll_interval_ms)?;
        non_zero("source.max_block_range", source.max_block_range)?;

        let payout = &self.payout;
        check_url("payout.rpc_url", &payout.rpc_url, &["http://", "https://"])?;
        if payout.account.trim().is_empty() {
            return Err(ConfigError::Missing {
                key: "payout.account",
                env: "RELAYER_DEST_ACCOUNT",
            });
        }
        if payout.secret.is_empty() {
            return Err(ConfigError::Missing {
                key: "payout.secret",
                env: "RELAYER_DEST_SECRET",
            });
        }
        if payout.amount == 0 {
            return Err(invalid("payout.amount", "must be greater than zero"));
        }
        if payout.kind == DestinationKind::Evm && payout.network_id.is_none() {
            return Err(ConfigError::Missing {
                key: "payout.network_id",
                env: "RELAYER_DEST_NETWORK_ID",
            });
        }

        non_zero(
            "dispatch.max_parallel_payouts",
            self.dispatch.max_parallel_payouts as u64,
        )?;

        if self.ledger.path.as_os_str().is_empty() {
            return Err(invalid("ledger.path", "must not be empty"));
        }

        Ok(())
    }
}

fn check_url(key: &'static str, url: &str, schemes: &[&str]) -> ConfigResult<()> {
    if schemes.iter().any(|s| url.starts_with(s)) {
        Ok(())
    } else {
        Err(invalid(key, format!("expected a {} url", schemes.join(" or "))))
    }
}

fn non_zero(key: &'static str, value: u64) -> ConfigResult<()> {
    if value == 0 {
        return Err(invalid(key, "must be greater than zero"));
    }
    Ok(())
}

fn invalid(key: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        reason: reason.into(),
    }
}

/// Accepts the payout amount either as a TOML integer or as a decimal string, since amounts in
/// wei do not fit the 64 bit integers TOML supports.
fn deserialize_amount<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum AmountRepr {
        Int(u64),
        Str(String),
    }

    match AmountRepr::deserialize(deserializer)? {
        AmountRepr::Int(v) => Ok(v.into()),
        AmountRepr::Str(s) => s
            .trim()
            .parse()
            .map_err(|e| D::Error::custom(format!("invalid amount '{s}': {e}"))),
    }
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_poll_lookback_blocks() -> u64 {
    DEFAULT_POLL_LOOKBACK_BLOCKS
}

fn default_max_block_range() -> u64 {
    DEFAULT_MAX_BLOCK_RANGE
}

fn default_rpc_retry_count() -> u8 {
    DEFAULT_RPC_RETRY_COUNT
}

fn default_rpc_retry_interval_ms() -> u64 {
    DEFAULT_RPC_RETRY_INTERVAL_MS
}

fn default_init_retries() -> u16 {
    DEFAULT_INIT_RETRIES
}

fn default_max_parallel_payouts() -> usize {
    DEFAULT_MAX_PARALLEL_PAYOUTS
}

fn default_shutdown_timeout_ms() -> u64 {
    DEFAULT_SHUTDOWN_TIMEOUT_MS
}

fn default_ledger_path() -> PathBuf {
    DEFAULT_LEDGER_PATH.into()
}

#[cfg(test)]
mod test {
    use super::*;

    const MINIMAL: &str = r#"
        [source]
        rpc_url = "http://localhost:8545"
        contract_address = "0x5fbdb2315678afecb367f032d93f642f64180aa3"

        [payout]
        rpc_url = "https://s.altnet.rippletest.net:51234"
        account = "rPT1Sjq2YGrBMTttX4GZHjKu9dyfzbpAYe"
        secret = "snoPBrXtMeMyMHUVTgbuqAfg1SUTb"
        amount = 1000000
    "#;

    #[test]
    fn test_config_load_defaults() {
        let config = toml::from_str::<RelayerConfig>(MINIMAL).unwrap();

        assert_eq!(config.source.poll_interval_ms, 5_000);
        assert_eq!(config.source.poll_lookback_blocks, 2_000);
        assert_eq!(config.source.required_confirmations, 0);
        assert_eq!(config.source.ws_url, None);
        assert_eq!(config.payout.kind, DestinationKind::Xrpl);
        assert_eq!(config.payout.amount, 1_000_000);
        assert_eq!(config.payout.init_retries, 5);
        assert_eq!(config.dispatch.max_parallel_payouts, 3);
        assert_eq!(config.ledger.path, PathBuf::from(DEFAULT_LEDGER_PATH));
        assert_eq!(config.shutdown_timeout_ms, 30_000);
        config.validate().unwrap();
    }

    #[test]
    fn test_amount_as_string() {
        let cfg = MINIMAL.replace("amount = 1000000", r#"amount = "20000000000000000000""#);
        let config = toml::from_str::<RelayerConfig>(&cfg).unwrap();
        assert_eq!(config.payout.amount, 20_000_000_000_000_000_000);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = toml::from_str::<RelayerConfig>(MINIMAL).unwrap();
        let dbg = format!("{config:?}");
        assert!(!dbg.contains("snoPBrXtMeMyMHUVTgbuqAfg1SUTb"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn test_validate_rejects_zero_parallelism() {
        let mut config = toml::from_str::<RelayerConfig>(MINIMAL).unwrap();
        config.dispatch.max_parallel_payouts = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                key: "dispatch.max_parallel_payouts",
                ..
            })
        ));
    }

    #[test]
    fn test_validate_rejects_zero_amount_and_interval() {
        let mut config = toml::from_str::<RelayerConfig>(MINIMAL).unwrap();
        config.payout.amount = 0;
        assert!(config.validate().is_err());

        let mut config = toml::from_str::<RelayerConfig>(MINIMAL).unwrap();
        config.source.poll_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_evm_requires_network_id() {
        let mut config = toml::from_str::<RelayerConfig>(MINIMAL).unwrap();
        config.payout.kind = DestinationKind::Evm;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Missing {
                key: "payout.network_id",
                ..
            })
        ));

        config.payout.network_id = Some(1440002);
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_missing_secret_and_bad_ws_url() {
        let mut config = toml::from_str::<RelayerConfig>(MINIMAL).unwrap();
        config.payout.secret.clear();
        assert!(matches!(config.validate(), Err(ConfigError::Missing { .. })));

        let mut config = toml::from_str::<RelayerConfig>(MINIMAL).unwrap();
        config.source.ws_url = Some("http://localhost:8546".to_string());
        assert!(config.validate().is_err());
    }
}
