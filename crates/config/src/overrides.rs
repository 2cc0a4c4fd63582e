use relayer_common::env::parse_env_with;
use relayer_primitives::prelude::DestinationKind;
use toml::value::Table;

use crate::errors::{ConfigError, ConfigResult};

/// A config path such as `source.rpc_url` and the value to put there.
pub type Override = (String, toml::Value);

/// How an environment variable's raw string is turned into a TOML value.
#[derive(Debug, Clone, Copy)]
pub enum EnvValue {
    Str,
    Int,
    /// Decimal amount that may exceed `i64`, kept as a string.
    Amount,
    Kind,
}

/// Environment variables read by the relayer and the config path each one overrides.
pub const ENV_OVERRIDES: &[(&str, &str, EnvValue)] = &[
    ("RELAYER_SOURCE_RPC_URL", "source.rpc_url", EnvValue::Str),
    ("RELAYER_SOURCE_WS_URL", "source.ws_url", EnvValue::Str),
    ("RELAYER_BRIDGE_CONTRACT", "source.contract_address", EnvValue::Str),
    ("RELAYER_POLL_INTERVAL_MS", "source.poll_interval_ms", EnvValue::Int),
    ("RELAYER_POLL_LOOKBACK_BLOCKS", "source.poll_lookback_blocks", EnvValue::Int),
    ("RELAYER_MAX_BLOCK_RANGE", "source.max_block_range", EnvValue::Int),
    ("RELAYER_REQUIRED_CONFIRMATIONS", "source.required_confirmations", EnvValue::Int),
    ("RELAYER_SOURCE_RPC_RETRIES", "source.rpc_retry_count", EnvValue::Int),
    ("RELAYER_SOURCE_RPC_RETRY_INTERVAL_MS", "source.rpc_retry_interval_ms", EnvValue::Int),
    ("RELAYER_DEST_KIND", "payout.kind", EnvValue::Kind),
    ("RELAYER_DEST_RPC_URL", "payout.rpc_url", EnvValue::Str),
    ("RELAYER_DEST_ACCOUNT", "payout.account", EnvValue::Str),
    ("RELAYER_DEST_SECRET", "payout.secret", EnvValue::Str),
    ("RELAYER_DEST_NETWORK_ID", "payout.network_id", EnvValue::Int),
    ("RELAYER_PAYOUT_AMOUNT", "payout.amount", EnvValue::Amount),
    ("RELAYER_PAYOUT_INIT_RETRIES", "payout.init_retries", EnvValue::Int),
    ("RELAYER_MAX_PARALLEL_PAYOUTS", "dispatch.max_parallel_payouts", EnvValue::Int),
    ("RELAYER_PROCESSED_FILE", "ledger.path", EnvValue::Str),
    ("RELAYER_SHUTDOWN_TIMEOUT_MS", "shutdown_timeout_ms", EnvValue::Int),
];

/// Collects the overrides present in the environment, as seen through `lookup`.
pub fn env_overrides<L>(lookup: L) -> ConfigResult<Vec<Override>>
where
    L: Fn(&str) -> Option<String>,
{
    let mut overrides = Vec::new();
    for (var, path, kind) in ENV_OVERRIDES {
        let value = match kind {
            EnvValue::Str => parse_env_with::<String, _>(var, &lookup)?.map(toml::Value::String),
            EnvValue::Int => parse_env_with::<i64, _>(var, &lookup)?.map(toml::Value::Integer),
            EnvValue::Amount => parse_env_with::<u128, _>(var, &lookup)?
                .map(|v| toml::Value::String(v.to_string())),
            EnvValue::Kind => parse_env_with::<DestinationKind, _>(var, &lookup)?
                .map(|v| toml::Value::String(v.to_string())),
        };

        if let Some(value) = value {
            overrides.push((path.to_string(), value));
        }
    }
    Ok(overrides)
}

/// Parses an override of the form `<path>=<value>`. The value is taken as an integer if it looks
/// like one and as a string otherwise.
pub fn parse_override(override_str: &str) -> ConfigResult<Override> {
    let (key, value_str) = override_str
        .split_once('=')
        .ok_or_else(|| ConfigError::InvalidOverride(override_str.to_string()))?;
    let value = value_str
        .parse::<i64>()
        .map(toml::Value::Integer)
        .unwrap_or_else(|_| toml::Value::String(value_str.to_string()));
    Ok((key.to_string(), value))
}

/// Apply override to config, creating intermediate tables that do not exist yet.
pub fn apply_override(path: &str, value: toml::Value, table: &mut Table) -> ConfigResult<()> {
    match path.split_once('.') {
        None => {
            table.insert(path.to_string(), value);
            Ok(())
        }
        Some((key, rest)) => {
            let entry = table
                .entry(key.to_string())
                .or_insert_with(|| toml::Value::Table(Table::new()));
            match entry.as_table_mut() {
                Some(t) => apply_override(rest, value, t),
                None => Err(ConfigError::TraverseNonTableAt(key.to_string())),
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_env_overrides_typed() {
        let lookup = lookup_from(&[
            ("RELAYER_DEST_SECRET", "123456"),
            ("RELAYER_MAX_PARALLEL_PAYOUTS", "7"),
            ("RELAYER_PAYOUT_AMOUNT", "20000000000000000000"),
            ("RELAYER_DEST_KIND", "ETH"),
        ]);

        let overrides: HashMap<_, _> = env_overrides(lookup).unwrap().into_iter().collect();

        // numeric looking secrets stay strings
        assert_eq!(
            overrides["payout.secret"],
            toml::Value::String("123456".into())
        );
        assert_eq!(
            overrides["dispatch.max_parallel_payouts"],
            toml::Value::Integer(7)
        );
        assert_eq!(
            overrides["payout.amount"],
            toml::Value::String("20000000000000000000".into())
        );
        assert_eq!(overrides["payout.kind"], toml::Value::String("evm".into()));
    }

    #[test]
    fn test_env_overrides_rejects_garbage() {
        let lookup = lookup_from(&[("RELAYER_POLL_INTERVAL_MS", "soon")]);
        assert!(matches!(env_overrides(lookup), Err(ConfigError::Env(_))));
    }

    #[test]
    fn test_apply_override_creates_tables() {
        let mut table = Table::new();
        apply_override(
            "source.rpc_url",
            toml::Value::String("http://node".into()),
            &mut table,
        )
        .unwrap();
        apply_override("shutdown_timeout_ms", toml::Value::Integer(5), &mut table).unwrap();

        assert_eq!(
            table["source"]["rpc_url"],
            toml::Value::String("http://node".into())
        );
        assert_eq!(table["shutdown_timeout_ms"], toml::Value::Integer(5));

        let err = apply_override(
            "shutdown_timeout_ms.inner",
            toml::Value::Integer(1),
            &mut table,
        );
        assert!(matches!(err, Err(ConfigError::TraverseNonTableAt(_))));
    }

    #[test]
    fn test_parse_override() {
        let (path, value) = parse_override("ledger.path=/var/lib/relayer/done.json").unwrap();
        assert_eq!(path, "ledger.path");
        assert_eq!(
            value,
            toml::Value::String("/var/lib/relayer/done.json".into())
        );

        assert!(parse_override("no-equals-sign").is_err());
    }
}
