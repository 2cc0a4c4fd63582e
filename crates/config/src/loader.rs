use std::{env, fs, path::Path};

use toml::value::Table;

use crate::{
    config::RelayerConfig,
    errors::{ConfigError, ConfigResult},
    overrides::{apply_override, env_overrides, Override},
};

/// Loads the config from an optional TOML file, the process environment and `extra` overrides,
/// in increasing order of precedence, and validates the result.
pub fn load(path: Option<&Path>, extra: Vec<Override>) -> ConfigResult<RelayerConfig> {
    let file = match path {
        Some(path) => Some(fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?),
        None => None,
    };

    load_with(file.as_deref(), |var| env::var(var).ok(), extra)
}

/// Same as [`load`] with the file contents and the environment passed in.
pub fn load_with<L>(
    file: Option<&str>,
    lookup: L,
    extra: Vec<Override>,
) -> ConfigResult<RelayerConfig>
where
    L: Fn(&str) -> Option<String>,
{
    let mut table = match file {
        Some(contents) => toml::from_str::<Table>(contents)?,
        None => Table::new(),
    };

    for (path, value) in env_overrides(lookup)?.into_iter().chain(extra) {
        apply_override(&path, value, &mut table)?;
    }

    let config: RelayerConfig = toml::Value::Table(table).try_into()?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod test {
    use std::{collections::HashMap, path::PathBuf};

    use relayer_primitives::prelude::DestinationKind;

    use super::*;

    fn base_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("RELAYER_SOURCE_RPC_URL", "http://localhost:8545"),
            (
                "RELAYER_BRIDGE_CONTRACT",
                "0x5fbdb2315678afecb367f032d93f642f64180aa3",
            ),
            ("RELAYER_DEST_RPC_URL", "http://localhost:5005"),
            ("RELAYER_DEST_ACCOUNT", "rPT1Sjq2YGrBMTttX4GZHjKu9dyfzbpAYe"),
            ("RELAYER_DEST_SECRET", "snoPBrXtMeMyMHUVTgbuqAfg1SUTb"),
            ("RELAYER_PAYOUT_AMOUNT", "1000000"),
        ])
    }

    fn lookup(env: HashMap<&'static str, &'static str>) -> impl Fn(&str) -> Option<String> {
        move |k| env.get(k).map(|v| v.to_string())
    }

    #[test]
    fn test_load_from_env_only() {
        let config = load_with(None, lookup(base_env()), vec![]).unwrap();

        assert_eq!(config.source.rpc_url, "http://localhost:8545");
        assert_eq!(config.payout.kind, DestinationKind::Xrpl);
        assert_eq!(config.payout.amount, 1_000_000);
        assert_eq!(config.dispatch.max_parallel_payouts, 3);
    }

    #[test]
    fn test_env_overrides_file() {
        let file = r#"
            shutdown_timeout_ms = 1000

            [source]
            rpc_url = "http://file-node:8545"
            contract_address = "0x5fbdb2315678afecb367f032d93f642f64180aa3"
            required_confirmations = 12

            [dispatch]
            max_parallel_payouts = 10
        "#;

        let mut env = base_env();
        env.remove("RELAYER_BRIDGE_CONTRACT");
        env.insert("RELAYER_MAX_PARALLEL_PAYOUTS", "2");

        let config = load_with(Some(file), lookup(env), vec![]).unwrap();

        assert_eq!(config.source.rpc_url, "http://localhost:8545");
        assert_eq!(config.source.required_confirmations, 12);
        assert_eq!(config.dispatch.max_parallel_payouts, 2);
        assert_eq!(config.shutdown_timeout_ms, 1000);
    }

    #[test]
    fn test_extra_overrides_win() {
        let mut env = base_env();
        env.insert("RELAYER_PROCESSED_FILE", "/from/env.json");

        let extra = vec![(
            "ledger.path".to_string(),
            toml::Value::String("/from/args.json".into()),
        )];
        let config = load_with(None, lookup(env), extra).unwrap();

        assert_eq!(config.ledger.path, PathBuf::from("/from/args.json"));
    }

    #[test]
    fn test_missing_required_fails() {
        let mut env = base_env();
        env.remove("RELAYER_DEST_RPC_URL");

        let err = load_with(None, lookup(env), vec![]).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)), "got {err}");
    }

    #[test]
    fn test_invalid_values_fail_validation() {
        let mut env = base_env();
        env.insert("RELAYER_MAX_PARALLEL_PAYOUTS", "0");

        let err = load_with(None, lookup(env), vec![]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }), "got {err}");
    }
}
