use std::path::PathBuf;

use anyhow::anyhow;
use argh::FromArgs;
use relayer_config::{parse_override, Override};

#[derive(Debug, Clone, FromArgs)]
#[argh(description = "Pays out bridge deposits seen on the source chain on the destination chain")]
pub(crate) struct Args {
    // Config non-overriding args
    #[argh(
        option,
        short = 'c',
        description = "path to a TOML configuration, environment variables take precedence over it"
    )]
    pub config: Option<PathBuf>,

    // Config overriding args
    /// Processed deposits file that will override `ledger.path`.
    #[argh(option, description = "path to the processed deposits file")]
    pub processed_file: Option<PathBuf>,

    /// Other generic overrides, applied after the environment.
    /// Used as `-o dispatch.max_parallel_payouts=5 -o source.poll_interval_ms=2000`
    #[argh(option, short = 'o', description = "generic config overrides")]
    pub overrides: Vec<String>,
}

impl Args {
    /// Overrides gathered from args, generic ones first.
    pub(crate) fn get_overrides(&self) -> anyhow::Result<Vec<Override>> {
        let mut overrides = self
            .overrides
            .iter()
            .map(|o| parse_override(o))
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(path) = &self.processed_file {
            let path = path
                .to_str()
                .ok_or_else(|| anyhow!("invalid processed file path {path:?}"))?;
            overrides.push((
                "ledger.path".to_string(),
                toml::Value::String(path.to_string()),
            ));
        }

        Ok(overrides)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_processed_file_overrides_ledger_path() {
        let args = Args::from_args(
            &["relayer-client"],
            &[
                "--processed-file",
                "/var/lib/relayer/1234",
                "-o",
                "dispatch.max_parallel_payouts=5",
            ],
        )
        .unwrap();

        let overrides = args.get_overrides().unwrap();

        assert_eq!(
            overrides,
            vec![
                (
                    "dispatch.max_parallel_payouts".to_string(),
                    toml::Value::Integer(5)
                ),
                (
                    "ledger.path".to_string(),
                    toml::Value::String("/var/lib/relayer/1234".to_string())
                ),
            ]
        );
    }

    #[test]
    fn test_malformed_override_rejected() {
        let args = Args::from_args(&["relayer-client"], &["-o", "no-equals-sign"]).unwrap();
        assert!(args.get_overrides().is_err());
    }
}
