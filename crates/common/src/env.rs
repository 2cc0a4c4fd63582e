use std::{fmt::Display, str::FromStr};

use thiserror::Error;

/// Error raised when an environment variable is present but cannot be parsed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid value for envvar {var}: {reason}")]
pub struct EnvParseError {
    pub var: String,
    pub reason: String,
}

/// Parses `envvar` as `T`, reading it through `lookup`.
///
/// Returns `Ok(None)` if the envvar is missing or blank, and an error if it is set to something
/// that does not parse, so that typos in deployment configs are not silently ignored.
pub fn parse_env_with<T, L>(envvar: &str, lookup: L) -> Result<Option<T>, EnvParseError>
where
    T: FromStr,
    T::Err: Display,
    L: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(envvar) else {
        return Ok(None);
    };

    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }

    T::from_str(raw).map(Some).map_err(|e| EnvParseError {
        var: envvar.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_with_missing_and_blank() {
        let missing: Option<u64> = parse_env_with("X", |_| None).unwrap();
        assert_eq!(missing, None);

        let blank: Option<u64> = parse_env_with("X", |_| Some("  ".to_string())).unwrap();
        assert_eq!(blank, None);
    }

    #[test]
    fn test_parse_env_with_invalid_value() {
        let err = parse_env_with::<u64, _>("RELAYER_X", |_| Some("ten".to_string())).unwrap_err();
        assert_eq!(err.var, "RELAYER_X");
    }

    #[test]
    fn test_parse_env_with_value() {
        let v: Option<u64> = parse_env_with("X", |_| Some(" 42 ".to_string())).unwrap();
        assert_eq!(v, Some(42));
    }
}
