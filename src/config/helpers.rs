use std::collections::HashMap;
use std::str::FromStr;

use crate::error::ConfigError;

/// Source of configuration variables.
///
/// The process environment is the normal source; tests pass a map so they
/// never have to mutate global state.
pub trait EnvSource {
    /// Look up `key`. Unset and empty variables both yield `Ok(None)`.
    fn var(&self, key: &str) -> Result<Option<String>, ConfigError>;
}

/// Reads from `std::env`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Result<Option<String>, ConfigError> {
        match std::env::var(key) {
            Ok(v) if v.is_empty() => Ok(None),
            Ok(v) => Ok(Some(v)),
            Err(std::env::VarError::NotPresent) => Ok(None),
            Err(std::env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: "not valid UTF-8".to_string(),
            }),
        }
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Result<Option<String>, ConfigError> {
        Ok(self.get(key).filter(|v| !v.is_empty()).cloned())
    }
}

pub(crate) fn optional_env(env: &dyn EnvSource, key: &str) -> Result<Option<String>, ConfigError> {
    env.var(key)
}

pub(crate) fn parse_optional_env<T>(
    env: &dyn EnvSource,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    optional_env(env, key)?
        .map(|s| {
            s.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })
        })
        .transpose()
        .map(|v| v.unwrap_or(default))
}
