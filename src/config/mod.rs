//! Environment-driven configuration.
//!
//! Every setting has a default; `SQLTESTBOX_*` variables override them
//! individually. The CLI loads `.env` with dotenvy before resolving.

mod helpers;

use std::time::Duration;

pub use helpers::{EnvSource, ProcessEnv};

use crate::config::helpers::{optional_env, parse_optional_env};
use crate::error::ConfigError;
use crate::postgres::{InstanceConfig, PostgresOptions, SslMode};

/// Instance and launcher settings resolved together.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub instance: InstanceConfig,
    pub options: PostgresOptions,
}

impl Config {
    /// Resolve from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::resolve(&ProcessEnv)
    }

    /// Resolve from an arbitrary variable source.
    pub fn resolve(env: &dyn EnvSource) -> Result<Self, ConfigError> {
        Ok(Self {
            instance: resolve_instance(env)?,
            options: resolve_options(env)?,
        })
    }
}

fn resolve_instance(env: &dyn EnvSource) -> Result<InstanceConfig, ConfigError> {
    let mut config = InstanceConfig::default();

    if let Some(dbname) = optional_env(env, "SQLTESTBOX_DBNAME")? {
        config = config.with_dbname(dbname);
    }
    if let Some(user) = optional_env(env, "SQLTESTBOX_USER")? {
        config = config.with_user(user);
    }
    if let Some(password) = optional_env(env, "SQLTESTBOX_PASSWORD")? {
        config = config.with_password(password);
    }
    if let Some(timezone) = optional_env(env, "SQLTESTBOX_TIMEZONE")? {
        config = config.with_timezone(timezone);
    }
    let sslmode = parse_optional_env(env, "SQLTESTBOX_SSLMODE", SslMode::default())?;

    Ok(config.with_sslmode(sslmode))
}

fn resolve_options(env: &dyn EnvSource) -> Result<PostgresOptions, ConfigError> {
    let defaults = PostgresOptions::default();

    let startup_timeout_ms = parse_optional_env(
        env,
        "SQLTESTBOX_STARTUP_TIMEOUT_MS",
        defaults.startup_timeout.as_millis() as u64,
    )?;
    let poll_interval_ms = parse_optional_env(
        env,
        "SQLTESTBOX_POLL_INTERVAL_MS",
        defaults.poll_interval.as_millis() as u64,
    )?;
    if poll_interval_ms == 0 {
        return Err(ConfigError::InvalidValue {
            key: "SQLTESTBOX_POLL_INTERVAL_MS".to_string(),
            message: "must be greater than zero".to_string(),
        });
    }

    Ok(PostgresOptions {
        image: optional_env(env, "SQLTESTBOX_IMAGE")?.unwrap_or(defaults.image),
        version: optional_env(env, "SQLTESTBOX_VERSION")?.unwrap_or(defaults.version),
        startup_timeout: Duration::from_millis(startup_timeout_ms),
        poll_interval: Duration::from_millis(poll_interval_ms),
        ..defaults
    })
}
