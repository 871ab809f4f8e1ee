//! Configuration types for throwaway Postgres containers.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

/// Port Postgres listens on inside the container.
pub const POSTGRES_PORT: u16 = 5432;

/// libpq `sslmode` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SslMode {
    #[default]
    Disable,
    Allow,
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

impl SslMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disable => "disable",
            Self::Allow => "allow",
            Self::Prefer => "prefer",
            Self::Require => "require",
            Self::VerifyCa => "verify-ca",
            Self::VerifyFull => "verify-full",
        }
    }
}

impl std::fmt::Display for SslMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SslMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "disable" => Ok(Self::Disable),
            "allow" => Ok(Self::Allow),
            "prefer" => Ok(Self::Prefer),
            "require" => Ok(Self::Require),
            "verify-ca" => Ok(Self::VerifyCa),
            "verify-full" => Ok(Self::VerifyFull),
            _ => Err(format!(
                "invalid sslmode '{}', expected one of disable, allow, prefer, require, verify-ca, verify-full",
                s
            )),
        }
    }
}

/// Database-level settings for a new instance.
///
/// Every field has a default and can be overridden independently:
///
/// ```rust
/// use sqltestbox::postgres::{InstanceConfig, SslMode};
///
/// let config = InstanceConfig::default()
///     .with_dbname("orders")
///     .with_sslmode(SslMode::Prefer);
/// assert_eq!(config.user(), "pgtest");
/// ```
#[derive(Debug, Clone)]
pub struct InstanceConfig {
    dbname: String,
    user: String,
    /// `None` means a random password is generated at startup.
    password: Option<SecretString>,
    timezone: String,
    sslmode: SslMode,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            dbname: "pgtest".to_string(),
            user: "pgtest".to_string(),
            password: None,
            timezone: "UTC".to_string(),
            sslmode: SslMode::Disable,
        }
    }
}

impl InstanceConfig {
    pub fn with_dbname(mut self, dbname: impl Into<String>) -> Self {
        self.dbname = dbname.into();
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    /// Use a fixed password instead of a generated one.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(SecretString::from(password.into()));
        self
    }

    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = timezone.into();
        self
    }

    pub fn with_sslmode(mut self, sslmode: SslMode) -> Self {
        self.sslmode = sslmode;
        self
    }

    pub fn dbname(&self) -> &str {
        &self.dbname
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn password(&self) -> Option<&SecretString> {
        self.password.as_ref()
    }

    pub fn timezone(&self) -> &str {
        &self.timezone
    }

    pub fn sslmode(&self) -> SslMode {
        self.sslmode
    }

    /// Environment passed to the official `postgres` image.
    pub(crate) fn container_env(&self, password: &SecretString) -> Vec<(String, String)> {
        vec![
            ("POSTGRES_DB".to_string(), self.dbname.clone()),
            ("POSTGRES_USER".to_string(), self.user.clone()),
            (
                "POSTGRES_PASSWORD".to_string(),
                password.expose_secret().to_string(),
            ),
            ("TZ".to_string(), self.timezone.clone()),
            ("PGTZ".to_string(), self.timezone.clone()),
        ]
    }

    /// Build the URI clients use to reach the instance on `port`.
    pub(crate) fn connection_string(&self, password: &SecretString, port: u16) -> ConnectionString {
        ConnectionString(format!(
            "postgres://{}:{}@127.0.0.1:{}/{}?sslmode={}",
            urlencoding::encode(&self.user),
            urlencoding::encode(password.expose_secret()),
            port,
            urlencoding::encode(&self.dbname),
            self.sslmode
        ))
    }
}

/// Container health check declared at creation time.
///
/// The runtime runs `pg_isready` inside the container; readiness polling
/// reads the resulting status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheckSpec {
    /// Command in Docker's `HEALTHCHECK` exec form, e.g. `["CMD", "pg_isready", ...]`.
    pub test: Vec<String>,
    pub interval: Duration,
    pub timeout: Duration,
    pub retries: u32,
}

/// Image and timing settings for starting instances.
#[derive(Debug, Clone)]
pub struct PostgresOptions {
    /// Image repository (default: `postgres`).
    pub image: String,
    /// Image tag, e.g. `15` for `postgres:15`.
    pub version: String,
    /// Deadline covering both readiness phases.
    pub startup_timeout: Duration,
    /// Delay between health and connectivity polls.
    pub poll_interval: Duration,
    /// Interval of the in-container `pg_isready` check.
    pub health_interval: Duration,
    /// Timeout of a single in-container check.
    pub health_timeout: Duration,
    /// Consecutive failed checks before the runtime reports `unhealthy`.
    pub health_retries: u32,
}

impl Default for PostgresOptions {
    fn default() -> Self {
        Self {
            image: "postgres".to_string(),
            version: "15".to_string(),
            startup_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(100),
            health_interval: Duration::from_secs(1),
            health_timeout: Duration::from_secs(1),
            health_retries: 10,
        }
    }
}

impl PostgresOptions {
    /// Options for a given image tag with all other settings defaulted.
    pub fn version(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            ..Default::default()
        }
    }

    /// Full image reference, `name:tag`.
    pub fn image_ref(&self) -> String {
        format!("{}:{}", self.image, self.version)
    }

    pub(crate) fn health_check(&self, config: &InstanceConfig) -> HealthCheckSpec {
        HealthCheckSpec {
            // Exec form: names reach pg_isready as single arguments, unparsed
            // by a shell.
            test: vec![
                "CMD".to_string(),
                "pg_isready".to_string(),
                "-U".to_string(),
                config.user.clone(),
                "-d".to_string(),
                config.dbname.clone(),
            ],
            interval: self.health_interval,
            timeout: self.health_timeout,
            retries: self.health_retries,
        }
    }
}

/// Connection URI of a running instance.
///
/// `Debug` masks the password so handles can be logged.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionString(String);

impl ConnectionString {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn redacted(&self) -> String {
        let Some((scheme, rest)) = self.0.split_once("://") else {
            return self.0.clone();
        };
        match (rest.split_once('@'), rest.split_once(':')) {
            (Some((userinfo, host)), Some((user, _))) if userinfo.contains(':') => {
                format!("{}://{}:***@{}", scheme, user, host)
            }
            _ => self.0.clone(),
        }
    }
}

impl std::fmt::Display for ConnectionString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Debug for ConnectionString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ConnectionString")
            .field(&self.redacted())
            .finish()
    }
}

impl AsRef<str> for ConnectionString {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
