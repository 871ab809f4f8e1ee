//! Two-phase readiness polling: container health, then a live database ping.
//!
//! ```text
//!   PollingHealth ──healthy──▶ PollingConnectivity ──ping ok──▶ Done
//!        │  ▲                        │  ▲
//!        │  └─starting (sleep)       │  └─ping failed (sleep)
//!        │
//!        └─unhealthy──▶ Failed(Unhealthy)
//!
//!   deadline passed ──▶ Failed(Timeout)    cancelled ──▶ Failed(Cancelled)
//! ```
//!
//! One deadline covers both phases. It is checked explicitly at the top of
//! every iteration so a timeout is never confused with an unhealthy report.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_postgres::NoTls;
use tokio_postgres::config::SslMode as ClientSslMode;
use tokio_util::sync::CancellationToken;

use crate::postgres::config::SslMode;
use crate::postgres::error::{PingError, PostgresError, Result, StartupPhase};
use crate::postgres::runtime::{ContainerRuntime, HealthStatus};

/// Protocol-level connectivity check against a connection string.
#[async_trait]
pub trait Pinger: Send + Sync {
    /// Open a connection and complete one round trip.
    async fn ping(&self, conn_str: &str) -> std::result::Result<(), PingError>;
}

/// [`Pinger`] using `tokio-postgres` without TLS.
///
/// Throwaway containers do not serve TLS. `sslmode=allow` connects in plain
/// text like libpq does; `require` and the `verify-*` modes are rejected up
/// front as [`PingError::Invalid`] instead of failing on every attempt.
#[derive(Debug, Clone)]
pub struct PgPinger {
    connect_timeout: Duration,
}

impl Default for PgPinger {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(1),
        }
    }
}

impl PgPinger {
    /// `connect_timeout` bounds the connection attempt and the query separately.
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

/// Split the `sslmode` parameter off a connection URI.
///
/// `tokio-postgres` only understands `disable`, `prefer` and `require`, so the
/// mode is parsed with the full libpq vocabulary and applied separately.
fn split_sslmode(conn_str: &str) -> std::result::Result<(String, SslMode), PingError> {
    let Some((base, query)) = conn_str.split_once('?') else {
        return Ok((conn_str.to_string(), SslMode::Prefer));
    };

    let mut mode = SslMode::Prefer;
    let mut rest = Vec::new();
    for param in query.split('&') {
        match param.strip_prefix("sslmode=") {
            Some(value) => mode = value.parse().map_err(PingError::Invalid)?,
            None => rest.push(param),
        }
    }

    if rest.is_empty() {
        Ok((base.to_string(), mode))
    } else {
        Ok((format!("{}?{}", base, rest.join("&")), mode))
    }
}

/// Client configuration for pinging `conn_str` without TLS.
pub(crate) fn client_config(
    conn_str: &str,
) -> std::result::Result<tokio_postgres::Config, PingError> {
    let (base, mode) = split_sslmode(conn_str)?;
    let mut config =
        tokio_postgres::Config::from_str(&base).map_err(|e| PingError::Invalid(e.to_string()))?;

    let client_mode = match mode {
        SslMode::Disable | SslMode::Allow => ClientSslMode::Disable,
        SslMode::Prefer => ClientSslMode::Prefer,
        SslMode::Require | SslMode::VerifyCa | SslMode::VerifyFull => {
            return Err(PingError::Invalid(format!(
                "sslmode={} needs TLS, which the readiness check does not provide",
                mode
            )));
        }
    };
    config.ssl_mode(client_mode);
    Ok(config)
}

#[async_trait]
impl Pinger for PgPinger {
    async fn ping(&self, conn_str: &str) -> std::result::Result<(), PingError> {
        let mut config = client_config(conn_str)?;
        config.connect_timeout(self.connect_timeout);

        let (client, connection) = config.connect(NoTls).await?;
        let conn_task = tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::trace!("Ping connection closed: {}", e);
            }
        });

        let result = tokio::time::timeout(self.connect_timeout, client.simple_query("SELECT 1"))
            .await
            .map_err(|_| {
                PingError::Unreachable(format!(
                    "no reply to SELECT 1 within {:?}",
                    self.connect_timeout
                ))
            });
        drop(client);
        let _ = conn_task.await;
        result?.map(|_| ()).map_err(PingError::from)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Readiness {
    PollingHealth,
    PollingConnectivity,
    Done,
}

/// Polls one container until it is ready, failed, out of time, or cancelled.
pub(crate) struct Prober<'a> {
    runtime: &'a dyn ContainerRuntime,
    pinger: &'a dyn Pinger,
    cancel: &'a CancellationToken,
    interval: Duration,
    timeout: Duration,
    deadline: Instant,
}

impl<'a> Prober<'a> {
    /// Start the deadline clock now.
    pub(crate) fn new(
        runtime: &'a dyn ContainerRuntime,
        pinger: &'a dyn Pinger,
        cancel: &'a CancellationToken,
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            runtime,
            pinger,
            cancel,
            interval,
            timeout,
            deadline: Instant::now() + timeout,
        }
    }

    /// Wait for `healthy`, then for a successful ping of `conn_str`.
    pub(crate) async fn wait_until_ready(&self, id: &str, conn_str: &str) -> Result<()> {
        let mut state = Readiness::PollingHealth;
        let mut last_ping_error = None;
        loop {
            state = match state {
                Readiness::Done => return Ok(()),
                Readiness::PollingHealth => {
                    self.checkpoint(StartupPhase::Health, &mut last_ping_error)?;
                    self.poll_health(id).await?
                }
                Readiness::PollingConnectivity => {
                    self.checkpoint(StartupPhase::Connectivity, &mut last_ping_error)?;
                    self.poll_connectivity(conn_str, &mut last_ping_error)
                        .await?
                }
            };
        }
    }

    fn checkpoint(&self, phase: StartupPhase, last_error: &mut Option<PingError>) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(PostgresError::Cancelled { phase });
        }
        if Instant::now() >= self.deadline {
            return Err(PostgresError::Timeout {
                phase,
                timeout: self.timeout,
                last_error: last_error.take(),
            });
        }
        Ok(())
    }

    async fn poll_health(&self, id: &str) -> Result<Readiness> {
        let status = self
            .runtime
            .inspect_health(id)
            .await
            .map_err(|source| PostgresError::HealthInspect {
                id: id.to_string(),
                source,
            })?;

        match status {
            HealthStatus::Healthy => {
                tracing::debug!(container = %id, "Container healthy");
                Ok(Readiness::PollingConnectivity)
            }
            HealthStatus::Unhealthy => Err(PostgresError::Unhealthy { id: id.to_string() }),
            HealthStatus::Starting | HealthStatus::Unknown => {
                tracing::trace!(container = %id, ?status, "Waiting for container health");
                self.pause(StartupPhase::Health).await?;
                Ok(Readiness::PollingHealth)
            }
        }
    }

    async fn poll_connectivity(
        &self,
        conn_str: &str,
        last_error: &mut Option<PingError>,
    ) -> Result<Readiness> {
        match self.pinger.ping(conn_str).await {
            Ok(()) => Ok(Readiness::Done),
            Err(e) if !e.is_retryable() => Err(PostgresError::InvalidConnection { source: e }),
            Err(e) => {
                tracing::debug!("Database not reachable yet: {}", e);
                *last_error = Some(e);
                self.pause(StartupPhase::Connectivity).await?;
                Ok(Readiness::PollingConnectivity)
            }
        }
    }

    /// Sleep one interval, waking early if the caller cancels.
    async fn pause(&self, phase: StartupPhase) -> Result<()> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(PostgresError::Cancelled { phase }),
            _ = tokio::time::sleep(self.interval) => Ok(()),
        }
    }
}
