//! Throwaway PostgreSQL containers for tests.
//!
//! Each call to [`PostgresLauncher::start`] creates exactly one container on a
//! fresh loopback port with a fresh password, and only returns once the
//! database is actually usable:
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────────┐
//! │                          PostgresLauncher::start                          │
//! │                                                                           │
//! │   ┌──────────────┐     ┌──────────────┐     ┌──────────────────────────┐  │
//! │   │ Ensure Image │────▶│ Port +       │────▶│ Create & Start Container │  │
//! │   │ (pull once)  │     │ Password     │     │ (rollback on failure)    │  │
//! │   └──────────────┘     └──────────────┘     └──────────────────────────┘  │
//! │                                                        │                  │
//! │                                                        ▼                  │
//! │                       ┌──────────────┐     ┌──────────────────────────┐   │
//! │                       │ Poll Ping    │◀────│ Poll Container Health    │   │
//! │                       │ (database)   │     │ (pg_isready)             │   │
//! │                       └──────────────┘     └──────────────────────────┘   │
//! │                              │                                            │
//! │                              ▼                                            │
//! │                       ┌──────────────────┐                                │
//! │                       │ PostgresContainer│                                │
//! │                       └──────────────────┘                                │
//! └───────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Starting and stopping a container takes a few seconds (longer on the first
//! pull), so start one per test suite rather than per test.
//!
//! # Example
//!
//! ```rust,no_run
//! use sqltestbox::postgres::{InstanceConfig, PostgresLauncher, PostgresOptions};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let launcher = PostgresLauncher::docker()
//!     .await?
//!     .with_options(PostgresOptions::version("16"));
//!
//! let pg = launcher
//!     .start(InstanceConfig::default(), &CancellationToken::new())
//!     .await?;
//!
//! println!("Postgres available at: {}", pg.connection_string());
//!
//! pg.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod alloc;
pub mod config;
pub mod error;
pub mod handle;
pub mod image;
mod lifecycle;
pub mod manager;
pub mod readiness;
pub mod runtime;

#[cfg(test)]
pub(crate) mod testing;

pub use alloc::{random_password, random_port};
pub use config::{ConnectionString, HealthCheckSpec, InstanceConfig, PostgresOptions, SslMode};
pub use error::{PingError, PostgresError, Result, RuntimeError, StartupPhase};
pub use handle::PostgresContainer;
pub use manager::{PostgresLauncher, start_postgres_container};
pub use readiness::{PgPinger, Pinger};
pub use runtime::{ContainerRuntime, ContainerSpec, DockerRuntime, HealthStatus, connect_docker};
