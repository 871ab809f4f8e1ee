//! sqltestbox: throwaway PostgreSQL instances for test suites.
//!
//! Start a container with [`postgres::PostgresLauncher`], apply schema files
//! with [`migration::run_migrations`], seed fixtures with
//! [`scenario::load_scenario`], and tear everything down with
//! [`postgres::PostgresContainer::shutdown`].

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod migration;
pub mod postgres;
pub mod scenario;

pub use config::Config;
pub use error::{ConfigError, MigrationError, ScenarioError};
pub use migration::run_migrations;
pub use postgres::{
    InstanceConfig, PostgresContainer, PostgresError, PostgresLauncher, PostgresOptions,
    start_postgres_container,
};
pub use scenario::load_scenario;
