//! `sqltestbox up`: start, prepare, hold, tear down.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::postgres::{PostgresContainer, PostgresLauncher, SslMode};
use crate::{db, migration, scenario};

#[derive(Args, Debug, Clone, Default)]
pub struct UpArgs {
    /// Image tag to run (overrides SQLTESTBOX_VERSION)
    #[arg(long = "version", value_name = "TAG")]
    pub pg_version: Option<String>,

    /// Image repository (overrides SQLTESTBOX_IMAGE)
    #[arg(long)]
    pub image: Option<String>,

    /// Directory of *.up.sql files to apply after startup
    #[arg(long, value_name = "DIR")]
    pub migrations: Option<PathBuf>,

    /// YAML scenario file to load after migrations
    #[arg(long, value_name = "FILE")]
    pub scenario: Option<PathBuf>,

    /// Database name
    #[arg(long)]
    pub dbname: Option<String>,

    /// Database user
    #[arg(long)]
    pub user: Option<String>,

    /// Server timezone
    #[arg(long)]
    pub timezone: Option<String>,

    /// sslmode written into the connection string
    #[arg(long)]
    pub sslmode: Option<SslMode>,
}

impl UpArgs {
    /// Layer command-line flags over environment configuration.
    pub fn apply(&self, mut config: Config) -> Config {
        if let Some(version) = &self.pg_version {
            config.options.version = version.clone();
        }
        if let Some(image) = &self.image {
            config.options.image = image.clone();
        }
        if let Some(dbname) = &self.dbname {
            config.instance = config.instance.with_dbname(dbname);
        }
        if let Some(user) = &self.user {
            config.instance = config.instance.with_user(user);
        }
        if let Some(timezone) = &self.timezone {
            config.instance = config.instance.with_timezone(timezone);
        }
        if let Some(sslmode) = self.sslmode {
            config.instance = config.instance.with_sslmode(sslmode);
        }
        config
    }
}

/// Run `up` until `cancel` fires, then tear the instance down.
pub async fn run_up_command(args: UpArgs, cancel: CancellationToken) -> anyhow::Result<()> {
    let config = args.apply(Config::from_env()?);
    tracing::debug!(image = %config.options.image_ref(), "Resolved configuration");

    let launcher = PostgresLauncher::docker()
        .await?
        .with_options(config.options);
    let pg = launcher.start(config.instance, &cancel).await?;

    if let Err(e) = prepare(&pg, &args).await {
        if let Err(shutdown_err) = pg.shutdown().await {
            tracing::warn!("Teardown after failed preparation also failed: {}", shutdown_err);
        }
        return Err(e);
    }

    println!("Container:  {}", pg.id());
    println!("Connection: {}", pg.connection_string());
    println!();
    println!("Press Ctrl-C to stop.");

    cancel.cancelled().await;

    tracing::info!(container_id = %pg.id(), "Stopping");
    pg.shutdown().await?;
    Ok(())
}

async fn prepare(pg: &PostgresContainer, args: &UpArgs) -> anyhow::Result<()> {
    if args.migrations.is_none() && args.scenario.is_none() {
        return Ok(());
    }

    let client = db::connect(pg.connection_string())
        .await
        .context("connecting to the new instance")?;

    if let Some(dir) = &args.migrations {
        let applied = migration::run_migrations(&client, dir).await?;
        println!("Applied {} migration(s) from {}", applied.len(), dir.display());
    }
    if let Some(file) = &args.scenario {
        let rows = scenario::load_scenario(&client, file).await?;
        println!("Loaded {} row(s) from {}", rows, file.display());
    }
    Ok(())
}
