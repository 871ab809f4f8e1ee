//! Starting throwaway Postgres containers.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::postgres::alloc::{random_password, random_port};
use crate::postgres::config::{InstanceConfig, POSTGRES_PORT, PostgresOptions};
use crate::postgres::error::{PostgresError, Result, StartupPhase};
use crate::postgres::handle::PostgresContainer;
use crate::postgres::image::ensure_image;
use crate::postgres::lifecycle::{self, Compensation, Rollback};
use crate::postgres::readiness::{PgPinger, Pinger, Prober};
use crate::postgres::runtime::{ContainerRuntime, ContainerSpec, DockerRuntime};

/// Starts Postgres containers through a shared runtime client.
///
/// Build one per process (or per test suite) and call [`start`](Self::start)
/// for each instance; every call creates its own container and port.
#[derive(Clone)]
pub struct PostgresLauncher {
    runtime: Arc<dyn ContainerRuntime>,
    pinger: Arc<dyn Pinger>,
    options: PostgresOptions,
}

impl PostgresLauncher {
    /// Launcher over `runtime` with default options and a `tokio-postgres` pinger.
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            runtime,
            pinger: Arc::new(PgPinger::default()),
            options: PostgresOptions::default(),
        }
    }

    /// Launcher connected to the local Docker daemon.
    pub async fn docker() -> Result<Self> {
        let runtime = DockerRuntime::connect()
            .await
            .map_err(PostgresError::Connect)?;
        Ok(Self::new(Arc::new(runtime)))
    }

    pub fn with_options(mut self, options: PostgresOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_pinger(mut self, pinger: Arc<dyn Pinger>) -> Self {
        self.pinger = pinger;
        self
    }

    pub fn options(&self) -> &PostgresOptions {
        &self.options
    }

    /// Start a container and wait until it is ready.
    ///
    /// Steps: make sure the image exists (pulling if needed), pick a port and
    /// password, create and start the container, wait for the container
    /// health check, then wait for a successful ping. If anything fails after
    /// creation, the container is stopped (if started) and removed before the
    /// error is returned.
    ///
    /// `cancel` is checked before each step and aborts an image pull or
    /// readiness polling in progress. The startup deadline from
    /// [`PostgresOptions::startup_timeout`] applies regardless.
    pub async fn start(
        &self,
        config: InstanceConfig,
        cancel: &CancellationToken,
    ) -> Result<PostgresContainer> {
        let runtime = self.runtime.as_ref();
        let image = self.options.image_ref();

        check_cancelled(cancel, StartupPhase::Resolution)?;
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(image = %image, "Startup cancelled during image resolution");
                return Err(PostgresError::Cancelled {
                    phase: StartupPhase::Resolution,
                });
            }
            result = ensure_image(runtime, &image) => result?,
        }

        check_cancelled(cancel, StartupPhase::Allocation)?;
        let password = match config.password() {
            Some(p) => p.clone(),
            None => random_password()?,
        };
        let port = random_port()?;

        let spec = ContainerSpec {
            image: image.clone(),
            env: config.container_env(&password),
            health_check: self.options.health_check(&config),
            container_port: POSTGRES_PORT,
            host_port: port,
        };

        check_cancelled(cancel, StartupPhase::Creation)?;
        let id = lifecycle::create(runtime, &spec).await?;
        let mut rollback = Rollback::new(runtime);
        rollback.push(Compensation::Remove(id.clone()));

        let started = match check_cancelled(cancel, StartupPhase::Creation) {
            Ok(()) => lifecycle::start(runtime, &id).await,
            Err(e) => Err(e),
        };
        if let Err(e) = started {
            rollback.unwind().await;
            return Err(e);
        }
        rollback.push(Compensation::Stop(id.clone()));

        let conn_str = config.connection_string(&password, port);
        let prober = Prober::new(
            runtime,
            self.pinger.as_ref(),
            cancel,
            self.options.poll_interval,
            self.options.startup_timeout,
        );
        if let Err(e) = prober.wait_until_ready(&id, conn_str.as_str()).await {
            tracing::warn!(container = %id, error = %e, "Postgres container never became ready");
            rollback.unwind().await;
            return Err(e);
        }
        rollback.disarm();

        tracing::info!(container = %id, port, image = %image, "Postgres container ready");

        Ok(PostgresContainer::new(
            Arc::clone(&self.runtime),
            id,
            port,
            password,
            conn_str,
        ))
    }
}

fn check_cancelled(cancel: &CancellationToken, phase: StartupPhase) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(PostgresError::Cancelled { phase });
    }
    Ok(())
}

/// Start a container for `postgres:<version>` with default settings.
///
/// Connects to Docker for this call only; use a [`PostgresLauncher`] to share
/// one client across many instances.
pub async fn start_postgres_container(
    version: &str,
    cancel: &CancellationToken,
) -> Result<PostgresContainer> {
    PostgresLauncher::docker()
        .await?
        .with_options(PostgresOptions::version(version))
        .start(InstanceConfig::default(), cancel)
        .await
}
