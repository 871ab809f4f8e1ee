//! Handle to a running, ready instance.

use std::sync::Arc;

use secrecy::SecretString;

use crate::postgres::config::ConnectionString;
use crate::postgres::error::Result;
use crate::postgres::lifecycle;
use crate::postgres::runtime::ContainerRuntime;

/// A throwaway Postgres container that has passed its health check and
/// accepted a connection.
///
/// Call [`shutdown`](Self::shutdown) exactly once when done. A handle dropped
/// without shutdown leaves the container running.
pub struct PostgresContainer {
    runtime: Arc<dyn ContainerRuntime>,
    id: String,
    port: u16,
    password: SecretString,
    conn_str: ConnectionString,
    shut_down: bool,
}

impl PostgresContainer {
    pub(crate) fn new(
        runtime: Arc<dyn ContainerRuntime>,
        id: String,
        port: u16,
        password: SecretString,
        conn_str: ConnectionString,
    ) -> Self {
        Self {
            runtime,
            id,
            port,
            password,
            conn_str,
            shut_down: false,
        }
    }

    /// Connection URI for the instance.
    pub fn connection_string(&self) -> &str {
        self.conn_str.as_str()
    }

    /// Runtime-assigned container id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Host port bound to the container's Postgres port.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn password(&self) -> &SecretString {
        &self.password
    }

    /// Stop and remove the container.
    ///
    /// If stopping fails, removal is not attempted and the stop error is
    /// returned. Either way the container's state is uncertain after an error
    /// and should be treated as leaked.
    pub async fn shutdown(mut self) -> Result<()> {
        tracing::info!(container = %self.id, "Shutting down Postgres container");
        lifecycle::shutdown(self.runtime.as_ref(), &self.id).await?;
        self.shut_down = true;
        Ok(())
    }
}

impl std::fmt::Debug for PostgresContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresContainer")
            .field("id", &self.id)
            .field("port", &self.port)
            .field("conn_str", &self.conn_str)
            .finish_non_exhaustive()
    }
}

impl Drop for PostgresContainer {
    fn drop(&mut self) {
        if !self.shut_down {
            tracing::warn!(
                container = %self.id,
                "PostgresContainer dropped without a successful shutdown(), container may remain running"
            );
        }
    }
}
