//! Container create/start/teardown with rollback of partial startups.

use crate::postgres::error::{PostgresError, Result};
use crate::postgres::runtime::{ContainerRuntime, ContainerSpec};

/// Undo action for a step that already succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Compensation {
    /// Undo a successful create.
    Remove(String),
    /// Undo a successful start.
    Stop(String),
}

/// Stack of compensations pushed after each successful startup step.
///
/// On failure the stack is unwound newest-first. Once startup completes the
/// stack is disarmed and the handle takes over responsibility for teardown.
pub(crate) struct Rollback<'a> {
    runtime: &'a dyn ContainerRuntime,
    actions: Vec<Compensation>,
}

impl<'a> Rollback<'a> {
    pub(crate) fn new(runtime: &'a dyn ContainerRuntime) -> Self {
        Self {
            runtime,
            actions: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, action: Compensation) {
        self.actions.push(action);
    }

    /// Run every pending compensation in reverse order.
    ///
    /// Failures are logged and do not stop the unwind; the caller is already
    /// returning the error that triggered it.
    pub(crate) async fn unwind(mut self) {
        while let Some(action) = self.actions.pop() {
            let result = match &action {
                Compensation::Stop(id) => self.runtime.stop_container(id).await,
                Compensation::Remove(id) => self.runtime.remove_container(id).await,
            };
            match result {
                Ok(()) => tracing::debug!(?action, "Rolled back startup step"),
                Err(e) => tracing::warn!(?action, error = %e, "Rollback step failed"),
            }
        }
    }

    /// Startup succeeded; nothing to undo.
    pub(crate) fn disarm(mut self) {
        self.actions.clear();
    }
}

impl Drop for Rollback<'_> {
    fn drop(&mut self) {
        if !self.actions.is_empty() {
            tracing::warn!(
                pending = ?self.actions,
                "Startup abandoned before rollback ran, container may remain"
            );
        }
    }
}

/// Ask the runtime to create the container described by `spec`.
pub(crate) async fn create(runtime: &dyn ContainerRuntime, spec: &ContainerSpec) -> Result<String> {
    let id = runtime
        .create_container(spec)
        .await
        .map_err(|source| PostgresError::ContainerCreate {
            image: spec.image.clone(),
            source,
        })?;
    tracing::debug!(container = %id, image = %spec.image, "Created container");
    Ok(id)
}

/// Start a created container. The caller's rollback removes it on failure.
pub(crate) async fn start(runtime: &dyn ContainerRuntime, id: &str) -> Result<()> {
    runtime
        .start_container(id)
        .await
        .map_err(|source| PostgresError::ContainerStart {
            id: id.to_string(),
            source,
        })?;
    tracing::debug!(container = %id, "Started container");
    Ok(())
}

/// Stop, then remove. Removal is skipped if stopping fails.
pub(crate) async fn shutdown(runtime: &dyn ContainerRuntime, id: &str) -> Result<()> {
    runtime
        .stop_container(id)
        .await
        .map_err(|source| PostgresError::Stop {
            id: id.to_string(),
            source,
        })?;
    runtime
        .remove_container(id)
        .await
        .map_err(|source| PostgresError::Remove {
            id: id.to_string(),
            source,
        })?;
    tracing::debug!(container = %id, "Removed container");
    Ok(())
}
