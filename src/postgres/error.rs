//! Error types for the container lifecycle.

use std::time::Duration;

use thiserror::Error;

/// Result type for container lifecycle operations.
pub type Result<T> = std::result::Result<T, PostgresError>;

/// Errors reported by a [`ContainerRuntime`](super::runtime::ContainerRuntime).
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The image or container does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The runtime daemon could not be reached.
    #[error("Docker not available: {reason}")]
    Unavailable {
        /// Reason why Docker is unavailable.
        reason: String,
    },

    /// The runtime rejected the request or the transport failed.
    #[error("{0}")]
    Api(String),
}

impl RuntimeError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<bollard::errors::Error> for RuntimeError {
    fn from(e: bollard::errors::Error) -> Self {
        match e {
            bollard::errors::Error::DockerResponseServerError {
                status_code: 404,
                message,
            } => Self::NotFound(message),
            other => Self::Api(other.to_string()),
        }
    }
}

/// A failed connectivity probe.
#[derive(Debug, Error)]
pub enum PingError {
    /// The server did not answer (yet). Retried until the startup deadline.
    #[error("ping failed: {0}")]
    Unreachable(String),

    /// The connection settings can never work. Not retried.
    #[error("invalid connection settings: {0}")]
    Invalid(String),
}

impl PingError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }
}

impl From<tokio_postgres::Error> for PingError {
    fn from(e: tokio_postgres::Error) -> Self {
        Self::Unreachable(e.to_string())
    }
}

/// Step of instance startup (or teardown) an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupPhase {
    /// Looking up or pulling the image.
    Resolution,
    /// Picking a host port and generating the password.
    Allocation,
    /// Creating and starting the container.
    Creation,
    /// Waiting for the container health check.
    Health,
    /// Waiting for the database to accept connections.
    Connectivity,
    /// Stopping and removing the container.
    Teardown,
}

impl std::fmt::Display for StartupPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Resolution => "image resolution",
            Self::Allocation => "allocation",
            Self::Creation => "container creation",
            Self::Health => "container health",
            Self::Connectivity => "database connectivity",
            Self::Teardown => "teardown",
        };
        f.write_str(s)
    }
}

/// Errors that can occur while starting or tearing down an instance.
#[derive(Debug, Error)]
pub enum PostgresError {
    /// No container runtime could be reached.
    #[error("Failed to connect to container runtime: {0}")]
    Connect(#[source] RuntimeError),

    /// Inspecting the local image failed for a reason other than absence.
    #[error("Failed to inspect image '{image}': {source}")]
    ImageInspect {
        image: String,
        #[source]
        source: RuntimeError,
    },

    /// Pulling the image failed.
    #[error("Failed to pull image '{image}': {source}")]
    ImagePull {
        image: String,
        #[source]
        source: RuntimeError,
    },

    /// No host port or password could be produced.
    #[error("Failed to allocate {resource}: {reason}")]
    Allocation {
        /// What was being allocated (`port` or `password`).
        resource: &'static str,
        reason: String,
    },

    /// The runtime refused to create the container.
    #[error("Failed to create container from '{image}': {source}")]
    ContainerCreate {
        image: String,
        #[source]
        source: RuntimeError,
    },

    /// The runtime refused to start the container.
    #[error("Failed to start container '{id}': {source}")]
    ContainerStart {
        id: String,
        #[source]
        source: RuntimeError,
    },

    /// Inspecting the container during health polling failed.
    #[error("Failed to inspect container '{id}': {source}")]
    HealthInspect {
        id: String,
        #[source]
        source: RuntimeError,
    },

    /// The container health check reported a definitive failure.
    #[error("Container '{id}' is unhealthy")]
    Unhealthy { id: String },

    /// The startup deadline passed before the instance became ready.
    #[error("Timed out after {timeout:?} waiting for {phase}")]
    Timeout {
        phase: StartupPhase,
        timeout: Duration,
        /// Most recent failed ping, if the connectivity phase was reached.
        #[source]
        last_error: Option<PingError>,
    },

    /// The database rejected the connection settings outright.
    #[error("Cannot connect to the database: {source}")]
    InvalidConnection {
        #[source]
        source: PingError,
    },

    /// The caller cancelled startup.
    #[error("Cancelled while waiting for {phase}")]
    Cancelled { phase: StartupPhase },

    /// Stopping the container failed; removal was not attempted.
    #[error("Failed to stop container '{id}': {source}")]
    Stop {
        id: String,
        #[source]
        source: RuntimeError,
    },

    /// Removing the stopped container failed.
    #[error("Failed to remove container '{id}': {source}")]
    Remove {
        id: String,
        #[source]
        source: RuntimeError,
    },
}

impl PostgresError {
    /// The phase this error was raised in.
    pub fn phase(&self) -> StartupPhase {
        match self {
            Self::Connect(_) | Self::ImageInspect { .. } | Self::ImagePull { .. } => {
                StartupPhase::Resolution
            }
            Self::Allocation { .. } => StartupPhase::Allocation,
            Self::ContainerCreate { .. } | Self::ContainerStart { .. } => StartupPhase::Creation,
            Self::HealthInspect { .. } | Self::Unhealthy { .. } => StartupPhase::Health,
            Self::InvalidConnection { .. } => StartupPhase::Connectivity,
            Self::Timeout { phase, .. } | Self::Cancelled { phase } => *phase,
            Self::Stop { .. } | Self::Remove { .. } => StartupPhase::Teardown,
        }
    }

    /// True when startup gave up waiting rather than observing a failure.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bollard_404_maps_to_not_found() {
        let err = RuntimeError::from(bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            message: "No such image: postgres:0".to_string(),
        });
        assert!(err.is_not_found());

        let err = RuntimeError::from(bollard::errors::Error::DockerResponseServerError {
            status_code: 500,
            message: "boom".to_string(),
        });
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_phase_of_readiness_errors() {
        let timeout = PostgresError::Timeout {
            phase: StartupPhase::Connectivity,
            timeout: Duration::from_secs(10),
            last_error: Some(PingError::Unreachable("connection refused".into())),
        };
        assert_eq!(timeout.phase(), StartupPhase::Connectivity);
        assert!(timeout.is_timeout());
        let source = std::error::Error::source(&timeout).unwrap();
        assert!(source.to_string().contains("connection refused"));

        let invalid = PostgresError::InvalidConnection {
            source: PingError::Invalid("bad sslmode".into()),
        };
        assert_eq!(invalid.phase(), StartupPhase::Connectivity);
        assert!(!invalid.is_timeout());

        let unhealthy = PostgresError::Unhealthy {
            id: "abc".to_string(),
        };
        assert_eq!(unhealthy.phase(), StartupPhase::Health);
        assert!(!unhealthy.is_timeout());
    }

    #[test]
    fn test_error_messages_name_the_phase() {
        let err = PostgresError::Cancelled {
            phase: StartupPhase::Health,
        };
        assert_eq!(err.to_string(), "Cancelled while waiting for container health");
    }
}
