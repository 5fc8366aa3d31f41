//! Container runtime access.
//!
//! The watchdog only needs two things from the runtime: restart a container
//! and tell when it was last started. [`DockerRuntime`] does this through
//! bollard against the local Docker daemon.

use std::time::Duration;

use async_trait::async_trait;
use bollard::Docker;
use bollard::query_parameters::{
    InspectContainerOptions, InspectContainerOptionsBuilder, RestartContainerOptions,
    RestartContainerOptionsBuilder,
};
use chrono::{DateTime, Utc};

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("Unable to connect to Docker: {0}")]
    Connect(bollard::errors::Error),
    #[error("Container {0} not found")]
    NotFound(String),
    #[error("Docker API error: {0}")]
    DockerApi(#[from] bollard::errors::Error),
    #[error("Container {0} reports no start time")]
    MissingStartTime(String),
    #[error("Invalid start time {0:?}: {1}")]
    InvalidStartTime(String, chrono::ParseError),
}

#[async_trait]
pub trait ContainerRuntime {
    async fn restart(&self, container: &str) -> Result<(), RuntimeError>;
    async fn started_at(&self, container: &str) -> Result<DateTime<Utc>, RuntimeError>;
}

pub struct DockerRuntime {
    timeout: Duration,
    stop_secs: u32,
}

impl DockerRuntime {
    /// `timeout` bounds every request to the daemon. `stop_secs` is how long
    /// Docker waits for the container to stop before killing it.
    pub fn new(timeout: Duration, stop_secs: u32) -> Self {
        // The daemon blocks the restart request for up to stop_secs.
        let timeout = timeout.max(Duration::from_secs(u64::from(stop_secs) + 5));
        Self { timeout, stop_secs }
    }

    fn docker(&self) -> Result<Docker, RuntimeError> {
        Docker::connect_with_local_defaults()
            .map(|docker| docker.with_timeout(self.timeout))
            .map_err(RuntimeError::Connect)
    }
}

fn not_found_or(container: &str, e: bollard::errors::Error) -> RuntimeError {
    match e {
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404, ..
        } => RuntimeError::NotFound(container.to_string()),
        e => RuntimeError::DockerApi(e),
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn restart(&self, container: &str) -> Result<(), RuntimeError> {
        log::info!("Restarting container: {container}");
        let docker = self.docker()?;

        let t = i32::try_from(self.stop_secs).unwrap_or(i32::MAX);
        let options: RestartContainerOptions = RestartContainerOptionsBuilder::new().t(t).build();

        docker
            .restart_container(container, Some(options))
            .await
            .map_err(|e| not_found_or(container, e))
            .inspect_err(|e| log::error!("Failed to restart container {container}: {e}"))?;

        log::info!("Container {container} restarted");
        Ok(())
    }

    async fn started_at(&self, container: &str) -> Result<DateTime<Utc>, RuntimeError> {
        let docker = self.docker()?;

        let options: InspectContainerOptions = InspectContainerOptionsBuilder::new().build();

        let info = docker
            .inspect_container(container, Some(options))
            .await
            .map_err(|e| not_found_or(container, e))?;

        let started_at = info
            .state
            .and_then(|state| state.started_at)
            .ok_or_else(|| RuntimeError::MissingStartTime(container.to_string()))?;

        parse_started_at(&started_at)
    }
}

/// Parses Docker's `State.StartedAt`, e.g. `2025-09-02T12:34:56.789012345Z`.
pub fn parse_started_at(raw: &str) -> Result<DateTime<Utc>, RuntimeError> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RuntimeError::InvalidStartTime(raw.to_string(), e))
}
