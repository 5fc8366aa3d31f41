use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::docker::{ContainerRuntime, RuntimeError};
use crate::notify::Severity;

/// Restarting a service older than this means the restart did not take.
pub const RESTART_GRACE_WINDOW: Duration = Duration::from_secs(120);

#[derive(Debug)]
pub enum RestartOutcome {
    /// The restart command itself failed.
    NotIssued(RuntimeError),
    Succeeded { uptime_secs: i64 },
    /// The service is older than the grace window, or claims to start in
    /// the future.
    Failed { uptime_secs: i64 },
    /// The restart went through but the start time could not be read.
    Indeterminate(RuntimeError),
}

impl RestartOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RestartOutcome::Succeeded { .. })
    }

    pub fn severity(&self) -> Severity {
        if self.is_success() {
            Severity::Info
        } else {
            Severity::Error
        }
    }

    /// Operator-facing message for this outcome.
    pub fn message(&self, container: &str) -> String {
        match self {
            RestartOutcome::Succeeded { uptime_secs } => format!(
                "Restart of {container} succeeded (up for {uptime_secs}s)"
            ),
            RestartOutcome::Failed { uptime_secs } => format!(
                "Restart of {container} failed (reported uptime {uptime_secs}s)"
            ),
            RestartOutcome::NotIssued(e) => {
                format!("Restart of {container} failed: restart command failed: {e}")
            }
            RestartOutcome::Indeterminate(e) => {
                format!("Restart of {container} failed: start time unavailable: {e}")
            }
        }
    }
}

/// Whole seconds between `started_at` and `now`, truncated.
pub fn uptime_secs(started_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - started_at).num_seconds()
}

/// Success iff `0 <= uptime < grace`.
pub fn classify(uptime_secs: i64, grace: Duration) -> RestartOutcome {
    let fresh = u64::try_from(uptime_secs)
        .map(|secs| secs < grace.as_secs())
        .unwrap_or(false);
    if fresh {
        RestartOutcome::Succeeded { uptime_secs }
    } else {
        RestartOutcome::Failed { uptime_secs }
    }
}

/// Restarts `container` and judges the restart by the container's uptime.
pub async fn restart_managed_service<R>(
    runtime: &R,
    container: &str,
    grace: Duration,
) -> RestartOutcome
where
    R: ContainerRuntime + ?Sized,
{
    if let Err(e) = runtime.restart(container).await {
        return RestartOutcome::NotIssued(e);
    }

    let started_at = match runtime.started_at(container).await {
        Ok(started_at) => started_at,
        Err(e) => {
            log::error!("Unable to read start time of {container}: {e}");
            return RestartOutcome::Indeterminate(e);
        }
    };

    let uptime = uptime_secs(started_at, Utc::now());
    log::info!("Container {container} started at {started_at}, up for {uptime}s");
    classify(uptime, grace)
}
