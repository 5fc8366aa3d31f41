//! One check-act-verify cycle.
//!
//! The watchdog is run by an external scheduler. It never loops or retries:
//! the next scheduled run re-checks the endpoint and restarts again if the
//! service is still down. Overlapping runs are the scheduler's concern.

use std::time::Duration;

use crate::docker::ContainerRuntime;
use crate::liveness::{EndpointTarget, Liveness, check_liveness};
use crate::notify::{Delivery, Notifier};
use crate::restart::{RestartOutcome, restart_managed_service};

#[derive(Debug)]
pub enum CycleReport {
    /// The endpoint answered with results, nothing was touched.
    Healthy,
    Healed {
        reason: String,
        outcome: RestartOutcome,
        delivery: Delivery,
    },
}

pub struct Watchdog<R, N> {
    pub client: reqwest::Client,
    pub target: EndpointTarget,
    pub container: String,
    pub grace_window: Duration,
    pub runtime: R,
    pub notifier: N,
}

impl<R, N> Watchdog<R, N>
where
    R: ContainerRuntime,
    N: Notifier,
{
    pub async fn run(&self) -> CycleReport {
        let reason = match check_liveness(&self.client, &self.target).await {
            Liveness::Active => {
                log::info!("Endpoint is active. No action needed.");
                return CycleReport::Healthy;
            }
            Liveness::Inactive { reason } => reason,
        };

        log::error!(
            "Endpoint {} is INACTIVE ({reason}); restarting container '{}'",
            self.target.url,
            self.container
        );

        let outcome =
            restart_managed_service(&self.runtime, &self.container, self.grace_window).await;
        let message = outcome.message(&self.container);
        match &outcome {
            RestartOutcome::Succeeded { .. } => log::info!("{message}"),
            _ => log::error!("{message}"),
        }

        let delivery = self.notifier.notify(&message, outcome.severity()).await;

        CycleReport::Healed {
            reason,
            outcome,
            delivery,
        }
    }
}
