//! Background follower for the technician's active job.
//!
//! Lifecycle actions are usually driven from another process, so the agent
//! only learns about them by polling `my-profile`. While the job is en route
//! it polls at the sampling cadence: the location supervisor then sees the
//! job leave `EN_ROUTE` within one sampling tick.

use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::models::job::JobStatus;
use crate::services::api::{ApiError, DispatchApi};
use crate::services::lifecycle::{JobTracker, Screen, TrackerError};

#[derive(Debug, Clone, Copy)]
pub struct PollIntervals {
    pub refresh: Duration,
    pub location: Duration,
}

impl PollIntervals {
    pub fn for_status(&self, status: Option<JobStatus>) -> Duration {
        match status {
            Some(JobStatus::EnRoute) => self.refresh.min(self.location),
            _ => self.refresh,
        }
    }
}

#[derive(Debug)]
pub enum AgentExit {
    Shutdown,
    /// The job the agent was following is no longer open.
    JobFinished,
    /// The backend refused us for good (bad session, rejected request).
    Refused(ApiError),
}

/// Refresh the tracker until shutdown, until the followed job finishes, or
/// until the backend refuses the agent.
pub async fn follow_active_job<A: DispatchApi>(
    tracker: &JobTracker<A>,
    intervals: PollIntervals,
    shutdown: &CancellationToken,
) -> AgentExit {
    let mut seen_job = false;

    loop {
        match tracker.refresh().await {
            Ok(Screen::ActiveJob(job)) => {
                seen_job = true;
                tracing::info!(
                    job_id = job.id,
                    status = %job.status,
                    eta_minutes = job.eta_minutes,
                    distance_km = job.distance_km,
                    "Active job"
                );
            }
            Ok(Screen::JobList) if seen_job => {
                tracing::info!("Job finished");
                return AgentExit::JobFinished;
            }
            Ok(Screen::JobList) => tracing::debug!("No active job yet"),
            Err(TrackerError::Api(e)) if !e.is_transient() => {
                tracing::error!(error = %e, "Dispatch backend refused the tracker");
                return AgentExit::Refused(e);
            }
            Err(e) => tracing::warn!(error = %e, "Refresh failed, will retry"),
        }

        let wait = intervals.for_status(tracker.current().map(|job| job.status));
        tokio::select! {
            _ = shutdown.cancelled() => return AgentExit::Shutdown,
            _ = tokio::time::sleep(wait) => {}
        }
    }
}
