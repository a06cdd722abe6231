//! Job status state machine for the technician's active job.
//!
//! The tracker never assumes the outcome of a transition: after the backend
//! accepts a mutation the job is re-fetched and only the server's answer is
//! published. Terminal or missing jobs send the technician back to the list.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::watch;

use crate::models::job::{Job, JobStatus, LifecycleAction};
use crate::models::technician::TechnicianProfile;
use crate::services::api::{ApiError, DispatchApi};

/// What the client should be showing.
#[derive(Debug, Clone, PartialEq)]
pub enum Screen {
    JobList,
    ActiveJob(Job),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AdvanceOutcome {
    /// The backend accepted `action`; `screen` reflects the reloaded state.
    Advanced {
        action: LifecycleAction,
        screen: Screen,
    },
    /// Another advance is still waiting on the backend. Nothing was sent.
    InFlight,
}

pub struct JobTracker<A> {
    api: Arc<A>,
    job: RwLock<Option<Job>>,
    in_flight: AtomicBool,
    status: watch::Sender<Option<JobStatus>>,
}

/// Clears the in-flight flag on every exit path.
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<A: DispatchApi> JobTracker<A> {
    pub fn new(api: Arc<A>) -> Self {
        let (status, _) = watch::channel(None);
        Self {
            api,
            job: RwLock::new(None),
            in_flight: AtomicBool::new(false),
            status,
        }
    }

    pub fn api(&self) -> &Arc<A> {
        &self.api
    }

    /// The locally held job, as last confirmed by the backend.
    pub fn current(&self) -> Option<Job> {
        self.job
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn screen(&self) -> Screen {
        match self.current() {
            Some(job) => Screen::ActiveJob(job),
            None => Screen::JobList,
        }
    }

    /// Status updates, `None` while no job is held.
    pub fn subscribe(&self) -> watch::Receiver<Option<JobStatus>> {
        self.status.subscribe()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Reload the active job from the backend.
    pub async fn refresh(&self) -> Result<Screen, TrackerError> {
        let profile = self.api.my_profile().await?;
        Ok(self.apply(profile))
    }

    /// Drive the single legal forward transition of the active job.
    pub async fn advance(&self) -> Result<AdvanceOutcome, TrackerError> {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            tracing::debug!("Advance already in flight, ignoring");
            return Ok(AdvanceOutcome::InFlight);
        };

        let job = self.current().ok_or(TrackerError::NoActiveJob)?;
        let action = job.status.next_action().ok_or(TrackerError::Terminal {
            job_id: job.id,
            status: job.status,
        })?;

        tracing::info!(
            job_id = job.id,
            status = %job.status,
            action = %action,
            "Advancing job"
        );

        if let Err(e) = self.api.transition(action, &job).await {
            metrics::counter!("dispatch_transition_failures_total", "action" => action.to_string())
                .increment(1);
            tracing::warn!(job_id = job.id, action = %action, error = %e, "Transition failed");
            return Err(e.into());
        }
        metrics::counter!("dispatch_transitions_total", "action" => action.to_string()).increment(1);

        let screen = self.refresh().await?;
        Ok(AdvanceOutcome::Advanced { action, screen })
    }

    fn apply(&self, profile: TechnicianProfile) -> Screen {
        let next = profile.open_job().cloned();

        let previous = {
            let mut held = self.job.write().unwrap_or_else(|poisoned| poisoned.into_inner());
            std::mem::replace(&mut *held, next.clone())
        };

        match (&previous, &next) {
            (Some(old), Some(new)) if old.id == new.id && old.status != new.status => {
                tracing::info!(job_id = new.id, from = %old.status, to = %new.status, "Job status changed");
            }
            (Some(old), Some(new)) if old.id != new.id => {
                tracing::info!(job_id = new.id, status = %new.status, "Now tracking a different job");
            }
            (None, Some(new)) => {
                tracing::info!(job_id = new.id, status = %new.status, "Active job loaded");
            }
            (Some(old), None) => {
                tracing::info!(job_id = old.id, "Job closed, returning to job list");
            }
            _ => {}
        }

        let status = next.as_ref().map(|job| job.status);
        self.status.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });

        match next {
            Some(job) => Screen::ActiveJob(job),
            None => Screen::JobList,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("No active job")]
    NoActiveJob,

    #[error("Job {job_id} is already {status}")]
    Terminal { job_id: i64, status: JobStatus },
}
