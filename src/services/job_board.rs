use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::models::job::{Job, JobOffer};
use crate::services::api::{Acceptance, ApiError, DispatchApi};
use crate::services::lifecycle::{JobTracker, Screen, TrackerError};

/// Result of trying to take an open job.
#[derive(Debug)]
pub enum AcceptOutcome {
    /// The job is ours; show the active-job view.
    Accepted(Job),
    /// Another technician got there first.
    AlreadyTaken { reason: String },
    /// An accept for this row is already waiting on the backend.
    InFlight,
    /// A technician holds at most one open job.
    ActiveJobHeld(Job),
    Failed(TrackerError),
}

impl AcceptOutcome {
    fn label(&self) -> &'static str {
        match self {
            AcceptOutcome::Accepted(_) => "accepted",
            AcceptOutcome::AlreadyTaken { .. } => "already_taken",
            AcceptOutcome::InFlight => "in_flight",
            AcceptOutcome::ActiveJobHeld(_) => "active_job_held",
            AcceptOutcome::Failed(_) => "failed",
        }
    }
}

/// The list of jobs open for acceptance.
pub struct JobBoard<A> {
    tracker: Arc<JobTracker<A>>,
    pending: Mutex<HashSet<i64>>,
}

/// Row lock held while an accept request is outstanding.
struct RowLock<'a> {
    pending: &'a Mutex<HashSet<i64>>,
    job_id: i64,
}

impl<'a> RowLock<'a> {
    fn acquire(pending: &'a Mutex<HashSet<i64>>, job_id: i64) -> Option<Self> {
        let inserted = pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(job_id);
        inserted.then(|| Self { pending, job_id })
    }
}

impl Drop for RowLock<'_> {
    fn drop(&mut self) {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.job_id);
    }
}

impl<A: DispatchApi> JobBoard<A> {
    pub fn new(tracker: Arc<JobTracker<A>>) -> Self {
        Self {
            tracker,
            pending: Mutex::new(HashSet::new()),
        }
    }

    pub async fn available(&self) -> Result<Vec<JobOffer>, ApiError> {
        self.tracker.api().available_jobs().await
    }

    /// Whether the accept button of `job_id` should be disabled.
    pub fn is_pending(&self, job_id: i64) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(&job_id)
    }

    pub async fn accept(&self, job_id: i64) -> AcceptOutcome {
        let outcome = self.try_accept(job_id).await;
        metrics::counter!("dispatch_accept_total", "outcome" => outcome.label()).increment(1);

        match &outcome {
            AcceptOutcome::Accepted(job) => {
                tracing::info!(job_id = job.id, request = %job.request_number, "Job accepted")
            }
            AcceptOutcome::AlreadyTaken { reason } => {
                tracing::info!(job_id, reason = %reason, "Job already taken")
            }
            AcceptOutcome::Failed(e) => tracing::warn!(job_id, error = %e, "Accept failed"),
            _ => {}
        }

        outcome
    }

    async fn try_accept(&self, job_id: i64) -> AcceptOutcome {
        if let Some(job) = self.tracker.current() {
            return AcceptOutcome::ActiveJobHeld(job);
        }

        let Some(_row) = RowLock::acquire(&self.pending, job_id) else {
            return AcceptOutcome::InFlight;
        };

        match self.tracker.api().accept(job_id).await {
            Ok(Acceptance::Accepted) => match self.tracker.refresh().await {
                Ok(Screen::ActiveJob(job)) => AcceptOutcome::Accepted(job),
                Ok(Screen::JobList) => AcceptOutcome::Failed(TrackerError::NoActiveJob),
                Err(e) => AcceptOutcome::Failed(e),
            },
            Ok(Acceptance::AlreadyTaken { reason }) => AcceptOutcome::AlreadyTaken { reason },
            Err(e) => AcceptOutcome::Failed(e.into()),
        }
    }
}
