//! Recording stand-in for the dispatch backend used by the unit tests.

use reqwest::StatusCode;
use std::sync::Mutex;
use std::time::Duration;

use crate::models::job::{Customer, Destination, Job, JobOffer, JobStatus, LifecycleAction};
use crate::models::location::LocationSample;
use crate::models::technician::TechnicianProfile;
use crate::services::api::{Acceptance, ApiError, DispatchApi};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Profile,
    Available,
    Accept(i64),
    Transition(LifecycleAction),
    Location,
}

/// Behaves like a cooperative backend: a successful transition moves the
/// active job to the next status, completion clears it.
pub struct MockDispatch {
    calls: Mutex<Vec<Call>>,
    active_job: Mutex<Option<Job>>,
    pub transition_delay: Mutex<Option<Duration>>,
    pub reject_transitions: Mutex<Option<StatusCode>>,
    pub hold_status: Mutex<bool>,
    pub accept_result: Mutex<Option<Acceptance>>,
    pub fail_locations: Mutex<bool>,
}

impl MockDispatch {
    pub fn with_job(job: Option<Job>) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            active_job: Mutex::new(job),
            transition_delay: Mutex::new(None),
            reject_transitions: Mutex::new(None),
            hold_status: Mutex::new(false),
            accept_result: Mutex::new(None),
            fail_locations: Mutex::new(false),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == call).count()
    }

    pub fn set_job(&self, job: Option<Job>) {
        *self.active_job.lock().unwrap() = job;
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

pub fn sample_job(status: JobStatus) -> Job {
    Job {
        id: 12,
        request_id: 340,
        request_number: "AST-000340".to_string(),
        status,
        destination: Destination {
            address: "Av. Reforma 222".to_string(),
            city: Some("CDMX".to_string()),
            latitude: 19.4326,
            longitude: -99.1332,
        },
        customer: Customer {
            name: "Laura Mendez".to_string(),
            phone: Some("+525512345678".to_string()),
        },
        earnings: 450.0,
        distance_km: Some(3.2),
        eta_minutes: Some(11),
    }
}

impl DispatchApi for MockDispatch {
    async fn my_profile(&self) -> Result<TechnicianProfile, ApiError> {
        self.record(Call::Profile);
        Ok(TechnicianProfile {
            id: 4,
            full_name: "Diego Ramos".to_string(),
            phone: None,
            is_available: true,
            active_job: self.active_job.lock().unwrap().clone(),
        })
    }

    async fn available_jobs(&self) -> Result<Vec<JobOffer>, ApiError> {
        self.record(Call::Available);
        Ok(vec![JobOffer {
            id: 31,
            request_number: "AST-000031".to_string(),
            service_type: Some("Towing".to_string()),
            address: "Insurgentes Sur 1000".to_string(),
            city: None,
            distance_km: Some(1.4),
            earnings: 300.0,
        }])
    }

    async fn accept(&self, job_id: i64) -> Result<Acceptance, ApiError> {
        self.record(Call::Accept(job_id));
        let delay = *self.transition_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let result = self
            .accept_result
            .lock()
            .unwrap()
            .clone()
            .unwrap_or(Acceptance::Accepted);
        if result == Acceptance::Accepted {
            let mut job = sample_job(JobStatus::Assigned);
            job.id = job_id;
            self.set_job(Some(job));
        }
        Ok(result)
    }

    async fn transition(&self, action: LifecycleAction, _job: &Job) -> Result<(), ApiError> {
        self.record(Call::Transition(action));
        let delay = *self.transition_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let rejection = *self.reject_transitions.lock().unwrap();
        if let Some(status) = rejection {
            return Err(ApiError::Rejected {
                status,
                message: "Job is no longer assigned to you".to_string(),
            });
        }

        if *self.hold_status.lock().unwrap() {
            return Ok(());
        }

        let mut active = self.active_job.lock().unwrap();
        let next = action.next_status();
        if next.is_terminal() {
            *active = None;
        } else if let Some(job) = active.as_mut() {
            job.status = next;
        }
        Ok(())
    }

    async fn push_location(&self, _sample: &LocationSample) -> Result<(), ApiError> {
        self.record(Call::Location);
        if *self.fail_locations.lock().unwrap() {
            return Err(ApiError::Rejected {
                status: StatusCode::SERVICE_UNAVAILABLE,
                message: "try later".to_string(),
            });
        }
        Ok(())
    }
}
