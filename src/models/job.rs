use serde::{Deserialize, Deserializer, Serialize};
use strum::{Display, EnumString};

/// Lifecycle status of a dispatched job, as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Assigned,
    EnRoute,
    Arrived,
    InProgress,
    Completed,
    Cancelled,
}

impl JobStatus {
    /// Completed and cancelled jobs are dropped from local state.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Cancelled)
    }

    /// The single legal forward transition out of this status.
    pub fn next_action(self) -> Option<LifecycleAction> {
        match self {
            JobStatus::Assigned => Some(LifecycleAction::Depart),
            JobStatus::EnRoute => Some(LifecycleAction::MarkArrived),
            JobStatus::Arrived => Some(LifecycleAction::StartService),
            JobStatus::InProgress => Some(LifecycleAction::CompleteService),
            JobStatus::Completed | JobStatus::Cancelled => None,
        }
    }
}

/// A backend mutation that moves a job one step along its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum LifecycleAction {
    Depart,
    MarkArrived,
    StartService,
    CompleteService,
}

impl LifecycleAction {
    /// Label shown on the action button.
    pub fn label(self) -> &'static str {
        match self {
            LifecycleAction::Depart => "Start trip",
            LifecycleAction::MarkArrived => "Mark arrival",
            LifecycleAction::StartService => "Start service",
            LifecycleAction::CompleteService => "Complete",
        }
    }

    /// Status the backend is expected to report once the action succeeds.
    pub fn next_status(self) -> JobStatus {
        match self {
            LifecycleAction::Depart => JobStatus::EnRoute,
            LifecycleAction::MarkArrived => JobStatus::Arrived,
            LifecycleAction::StartService => JobStatus::InProgress,
            LifecycleAction::CompleteService => JobStatus::Completed,
        }
    }

    /// Path of the backend endpoint, relative to the API base URL.
    ///
    /// Departure is addressed by the dispatch (job) id; the tracking
    /// endpoints are addressed by the linked assistance request id.
    pub fn path(self, job: &Job) -> String {
        match self {
            LifecycleAction::Depart => format!("dispatch/{}/depart", job.id),
            LifecycleAction::MarkArrived => format!("tracking/{}/arrived", job.request_id),
            LifecycleAction::StartService => format!("tracking/{}/start", job.request_id),
            LifecycleAction::CompleteService => format!("tracking/{}/completed", job.request_id),
        }
    }
}

/// Where the technician has to go. Fixed for the lifetime of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    pub address: String,
    #[serde(default)]
    pub city: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    #[serde(rename = "customer_name")]
    pub name: String,
    #[serde(rename = "customer_phone", default)]
    pub phone: Option<String>,
}

/// One dispatched assistance task assigned to the current technician.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub request_id: i64,
    pub request_number: String,
    pub status: JobStatus,
    #[serde(flatten)]
    pub destination: Destination,
    #[serde(flatten)]
    pub customer: Customer,
    #[serde(deserialize_with = "decimal_amount")]
    pub earnings: f64,
    /// Computed by the backend, refreshed on every poll.
    #[serde(default)]
    pub distance_km: Option<f64>,
    #[serde(default)]
    pub eta_minutes: Option<u32>,
}

/// A job open for acceptance in the available list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOffer {
    pub id: i64,
    pub request_number: String,
    #[serde(default)]
    pub service_type: Option<String>,
    pub address: String,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub distance_km: Option<f64>,
    #[serde(deserialize_with = "decimal_amount")]
    pub earnings: f64,
}

/// Money fields arrive as decimal strings ("45.00") or plain numbers.
fn decimal_amount<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Amount {
        Number(f64),
        Text(String),
    }

    match Amount::deserialize(deserializer)? {
        Amount::Number(n) => Ok(n),
        Amount::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}
