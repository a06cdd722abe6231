use serde::{Deserialize, Serialize};

use crate::models::job::Job;

/// Response of `GET /dispatch/my-profile`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicianProfile {
    pub id: i64,
    pub full_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub is_available: bool,
    /// At most one non-terminal job per technician.
    #[serde(default)]
    pub active_job: Option<Job>,
}

impl TechnicianProfile {
    /// The active job, ignoring one the backend still reports after it ended.
    pub fn open_job(&self) -> Option<&Job> {
        self.active_job.as_ref().filter(|job| !job.status.is_terminal())
    }
}
