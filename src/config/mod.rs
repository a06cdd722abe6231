use garde::Validate;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Base URL of the dispatch REST API (e.g., "https://api.example.com/api/")
    #[garde(length(min = 1))]
    pub api_base_url: String,

    /// Where the session tokens are persisted between runs
    #[serde(default = "default_session_file")]
    #[garde(skip)]
    pub session_file: PathBuf,

    /// AES-256-GCM key for the session file (base64-encoded, 32 bytes).
    /// Tokens are stored in plain JSON when unset.
    #[serde(default)]
    #[garde(skip)]
    pub session_key: Option<String>,

    /// Seconds between location samples while en route
    #[serde(default = "default_location_interval")]
    #[garde(range(min = 1, max = 3600))]
    pub location_interval_secs: u64,

    /// Seconds between active-job refreshes in the tracker
    #[serde(default = "default_refresh_interval")]
    #[garde(range(min = 1, max = 3600))]
    pub refresh_interval_secs: u64,

    /// Per-request HTTP timeout
    #[serde(default = "default_request_timeout")]
    #[garde(range(min = 1, max = 300))]
    pub request_timeout_secs: u64,

    /// Prometheus listener address for the tracker (e.g., "127.0.0.1:9100")
    #[serde(default)]
    #[garde(skip)]
    pub metrics_addr: Option<String>,

    /// Simulated device route, "lat,lon;lat,lon;..."
    #[serde(default)]
    #[garde(skip)]
    pub route_waypoints: Option<String>,
}

fn default_session_file() -> PathBuf {
    PathBuf::from(".field-dispatch/session.json")
}

fn default_location_interval() -> u64 {
    10
}

fn default_refresh_interval() -> u64 {
    30
}

fn default_request_timeout() -> u64 {
    15
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config: Self = envy::from_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn location_interval(&self) -> Duration {
        Duration::from_secs(self.location_interval_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read configuration from environment: {0}")]
    Env(#[from] envy::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] garde::Report),
}
