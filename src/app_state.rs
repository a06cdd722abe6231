use std::sync::Arc;

use crate::config::AppConfig;
use crate::services::{
    api::{ApiError, HttpDispatchClient},
    job_board::JobBoard,
    lifecycle::JobTracker,
    session::{Session, SessionError, SessionStore},
    vault::{SessionVault, VaultError},
};

/// Shared client state handed to every command.
#[derive(Clone)]
pub struct AppState {
    pub client: Arc<HttpDispatchClient>,
    pub tracker: Arc<JobTracker<HttpDispatchClient>>,
    pub board: Arc<JobBoard<HttpDispatchClient>>,
}

impl AppState {
    pub fn new(client: HttpDispatchClient) -> Self {
        let client = Arc::new(client);
        let tracker = Arc::new(JobTracker::new(client.clone()));
        let board = Arc::new(JobBoard::new(tracker.clone()));
        Self {
            client,
            tracker,
            board,
        }
    }

    /// Restore the stored session and build the HTTP client around it.
    pub fn from_config(config: &AppConfig) -> Result<Self, StartupError> {
        let vault = config
            .session_key
            .as_deref()
            .map(SessionVault::new)
            .transpose()?;
        if vault.is_none() {
            tracing::warn!("SESSION_KEY not set, session tokens are stored unencrypted");
        }

        let session = Session::open(SessionStore::new(&config.session_file, vault))?;
        let client = HttpDispatchClient::new(
            &config.api_base_url,
            Arc::new(session),
            config.request_timeout(),
        )?;

        Ok(Self::new(client))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Session key error: {0}")]
    Vault(#[from] VaultError),

    #[error("Failed to load session: {0}")]
    Session(#[from] SessionError),

    #[error("Failed to build API client: {0}")]
    Api(#[from] ApiError),
}
