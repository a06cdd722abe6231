use reqwest::{Client, Method, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::models::job::{Job, JobOffer, LifecycleAction};
use crate::models::location::LocationSample;
use crate::models::technician::TechnicianProfile;
use crate::services::session::{Credentials, Session, SessionError};

/// Access tokens this close to expiry are refreshed before use.
const EXPIRY_SKEW_SECS: i64 = 30;

/// Backend answer to an acceptance attempt. The race between technicians is
/// decided server-side; losing it is an expected outcome, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Acceptance {
    Accepted,
    AlreadyTaken { reason: String },
}

/// The dispatch endpoints the technician client depends on.
pub trait DispatchApi: Send + Sync + 'static {
    /// `GET /dispatch/my-profile`
    fn my_profile(&self) -> impl Future<Output = Result<TechnicianProfile, ApiError>> + Send;

    /// `GET /dispatch/available`
    fn available_jobs(&self) -> impl Future<Output = Result<Vec<JobOffer>, ApiError>> + Send;

    /// `POST /dispatch/{id}/accept`
    fn accept(&self, job_id: i64) -> impl Future<Output = Result<Acceptance, ApiError>> + Send;

    /// Run the backend mutation bound to `action` for `job`.
    fn transition(
        &self,
        action: LifecycleAction,
        job: &Job,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// `POST /dispatch/location`
    fn push_location(
        &self,
        sample: &LocationSample,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

#[derive(Deserialize)]
struct TokenPair {
    access: String,
    refresh: String,
}

#[derive(Deserialize)]
struct RefreshedToken {
    access: String,
    #[serde(default)]
    refresh: Option<String>,
}

/// reqwest-backed client for the dispatch REST API.
///
/// Every call carries the session's bearer token. A 401 triggers one
/// refresh-token exchange and a single replay; if the exchange is rejected
/// the session is cleared and the caller gets [`ApiError::Unauthenticated`].
pub struct HttpDispatchClient {
    http: Client,
    base_url: Url,
    session: Arc<Session>,
    refresh_lock: tokio::sync::Mutex<()>,
}

impl HttpDispatchClient {
    pub fn new(base_url: &str, session: Arc<Session>, timeout: Duration) -> Result<Self, ApiError> {
        let mut base = base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).map_err(|e| ApiError::InvalidUrl(e.to_string()))?;

        let http = Client::builder()
            .user_agent(concat!("field-dispatch/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            base_url,
            session,
            refresh_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Exchange username and password for a token pair and persist it.
    pub async fn login(&self, username: &str, password: &str) -> Result<(), ApiError> {
        let response = self
            .http
            .post(self.url("auth/token")?)
            .json(&LoginRequest { username, password })
            .send()
            .await?;

        let tokens: TokenPair = decode(expect_success(response).await?).await?;
        self.session.login(Credentials {
            access: tokens.access,
            refresh: tokens.refresh,
        })?;

        tracing::info!(username, "Logged in");
        Ok(())
    }

    pub fn logout(&self) -> Result<(), ApiError> {
        self.session.logout()?;
        tracing::info!("Logged out");
        Ok(())
    }

    fn url(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ApiError::InvalidUrl(e.to_string()))
    }

    /// Send an authorized request, refreshing and replaying once on 401.
    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Response, ApiError> {
        let url = self.url(path)?;
        let credentials = self.session.credentials().ok_or(ApiError::Unauthenticated)?;

        let mut token = credentials.access.clone();
        if let Some(expires_at) = credentials.access_expires_at() {
            if expires_at <= chrono::Utc::now() + chrono::Duration::seconds(EXPIRY_SKEW_SECS) {
                tracing::debug!(%expires_at, "Access token about to expire, refreshing first");
                token = self.refresh(&token).await?;
            }
        }

        let response = self.dispatch(method.clone(), url.clone(), &token, body).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        tracing::debug!(path, "Access token rejected, attempting refresh");
        let fresh = self.refresh(&token).await?;
        let replay = self.dispatch(method, url, &fresh, body).await?;

        if replay.status() == StatusCode::UNAUTHORIZED {
            tracing::warn!(path, "Request still unauthorized after refresh, clearing session");
            self.clear_session();
            return Err(ApiError::Unauthenticated);
        }

        Ok(replay)
    }

    async fn dispatch<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        token: &str,
        body: Option<&B>,
    ) -> Result<Response, ApiError> {
        let request_id = Uuid::new_v4();
        tracing::debug!(%request_id, %method, %url, "Dispatch API request");

        let mut request = self
            .http
            .request(method, url)
            .bearer_auth(token)
            .header("X-Request-ID", request_id.to_string());
        if let Some(body) = body {
            request = request.json(body);
        }

        Ok(request.send().await?)
    }

    /// Exchange the refresh token for a new access token.
    ///
    /// Concurrent callers that hit a 401 with the same stale token share one
    /// exchange: whoever gets the lock second sees the rotated token and
    /// returns it without calling the backend again.
    async fn refresh(&self, stale_access: &str) -> Result<String, ApiError> {
        let _guard = self.refresh_lock.lock().await;

        let credentials = self.session.credentials().ok_or(ApiError::Unauthenticated)?;
        if credentials.access != stale_access {
            return Ok(credentials.access);
        }

        let response = self
            .http
            .post(self.url("auth/token/refresh")?)
            .json(&RefreshRequest {
                refresh: &credentials.refresh,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "Token refresh rejected, clearing session");
            self.clear_session();
            return Err(ApiError::Unauthenticated);
        }

        let refreshed: RefreshedToken = decode(response).await?;
        self.session
            .rotate(refreshed.access.clone(), refreshed.refresh)?;

        tracing::debug!("Access token refreshed");
        Ok(refreshed.access)
    }

    fn clear_session(&self) {
        if let Err(e) = self.session.logout() {
            tracing::error!(error = %e, "Failed to clear session");
        }
    }
}

impl DispatchApi for HttpDispatchClient {
    async fn my_profile(&self) -> Result<TechnicianProfile, ApiError> {
        let response = self
            .send::<()>(Method::GET, "dispatch/my-profile", None)
            .await?;
        decode(expect_success(response).await?).await
    }

    async fn available_jobs(&self) -> Result<Vec<JobOffer>, ApiError> {
        let response = self
            .send::<()>(Method::GET, "dispatch/available", None)
            .await?;
        decode(expect_success(response).await?).await
    }

    async fn accept(&self, job_id: i64) -> Result<Acceptance, ApiError> {
        let path = format!("dispatch/{job_id}/accept");
        let response = self.send::<()>(Method::POST, &path, None).await?;

        match response.status() {
            StatusCode::CONFLICT | StatusCode::GONE => {
                let reason = error_message(&response.text().await.unwrap_or_default());
                Ok(Acceptance::AlreadyTaken { reason })
            }
            _ => {
                expect_success(response).await?;
                Ok(Acceptance::Accepted)
            }
        }
    }

    async fn transition(&self, action: LifecycleAction, job: &Job) -> Result<(), ApiError> {
        let response = self
            .send::<()>(Method::POST, &action.path(job), None)
            .await?;
        expect_success(response).await?;
        Ok(())
    }

    async fn push_location(&self, sample: &LocationSample) -> Result<(), ApiError> {
        garde::Validate::validate(sample)?;
        let response = self
            .send(Method::POST, "dispatch/location", Some(sample))
            .await?;
        expect_success(response).await?;
        Ok(())
    }
}

async fn expect_success(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ApiError::Rejected {
        status,
        message: error_message(&body),
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Pull a human-readable message out of a backend error body.
fn error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        detail: Option<String>,
        error: Option<String>,
        message: Option<String>,
    }

    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.detail.or(b.error).or(b.message))
        .unwrap_or_else(|| body.trim().to_string())
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Backend rejected the request ({status}): {message}")]
    Rejected { status: StatusCode, message: String },

    #[error("Not authenticated, please log in again")]
    Unauthenticated,

    #[error("Unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid API URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid location sample: {0}")]
    InvalidSample(#[from] garde::Report),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

impl ApiError {
    /// Worth retrying as-is: network trouble or a server-side failure.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Transport(_) => true,
            ApiError::Rejected { status, .. } => status.is_server_error(),
            _ => false,
        }
    }
}
