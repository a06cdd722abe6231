//! Technician session.
//!
//! The access/refresh token pair is the only state shared between the
//! commands of the client. It lives in an explicit [`Session`] handed to the
//! HTTP client, and touches disk only at login, token rotation and logout.

use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::services::vault::{SessionVault, VaultError};

/// JWT pair issued by the auth endpoints.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub access: String,
    pub refresh: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access", &"<redacted>")
            .field("refresh", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Expiry of the access token, read from its `exp` claim.
    ///
    /// The signature is not checked; the backend stays the authority and a
    /// wrong guess only costs one 401 round-trip.
    pub fn access_expires_at(&self) -> Option<DateTime<Utc>> {
        #[derive(Deserialize)]
        struct Claims {
            exp: Option<i64>,
        }

        let payload = self.access.split('.').nth(1)?;
        let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .ok()?;
        let claims: Claims = serde_json::from_slice(&bytes).ok()?;
        Utc.timestamp_opt(claims.exp?, 0).single()
    }
}

/// File-backed persistence for [`Credentials`], optionally sealed.
pub struct SessionStore {
    path: PathBuf,
    vault: Option<SessionVault>,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>, vault: Option<SessionVault>) -> Self {
        Self {
            path: path.into(),
            vault,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read stored credentials. A missing file means "logged out".
    pub fn load(&self) -> Result<Option<Credentials>, SessionError> {
        let raw = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SessionError::Io(e)),
        };

        let plain = match &self.vault {
            Some(vault) => vault.open(&raw)?,
            None => raw,
        };

        Ok(Some(serde_json::from_slice(&plain)?))
    }

    pub fn save(&self, credentials: &Credentials) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let plain = serde_json::to_vec(credentials)?;
        let bytes = match &self.vault {
            Some(vault) => vault.seal(&plain)?,
            None => plain,
        };

        std::fs::write(&self.path, bytes)?;
        Ok(())
    }

    pub fn clear(&self) -> Result<(), SessionError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SessionError::Io(e)),
        }
    }
}

/// Credentials of the signed-in technician, shared by every API call.
pub struct Session {
    credentials: RwLock<Option<Credentials>>,
    store: Option<SessionStore>,
}

impl Session {
    /// A session that never touches disk.
    pub fn in_memory(credentials: Option<Credentials>) -> Self {
        Self {
            credentials: RwLock::new(credentials),
            store: None,
        }
    }

    /// Load boundary: restore whatever the last login left behind.
    pub fn open(store: SessionStore) -> Result<Self, SessionError> {
        let credentials = store.load()?;
        tracing::debug!(
            path = %store.path().display(),
            authenticated = credentials.is_some(),
            "Session loaded"
        );
        Ok(Self {
            credentials: RwLock::new(credentials),
            store: Some(store),
        })
    }

    pub fn credentials(&self) -> Option<Credentials> {
        self.credentials
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.credentials().map(|c| c.access)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.credentials().map(|c| c.refresh)
    }

    pub fn is_authenticated(&self) -> bool {
        self.credentials().is_some()
    }

    /// Save boundary: a fresh login replaces any previous credentials.
    pub fn login(&self, credentials: Credentials) -> Result<(), SessionError> {
        if let Some(store) = &self.store {
            store.save(&credentials)?;
        }
        self.replace(Some(credentials));
        Ok(())
    }

    /// Store the result of a refresh exchange. The refresh token is kept
    /// unless the backend rotated it.
    pub fn rotate(&self, access: String, refresh: Option<String>) -> Result<(), SessionError> {
        let Some(current) = self.credentials() else {
            return Err(SessionError::NotAuthenticated);
        };
        let rotated = Credentials {
            access,
            refresh: refresh.unwrap_or(current.refresh),
        };
        if let Some(store) = &self.store {
            store.save(&rotated)?;
        }
        self.replace(Some(rotated));
        Ok(())
    }

    /// Drop credentials from memory and disk.
    pub fn logout(&self) -> Result<(), SessionError> {
        self.replace(None);
        match &self.store {
            Some(store) => store.clear(),
            None => Ok(()),
        }
    }

    fn replace(&self, credentials: Option<Credentials>) {
        *self
            .credentials
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = credentials;
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session file is malformed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Session vault error: {0}")]
    Vault(#[from] VaultError),

    #[error("Not logged in")]
    NotAuthenticated,
}
