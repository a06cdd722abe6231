//! Session file sealing.
//!
//! Layout: `version (1) || nonce (12) || ciphertext+tag`. The version byte and
//! a fixed purpose label are authenticated as associated data, so bytes
//! sealed with the same key for anything other than a session file, or under
//! another format version, fail to open.

use aes_gcm::aead::{Aead, KeyInit, OsRng, Payload};
use aes_gcm::{AeadCore, Aes256Gcm, Nonce};
use base64::Engine;

const FORMAT_VERSION: u8 = 1;
const NONCE_LEN: usize = 12;
const PURPOSE: &[u8] = b"field-dispatch/session";

pub struct SessionVault {
    cipher: Aes256Gcm,
}

impl SessionVault {
    /// Create from a base64-encoded 32-byte key.
    pub fn new(key_base64: &str) -> Result<Self, VaultError> {
        let key = base64::engine::general_purpose::STANDARD
            .decode(key_base64.trim())
            .map_err(|_| VaultError::InvalidKey)?;
        let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| VaultError::InvalidKey)?;
        Ok(Self { cipher })
    }

    pub fn seal(&self, credentials_json: &[u8]) -> Result<Vec<u8>, VaultError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let aad = associated_data(FORMAT_VERSION);
        let ciphertext = self
            .cipher
            .encrypt(
                &nonce,
                Payload {
                    msg: credentials_json,
                    aad: &aad,
                },
            )
            .map_err(|_| VaultError::SealFailed)?;

        let mut sealed = Vec::with_capacity(1 + NONCE_LEN + ciphertext.len());
        sealed.push(FORMAT_VERSION);
        sealed.extend_from_slice(&nonce);
        sealed.extend(ciphertext);
        Ok(sealed)
    }

    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, VaultError> {
        let Some((&version, rest)) = sealed.split_first() else {
            return Err(VaultError::OpenFailed);
        };
        if version != FORMAT_VERSION {
            return Err(VaultError::UnsupportedVersion(version));
        }
        if rest.len() < NONCE_LEN {
            return Err(VaultError::OpenFailed);
        }

        let (nonce, ciphertext) = rest.split_at(NONCE_LEN);
        let aad = associated_data(version);
        self.cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad: &aad,
                },
            )
            .map_err(|_| VaultError::OpenFailed)
    }
}

fn associated_data(version: u8) -> Vec<u8> {
    let mut aad = PURPOSE.to_vec();
    aad.push(version);
    aad
}

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("Invalid session key (must be 32 bytes, base64-encoded)")]
    InvalidKey,

    #[error("Failed to seal session")]
    SealFailed,

    #[error("Failed to open session (wrong key or corrupted file)")]
    OpenFailed,

    #[error("Session file format v{0} is not supported, log in again")]
    UnsupportedVersion(u8),
}
