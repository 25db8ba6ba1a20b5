use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use axum::http::{header, HeaderMap};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

/// Cookie carrying the logged-in member
pub const SESSION_COOKIE_NAME: &str = "oh_member_session";

/// Session lifetime (1 day)
const SESSION_MAX_AGE_SECS: i64 = 24 * 60 * 60;

/// Session cookie errors
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("No session cookie present")]
    Missing,

    #[error("Session expired")]
    Expired,

    #[error("Failed to serialize session data: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Failed to encrypt session: {0}")]
    EncryptionError(String),

    #[error("Failed to decrypt session: {0}")]
    DecryptionError(String),

    #[error("Invalid session format: {0}")]
    InvalidFormat(String),

    #[error("Failed to decode base64: {0}")]
    Base64Error(#[from] base64::DecodeError),
}

/// Contents of the session cookie
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemberSession {
    pub member_id: String,
    pub issued_at: DateTime<Utc>,
}

/// Issues and reads encrypted member session cookies.
///
/// Cookie format: base64url([12-byte nonce][ciphertext][16-byte auth tag])
pub struct SessionManager {
    cipher: Aes256Gcm,
    max_age_secs: i64,
}

impl SessionManager {
    pub fn new(key: &[u8; 32]) -> Self {
        let cipher = Aes256Gcm::new(key.into());
        Self {
            cipher,
            max_age_secs: SESSION_MAX_AGE_SECS,
        }
    }

    /// `Set-Cookie` value logging `member_id` in
    pub fn login_cookie(&self, member_id: &str) -> Result<String, SessionError> {
        let session = MemberSession {
            member_id: member_id.to_string(),
            issued_at: Utc::now(),
        };
        let value = self.encrypt(&session)?;

        Ok(format!(
            "{}={}; HttpOnly; SameSite=Lax; Max-Age={}; Path=/",
            SESSION_COOKIE_NAME, value, self.max_age_secs
        ))
    }

    /// Member id of the session carried by the request headers
    pub fn member_id(&self, headers: &HeaderMap) -> Result<String, SessionError> {
        let value = extract_cookie(headers, SESSION_COOKIE_NAME).ok_or(SessionError::Missing)?;
        let session: MemberSession = self.decrypt(&value)?;

        if Utc::now() - session.issued_at > Duration::seconds(self.max_age_secs) {
            return Err(SessionError::Expired);
        }

        Ok(session.member_id)
    }

    fn encrypt<T: Serialize>(&self, data: &T) -> Result<String, SessionError> {
        let plaintext = serde_json::to_vec(data)?;

        // Generate random 12-byte nonce
        let mut rng = rand::thread_rng();
        let nonce_bytes: [u8; 12] = rng.gen();
        let nonce = Nonce::from(nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_ref())
            .map_err(|e| SessionError::EncryptionError(e.to_string()))?;

        let mut encrypted = Vec::with_capacity(12 + ciphertext.len());
        encrypted.extend_from_slice(&nonce_bytes);
        encrypted.extend_from_slice(&ciphertext);

        Ok(URL_SAFE_NO_PAD.encode(encrypted))
    }

    fn decrypt<T: DeserializeOwned>(&self, encoded: &str) -> Result<T, SessionError> {
        let encrypted = URL_SAFE_NO_PAD.decode(encoded)?;

        // 12-byte nonce + 16-byte tag
        if encrypted.len() < 28 {
            return Err(SessionError::InvalidFormat(format!(
                "Cookie too short: {} bytes (minimum 28)",
                encrypted.len()
            )));
        }

        let nonce_bytes: [u8; 12] = encrypted[0..12]
            .try_into()
            .map_err(|_| SessionError::InvalidFormat("Failed to extract nonce".to_string()))?;
        let nonce = Nonce::from(nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(&nonce, &encrypted[12..])
            .map_err(|e| SessionError::DecryptionError(e.to_string()))?;

        Ok(serde_json::from_slice(&plaintext)?)
    }
}

/// Value of cookie `cookie_name` from the request headers
fn extract_cookie(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|cookie| {
            let (name, value) = cookie.trim().split_once('=')?;
            if name == cookie_name {
                Some(value.to_string())
            } else {
                None
            }
        })
}
