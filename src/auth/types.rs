use crate::members::StorageError;
use crate::platform::GatewayError;
use serde::Deserialize;
use std::fmt;
use thiserror::Error;

/// Longest token lifetime accepted from the platform (10 years)
const MAX_TOKEN_LIFETIME_SECS: i64 = 10 * 365 * 24 * 60 * 60;

/// Token set issued by the platform's token endpoint
#[derive(Clone, Deserialize, PartialEq)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: String,
    /// Lifetime in seconds from issuance
    pub expires_in: i64,
}

impl TokenGrant {
    /// Both tokens present and a positive, bounded lifetime
    pub fn is_usable(&self) -> bool {
        !self.access_token.is_empty()
            && !self.refresh_token.is_empty()
            && (1..=MAX_TOKEN_LIFETIME_SECS).contains(&self.expires_in)
    }
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Token endpoint body, decoded once at the boundary
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum TokenResponse {
    Success(TokenGrant),
    Failure {
        error: String,
        #[serde(default)]
        error_description: Option<String>,
    },
}

impl TokenResponse {
    /// Returns `None` when the body carries neither a token set nor an error
    pub fn decode(body: &[u8]) -> Option<Self> {
        serde_json::from_slice(body).ok()
    }
}

/// Why the token endpoint did not produce a token set
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TokenExchangeFailure {
    #[error("platform returned error '{error}'{}", with_description(.description))]
    Rejected {
        error: String,
        description: Option<String>,
    },

    #[error("response with status {status} contained neither a usable token set nor error information")]
    Malformed { status: u16 },
}

fn with_description(description: &Option<String>) -> String {
    description
        .as_deref()
        .map(|d| format!(": {}", d))
        .unwrap_or_default()
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("OAuth configuration incomplete: missing {0}")]
    Configuration(String),

    #[error("Token exchange failed: {0}")]
    TokenExchange(TokenExchangeFailure),

    #[error("Token refresh failed: {0}")]
    Refresh(TokenExchangeFailure),

    #[error("Member identity request to {url} returned status {status}")]
    IdentityFetch { url: String, status: u16 },

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
