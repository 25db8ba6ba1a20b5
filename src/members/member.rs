use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tokens are treated as expired this many seconds ahead of time
const EXPIRY_MARGIN_SECS: i64 = 60;

/// A platform account tracked by this project
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct Member {
    /// Platform-assigned project member id
    pub member_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub token_expires_at: DateTime<Utc>,
}

impl Member {
    pub fn new(
        member_id: String,
        access_token: String,
        refresh_token: String,
        expires_in: i64,
    ) -> Self {
        Self {
            member_id,
            access_token,
            refresh_token,
            token_expires_at: Self::expiration(expires_in),
        }
    }

    /// Absolute expiry for a token issued now with the given lifetime.
    /// Lifetimes beyond the representable range saturate.
    pub fn expiration(expires_in: i64) -> DateTime<Utc> {
        let now = Utc::now();
        Duration::try_seconds(expires_in)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .unwrap_or(if expires_in < 0 {
                DateTime::<Utc>::MIN_UTC
            } else {
                DateTime::<Utc>::MAX_UTC
            })
    }

    /// Check if the access token is expired (with 60s buffer)
    pub fn is_expired(&self) -> bool {
        self.token_expires_at <= Utc::now() + Duration::seconds(EXPIRY_MARGIN_SECS)
    }

    pub(crate) fn replace_tokens(
        &mut self,
        access_token: String,
        refresh_token: String,
        expires_in: i64,
    ) {
        self.access_token = access_token;
        self.refresh_token = refresh_token;
        self.token_expires_at = Self::expiration(expires_in);
    }
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Member")
            .field("member_id", &self.member_id)
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("token_expires_at", &self.token_expires_at)
            .finish()
    }
}
