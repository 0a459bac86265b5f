/// Token record persisted between runs
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Account metadata returned alongside a credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct UserInfo {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub tier: Option<String>,
}

impl UserInfo {
    pub(crate) fn from_parts(email: Option<String>, tier: Option<String>) -> Option<Self> {
        if email.is_none() && tier.is_none() {
            None
        } else {
            Some(Self { email, tier })
        }
    }
}

/// The single stored credential for this installation
///
/// `expires_at` of `None` marks a credential that does not expire, such as
/// an API key handed back by the remote poll flow.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub user: Option<UserInfo>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl TokenRecord {
    /// Build a record from a token endpoint response, anchored at `now`
    pub fn from_response(response: TokenResponse, now: DateTime<Utc>) -> Self {
        // An expiry too far out to represent is treated as non-expiring.
        let expires_at = response.expires_in.and_then(|secs| {
            let secs = i64::try_from(secs).ok()?;
            now.checked_add_signed(ChronoDuration::try_seconds(secs)?)
        });

        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_at,
            token_type: response.token_type.unwrap_or_else(default_token_type),
            user: response.user,
        }
    }

    /// Record for a non-expiring API key
    pub fn api_key(key: String, user: Option<UserInfo>) -> Self {
        Self {
            access_token: key,
            refresh_token: None,
            expires_at: None,
            token_type: default_token_type(),
            user,
        }
    }

    /// Check if the token is expired
    pub fn is_expired(&self) -> bool {
        self.expires_within(Duration::ZERO)
    }

    /// True when the token expires within `buffer` from now (or already has)
    pub fn expires_within(&self, buffer: Duration) -> bool {
        self.expires_within_at(buffer, Utc::now())
    }

    pub(crate) fn expires_within_at(&self, buffer: Duration, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => {
                let buffer = ChronoDuration::from_std(buffer).unwrap_or(ChronoDuration::MAX);
                now.checked_add_signed(buffer)
                    .map_or(true, |deadline| deadline >= expires_at)
            }
            None => false,
        }
    }

    /// Seconds remaining before expiry; `None` for non-expiring credentials
    pub fn seconds_until_expiry(&self) -> Option<i64> {
        self.expires_at
            .map(|expires_at| (expires_at - Utc::now()).num_seconds())
    }
}

impl std::fmt::Debug for TokenRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRecord")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_at", &self.expires_at)
            .field("token_type", &self.token_type)
            .field("user", &self.user)
            .finish()
    }
}

/// Wire shape of the token and refresh endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub user: Option<UserInfo>,
}
