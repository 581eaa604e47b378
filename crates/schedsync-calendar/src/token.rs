//! OAuth token set returned by the provider.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Seconds subtracted from the provider's `expires_in` so a token is treated
/// as expired slightly before the provider starts rejecting it.
const EXPIRY_SKEW_SECS: i64 = 60;

/// Access and refresh tokens for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthToken {
    /// The access token for API requests.
    pub access_token: String,

    /// The refresh token for obtaining new access tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// When the access token expires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

impl OAuthToken {
    /// Creates a token with no refresh token and unknown expiry.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expiry: None,
        }
    }

    /// Creates a token from token endpoint response fields.
    pub fn from_response(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_in_secs: Option<i64>,
    ) -> Self {
        let expiry = expires_in_secs.and_then(expiry_from_now);
        Self {
            access_token: access_token.into(),
            refresh_token,
            expiry,
        }
    }

    /// Builder: set the refresh token.
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Returns true if the access token is expired or about to expire.
    ///
    /// Tokens without a known expiry are assumed valid.
    pub fn is_expired(&self) -> bool {
        self.expiry.is_some_and(|expiry| Utc::now() >= expiry)
    }

    /// Keeps the previous refresh token when a refresh response omits one.
    pub fn inherit_refresh_token(mut self, previous: &OAuthToken) -> Self {
        if self.refresh_token.is_none() {
            self.refresh_token = previous.refresh_token.clone();
        }
        self
    }
}

/// Skewed expiry instant for `expires_in`, or `None` when it does not fit
/// in a timestamp.
fn expiry_from_now(expires_in_secs: i64) -> Option<DateTime<Utc>> {
    let delta = TimeDelta::try_seconds(expires_in_secs.checked_sub(EXPIRY_SKEW_SECS)?)?;
    Utc::now().checked_add_signed(delta)
}
