//! Google Calendar gateway configuration.

use std::time::Duration;

use crate::error::{GatewayError, GatewayResult};

/// Google's OAuth consent endpoint.
pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
/// Google's OAuth token endpoint.
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
/// Base URL for Google Calendar API v3.
pub const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";
/// Read/write access to the user's calendars.
pub const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar";

/// OAuth 2.0 client credentials registered with Google.
#[derive(Clone)]
pub struct OAuthCredentials {
    /// The OAuth 2.0 client ID.
    pub client_id: String,
    /// The OAuth 2.0 client secret.
    pub client_secret: String,
}

impl std::fmt::Debug for OAuthCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

impl OAuthCredentials {
    /// Creates new OAuth credentials.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

/// Configuration for the Google gateway.
///
/// The endpoint URLs default to Google's production hosts and are only
/// overridden to point at a local stand-in.
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    /// OAuth credentials for API access.
    pub credentials: OAuthCredentials,
    /// Redirect URL registered for the web application client.
    pub redirect_url: String,
    /// OAuth scopes requested at consent.
    pub scopes: Vec<String>,
    /// Per-request HTTP timeout.
    pub timeout: Duration,
    /// Consent endpoint.
    pub auth_url: String,
    /// Token endpoint.
    pub token_url: String,
    /// Calendar API base URL.
    pub api_base: String,
}

impl GoogleConfig {
    /// Creates a configuration with default scopes, timeout and endpoints.
    pub fn new(credentials: OAuthCredentials, redirect_url: impl Into<String>) -> Self {
        Self {
            credentials,
            redirect_url: redirect_url.into(),
            scopes: vec![CALENDAR_SCOPE.to_string()],
            timeout: Duration::from_secs(30),
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            api_base: CALENDAR_API_BASE.to_string(),
        }
    }

    /// Builder: set the requested scopes.
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Builder: set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builder: set the consent endpoint.
    pub fn with_auth_url(mut self, url: impl Into<String>) -> Self {
        self.auth_url = url.into();
        self
    }

    /// Builder: set the token endpoint.
    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    /// Builder: set the Calendar API base URL.
    pub fn with_api_base(mut self, url: impl Into<String>) -> Self {
        self.api_base = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Checks credentials are present and every URL parses.
    pub fn validate(&self) -> GatewayResult<()> {
        if self.credentials.client_id.is_empty() {
            return Err(GatewayError::configuration("client_id is required"));
        }
        if self.credentials.client_secret.is_empty() {
            return Err(GatewayError::configuration("client_secret is required"));
        }
        if self.scopes.is_empty() {
            return Err(GatewayError::configuration("at least one scope is required"));
        }
        for (name, value) in [
            ("redirect_url", &self.redirect_url),
            ("auth_url", &self.auth_url),
            ("token_url", &self.token_url),
            ("api_base", &self.api_base),
        ] {
            url::Url::parse(value).map_err(|e| {
                GatewayError::configuration(format!("invalid {name} {value:?}")).with_source(e)
            })?;
        }
        Ok(())
    }
}
