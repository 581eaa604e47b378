//! OAuth 2.0 authorization code flow for Google web applications.
//!
//! The service never sees the user's browser: it hands out a consent URL
//! carrying a CSRF `state`, and later receives the authorization code on its
//! registered redirect URL. This module builds that URL and talks to the
//! token endpoint for code exchange and refresh.

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{GatewayError, GatewayResult};
use crate::token::OAuthToken;

use super::config::GoogleConfig;

/// OAuth client for the Google token endpoint.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    config: GoogleConfig,
    http_client: reqwest::Client,
}

impl OAuthClient {
    /// Creates a new OAuth client sharing the given HTTP client.
    pub fn new(config: GoogleConfig, http_client: reqwest::Client) -> Self {
        Self {
            config,
            http_client,
        }
    }

    /// Builds the Google consent URL.
    ///
    /// Requests offline access and forces the consent prompt so Google always
    /// returns a refresh token.
    pub fn build_auth_url(&self, state: &str) -> String {
        let scope = self.config.scopes.join(" ");

        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}&\
            access_type=offline&prompt=consent",
            self.config.auth_url,
            urlencoding::encode(&self.config.credentials.client_id),
            urlencoding::encode(&self.config.redirect_url),
            urlencoding::encode(&scope),
            urlencoding::encode(state),
        )
    }

    /// Exchanges an authorization code for tokens.
    pub async fn exchange_code(&self, code: &str) -> GatewayResult<OAuthToken> {
        let params = [
            ("client_id", self.config.credentials.client_id.as_str()),
            ("client_secret", self.config.credentials.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.config.redirect_url.as_str()),
        ];

        let response = self.token_request(&params, "token exchange").await?;
        info!("obtained tokens from authorization code");
        Ok(OAuthToken::from_response(
            response.access_token,
            response.refresh_token,
            response.expires_in,
        ))
    }

    /// Refreshes an access token.
    ///
    /// The returned token keeps the old refresh token unless Google rotated it.
    pub async fn refresh(&self, token: &OAuthToken) -> GatewayResult<OAuthToken> {
        let Some(refresh_token) = token.refresh_token.as_deref() else {
            return Err(GatewayError::unauthorized("session has no refresh token"));
        };

        let params = [
            ("client_id", self.config.credentials.client_id.as_str()),
            ("client_secret", self.config.credentials.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let response = self.token_request(&params, "token refresh").await?;
        debug!("refreshed access token");
        Ok(OAuthToken::from_response(
            response.access_token,
            response.refresh_token,
            response.expires_in,
        )
        .inherit_refresh_token(token))
    }

    async fn token_request(
        &self,
        params: &[(&str, &str)],
        action: &str,
    ) -> GatewayResult<TokenResponse> {
        let response = self
            .http_client
            .post(&self.config.token_url)
            .form(params)
            .send()
            .await
            .map_err(|e| GatewayError::network(format!("{action} request failed")).with_source(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            GatewayError::network(format!("failed to read {action} response")).with_source(e)
        })?;

        if !status.is_success() {
            return Err(classify_token_error(status, &body, action));
        }

        serde_json::from_str(&body).map_err(|e| {
            GatewayError::invalid_response(format!("invalid {action} response")).with_source(e)
        })
    }
}

/// Maps a token endpoint failure onto a gateway error.
///
/// Rejected grants and client credentials are `Unauthorized`; the
/// orchestrator treats those as "the session is no longer usable".
fn classify_token_error(status: reqwest::StatusCode, body: &str, action: &str) -> GatewayError {
    let oauth_error = serde_json::from_str::<TokenErrorResponse>(body).ok();
    let kind = oauth_error
        .as_ref()
        .map(|e| e.error.as_str())
        .unwrap_or_default();
    let message = format!(
        "{action} failed ({status}): {}",
        oauth_error
            .as_ref()
            .and_then(|e| e.error_description.as_deref())
            .unwrap_or(kind)
    );

    match (status.as_u16(), kind) {
        (_, "invalid_grant" | "invalid_client" | "unauthorized_client") => {
            GatewayError::unauthorized(message)
        }
        (401, _) => GatewayError::unauthorized(message),
        (403, _) => GatewayError::forbidden(message),
        (429, _) => GatewayError::rate_limited(message),
        (400..=499, _) => GatewayError::bad_request(message),
        _ => GatewayError::server(message),
    }
}

/// Response from Google's token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Error body returned by the token endpoint.
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}
