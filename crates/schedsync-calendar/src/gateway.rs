//! CalendarGateway trait definition.
//!
//! A gateway is a thin, stateless client over a calendar provider. It never
//! stores tokens itself: every call receives the caller's [`OAuthToken`] and
//! failures are classified into [`GatewayError`](crate::GatewayError) codes so the orchestrator
//! can decide whether to refresh, recreate, or give up.

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use schedsync_core::{CalendarEvent, TimeWindow};

use crate::error::GatewayResult;
use crate::token::OAuthToken;

/// A boxed future for object-safe async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// An event read back from the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEvent {
    /// Provider event id.
    pub id: String,
    /// Calendar the event lives in.
    pub calendar_id: String,
    /// Event summary.
    pub title: String,
    /// Event start.
    pub start: DateTime<Utc>,
    /// Event end.
    pub end: DateTime<Utc>,
}

/// The provider-facing side of calendar synchronization.
///
/// Implementations must be `Send + Sync`; the orchestrator shares one
/// gateway across all users.
pub trait CalendarGateway: Send + Sync {
    /// Returns the provider name (e.g., "google").
    fn name(&self) -> &str;

    /// Builds the consent URL carrying `state` as the CSRF nonce.
    fn login_url(&self, state: &str) -> String;

    /// Exchanges an authorization code for a token set.
    ///
    /// Fails with [`GatewayErrorCode::Unauthorized`](crate::GatewayErrorCode::Unauthorized) when the provider rejects the
    /// code or the client credentials.
    fn exchange_code(&self, code: String) -> BoxFuture<'_, GatewayResult<OAuthToken>>;

    /// Obtains a new access token using the token's refresh token.
    ///
    /// If the provider does not rotate the refresh token, the returned token
    /// carries the previous one forward.
    fn refresh_token(&self, token: OAuthToken) -> BoxFuture<'_, GatewayResult<OAuthToken>>;

    /// Lists events in the window across the user's calendars.
    fn list_events(
        &self,
        token: OAuthToken,
        window: TimeWindow,
    ) -> BoxFuture<'_, GatewayResult<Vec<RemoteEvent>>>;

    /// Creates an event in the given calendar and returns its provider id.
    fn create_event(
        &self,
        token: OAuthToken,
        calendar_id: String,
        event: CalendarEvent,
    ) -> BoxFuture<'_, GatewayResult<String>>;

    /// Deletes an event from the given calendar.
    fn delete_event(
        &self,
        token: OAuthToken,
        calendar_id: String,
        event_id: String,
    ) -> BoxFuture<'_, GatewayResult<()>>;

    /// Creates a secondary calendar and returns its provider id.
    fn create_calendar(
        &self,
        token: OAuthToken,
        title: String,
    ) -> BoxFuture<'_, GatewayResult<String>>;
}
