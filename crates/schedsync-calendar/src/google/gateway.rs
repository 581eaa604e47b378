//! [`CalendarGateway`] implementation for Google Calendar.

use schedsync_core::{CalendarEvent, TimeWindow};
use tracing::debug;

use crate::error::{GatewayError, GatewayResult};
use crate::gateway::{BoxFuture, CalendarGateway, RemoteEvent};
use crate::token::OAuthToken;

use super::client::GoogleCalendarClient;
use super::config::GoogleConfig;
use super::oauth::OAuthClient;

const PROVIDER: &str = "google";

/// Google Calendar gateway.
///
/// Stateless apart from the shared HTTP connection pool; tokens are supplied
/// per call by the orchestrator.
#[derive(Debug, Clone)]
pub struct GoogleGateway {
    oauth: OAuthClient,
    calendar: GoogleCalendarClient,
}

impl GoogleGateway {
    /// Creates a gateway from a validated configuration.
    pub fn new(config: GoogleConfig) -> GatewayResult<Self> {
        config.validate()?;

        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::configuration("failed to create HTTP client").with_source(e))?;

        let calendar = GoogleCalendarClient::new(http_client.clone(), config.api_base.clone());
        let oauth = OAuthClient::new(config, http_client);

        Ok(Self { oauth, calendar })
    }
}

impl CalendarGateway for GoogleGateway {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn login_url(&self, state: &str) -> String {
        self.oauth.build_auth_url(state)
    }

    fn exchange_code(&self, code: String) -> BoxFuture<'_, GatewayResult<OAuthToken>> {
        Box::pin(async move {
            self.oauth
                .exchange_code(&code)
                .await
                .map_err(|e| e.with_provider(PROVIDER))
        })
    }

    fn refresh_token(&self, token: OAuthToken) -> BoxFuture<'_, GatewayResult<OAuthToken>> {
        Box::pin(async move {
            self.oauth
                .refresh(&token)
                .await
                .map_err(|e| e.with_provider(PROVIDER))
        })
    }

    fn list_events(
        &self,
        token: OAuthToken,
        window: TimeWindow,
    ) -> BoxFuture<'_, GatewayResult<Vec<RemoteEvent>>> {
        Box::pin(async move {
            let access_token = token.access_token.as_str();
            let calendars = self
                .calendar
                .list_calendars(access_token)
                .await
                .map_err(|e| e.with_provider(PROVIDER))?;
            debug!(count = calendars.len(), "listing events across calendars");

            let mut events = Vec::new();
            for calendar in calendars {
                let mut page = self
                    .calendar
                    .list_events(access_token, &calendar.id, &window)
                    .await
                    .map_err(|e| e.with_provider(PROVIDER))?;
                events.append(&mut page);
            }
            events.sort_by_key(|event| event.start);
            Ok(events)
        })
    }

    fn create_event(
        &self,
        token: OAuthToken,
        calendar_id: String,
        event: CalendarEvent,
    ) -> BoxFuture<'_, GatewayResult<String>> {
        Box::pin(async move {
            self.calendar
                .insert_event(&token.access_token, &calendar_id, &event)
                .await
                .map_err(|e| e.with_provider(PROVIDER))
        })
    }

    fn delete_event(
        &self,
        token: OAuthToken,
        calendar_id: String,
        event_id: String,
    ) -> BoxFuture<'_, GatewayResult<()>> {
        Box::pin(async move {
            self.calendar
                .delete_event(&token.access_token, &calendar_id, &event_id)
                .await
                .map_err(|e| e.with_provider(PROVIDER))
        })
    }

    fn create_calendar(
        &self,
        token: OAuthToken,
        title: String,
    ) -> BoxFuture<'_, GatewayResult<String>> {
        Box::pin(async move {
            self.calendar
                .insert_calendar(&token.access_token, &title)
                .await
                .map_err(|e| e.with_provider(PROVIDER))
        })
    }
}
