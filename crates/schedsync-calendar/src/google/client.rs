//! Google Calendar API client.
//!
//! Low-level HTTP calls against Calendar API v3. Every call takes the access
//! token explicitly; status codes are mapped onto [`GatewayError`] codes in
//! one place, [`check_status`].

use chrono::{DateTime, NaiveDate, Utc};
use schedsync_core::{CalendarEvent, TimeWindow};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{GatewayError, GatewayResult};
use crate::gateway::RemoteEvent;

/// Google Calendar API client.
#[derive(Debug, Clone)]
pub struct GoogleCalendarClient {
    http_client: reqwest::Client,
    api_base: String,
}

impl GoogleCalendarClient {
    /// Creates a new client against the given API base URL.
    pub fn new(http_client: reqwest::Client, api_base: impl Into<String>) -> Self {
        Self {
            http_client,
            api_base: api_base.into(),
        }
    }

    /// Lists the calendars in the user's calendar list.
    pub async fn list_calendars(&self, access_token: &str) -> GatewayResult<Vec<CalendarListEntry>> {
        let url = format!("{}/users/me/calendarList", self.api_base);
        let mut calendars = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self.http_client.get(&url).bearer_auth(access_token);
            if let Some(token) = page_token.as_deref() {
                request = request.query(&[("pageToken", token)]);
            }

            let response = check_status(send(request).await?).await?;
            let page: CalendarListResponse = parse_json(response).await?;
            calendars.extend(page.items);

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(calendars)
    }

    /// Lists timed and all-day events of one calendar within the window.
    pub async fn list_events(
        &self,
        access_token: &str,
        calendar_id: &str,
        window: &TimeWindow,
    ) -> GatewayResult<Vec<RemoteEvent>> {
        let url = format!(
            "{}/calendars/{}/events",
            self.api_base,
            urlencoding::encode(calendar_id)
        );
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .http_client
                .get(&url)
                .bearer_auth(access_token)
                .query(&[
                    ("timeMin", window.start.to_rfc3339()),
                    ("timeMax", window.end.to_rfc3339()),
                    ("singleEvents", "true".to_string()),
                    ("orderBy", "startTime".to_string()),
                ]);
            if let Some(token) = page_token.as_deref() {
                request = request.query(&[("pageToken", token)]);
            }

            let response = check_status(send(request).await?).await?;
            let page: EventListResponse = parse_json(response).await?;
            events.extend(
                page.items
                    .into_iter()
                    .filter_map(|event| convert_event(event, calendar_id)),
            );

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(calendar_id = %calendar_id, count = events.len(), "fetched events");
        Ok(events)
    }

    /// Inserts an event and returns its id.
    pub async fn insert_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event: &CalendarEvent,
    ) -> GatewayResult<String> {
        let url = format!(
            "{}/calendars/{}/events",
            self.api_base,
            urlencoding::encode(calendar_id)
        );
        let body = InsertEventRequest {
            summary: &event.title,
            start: ApiDateTime {
                date_time: event.start.to_rfc3339(),
            },
            end: ApiDateTime {
                date_time: event.end.to_rfc3339(),
            },
        };

        let request = self
            .http_client
            .post(&url)
            .bearer_auth(access_token)
            .json(&body);
        let response = check_status(send(request).await?).await?;
        let created: CreatedResource = parse_json(response).await?;
        Ok(created.id)
    }

    /// Deletes an event.
    pub async fn delete_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event_id: &str,
    ) -> GatewayResult<()> {
        let url = format!(
            "{}/calendars/{}/events/{}",
            self.api_base,
            urlencoding::encode(calendar_id),
            urlencoding::encode(event_id)
        );

        let request = self.http_client.delete(&url).bearer_auth(access_token);
        check_status(send(request).await?).await?;
        Ok(())
    }

    /// Creates a secondary calendar and returns its id.
    pub async fn insert_calendar(&self, access_token: &str, title: &str) -> GatewayResult<String> {
        let url = format!("{}/calendars", self.api_base);
        let request = self
            .http_client
            .post(&url)
            .bearer_auth(access_token)
            .json(&InsertCalendarRequest { summary: title });

        let response = check_status(send(request).await?).await?;
        let created: CreatedResource = parse_json(response).await?;
        Ok(created.id)
    }
}

async fn send(request: reqwest::RequestBuilder) -> GatewayResult<reqwest::Response> {
    request.send().await.map_err(|e| {
        if e.is_timeout() {
            GatewayError::network("request timeout").with_source(e)
        } else if e.is_connect() {
            GatewayError::network("connection failed").with_source(e)
        } else {
            GatewayError::network("request failed").with_source(e)
        }
    })
}

/// Maps non-success statuses onto gateway errors.
async fn check_status(response: reqwest::Response) -> GatewayResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get("Retry-After")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok());
    let body = response.text().await.unwrap_or_default();

    Err(match status {
        reqwest::StatusCode::UNAUTHORIZED => {
            GatewayError::unauthorized("access token expired or invalid")
        }
        reqwest::StatusCode::NOT_FOUND | reqwest::StatusCode::GONE => {
            GatewayError::not_found(format!("resource not found ({status})"))
        }
        reqwest::StatusCode::TOO_MANY_REQUESTS => GatewayError::rate_limited(format!(
            "rate limit exceeded{}",
            retry_after
                .map(|s| format!(", retry after {} seconds", s))
                .unwrap_or_default()
        )),
        reqwest::StatusCode::FORBIDDEN => {
            GatewayError::forbidden(format!("access denied: {}", body))
        }
        reqwest::StatusCode::BAD_REQUEST => {
            GatewayError::bad_request(format!("bad request: {}", body))
        }
        _ => GatewayError::server(format!("API error ({}): {}", status, body)),
    })
}

async fn parse_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> GatewayResult<T> {
    let body = response
        .text()
        .await
        .map_err(|e| GatewayError::network("failed to read response").with_source(e))?;
    serde_json::from_str(&body)
        .map_err(|e| GatewayError::invalid_response("failed to parse response").with_source(e))
}

fn convert_event(event: ApiEvent, calendar_id: &str) -> Option<RemoteEvent> {
    if event.status.as_deref() == Some("cancelled") {
        return None;
    }

    let id = event.id?;
    let start = parse_time(&event.start).or_else(|| {
        warn!(event_id = %id, "event has no usable start time");
        None
    })?;
    let end = parse_time(&event.end).or_else(|| {
        warn!(event_id = %id, "event has no usable end time");
        None
    })?;

    Some(RemoteEvent {
        id,
        calendar_id: calendar_id.to_string(),
        title: event.summary.unwrap_or_default(),
        start,
        end,
    })
}

/// All-day events are pinned to midnight UTC.
fn parse_time(time: &ApiEventTime) -> Option<DateTime<Utc>> {
    if let Some(dt) = time.date_time.as_deref() {
        return DateTime::parse_from_rfc3339(dt)
            .ok()
            .map(|parsed| parsed.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(time.date.as_deref()?, "%Y-%m-%d").ok()?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc())
}

/// Response from the calendarList.list endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CalendarListResponse {
    #[serde(default)]
    items: Vec<CalendarListEntry>,
    next_page_token: Option<String>,
}

/// A calendar in the user's calendar list.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarListEntry {
    /// Calendar identifier.
    pub id: String,
    /// Calendar title.
    #[serde(default)]
    pub summary: Option<String>,
    /// Whether this is the user's primary calendar.
    #[serde(default)]
    pub primary: bool,
}

/// Response from the events.list endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventListResponse {
    #[serde(default)]
    items: Vec<ApiEvent>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiEvent {
    id: Option<String>,
    summary: Option<String>,
    status: Option<String>,
    #[serde(default)]
    start: ApiEventTime,
    #[serde(default)]
    end: ApiEventTime,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiEventTime {
    date_time: Option<String>,
    date: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiDateTime {
    date_time: String,
}

#[derive(Debug, Serialize)]
struct InsertEventRequest<'a> {
    summary: &'a str,
    start: ApiDateTime,
    end: ApiDateTime,
}

#[derive(Debug, Serialize)]
struct InsertCalendarRequest<'a> {
    summary: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreatedResource {
    id: String,
}
