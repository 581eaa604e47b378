//! Google Calendar gateway implementation.
//!
//! # Authorization Flow
//!
//! 1. The service issues a consent URL with a random `state` nonce
//! 2. The user grants calendar access in their browser
//! 3. Google redirects to the registered redirect URL with `code` and `state`
//! 4. The service exchanges the code for access and refresh tokens
//! 5. Later calls send the access token; on 401 the orchestrator refreshes
//!
//! # Example
//!
//! ```ignore
//! use schedsync_calendar::google::{GoogleConfig, GoogleGateway, OAuthCredentials};
//!
//! let config = GoogleConfig::new(
//!     OAuthCredentials::new("id.apps.googleusercontent.com", "secret"),
//!     "https://schedule.example.com/oauth/callback",
//! );
//! let gateway = GoogleGateway::new(config)?;
//! let url = gateway.login_url("nonce");
//! ```

mod client;
mod config;
mod gateway;
mod oauth;

pub use client::{CalendarListEntry, GoogleCalendarClient};
pub use config::{
    CALENDAR_API_BASE, CALENDAR_SCOPE, GOOGLE_AUTH_URL, GOOGLE_TOKEN_URL, GoogleConfig,
    OAuthCredentials,
};
pub use gateway::GoogleGateway;
pub use oauth::OAuthClient;
