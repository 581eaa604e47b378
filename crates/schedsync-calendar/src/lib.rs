//! CalendarGateway trait and implementations.
//!
//! This crate is the boundary to external calendar providers:
//!
//! - [`CalendarGateway`] - The object-safe trait the orchestrator drives
//! - [`OAuthToken`] - Access/refresh token pair passed into every call
//! - [`GatewayError`] - Provider failures classified for retry decisions
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │   CalendarSync       │  (schedsync-server)
//! └──────────┬───────────┘
//!            │ CalendarGateway
//!            ▼
//! ┌──────────────────────┐     ┌──────────────────────┐
//! │   GoogleGateway      │────▶│ OAuth token endpoint │
//! └──────────┬───────────┘     └──────────────────────┘
//!            │
//!            ▼
//! ┌──────────────────────┐
//! │ Calendar API v3      │
//! └──────────────────────┘
//! ```

pub mod error;
pub mod gateway;
#[cfg(feature = "google")]
pub mod google;
pub mod token;

pub use error::{GatewayError, GatewayErrorCode, GatewayResult};
pub use gateway::{BoxFuture, CalendarGateway, RemoteEvent};
pub use token::OAuthToken;
