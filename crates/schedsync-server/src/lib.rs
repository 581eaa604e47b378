//! Daemon: calendar sync orchestration, booking workflow, event publishing.
//!
//! This crate provides the schedsync service that handles:
//! - Google Calendar authorization and token refresh per user
//! - One provisioned calendar per training group
//! - Booking sessions into trainer and student calendars
//! - Announcing schedule and group changes through a bounded publisher
//! - Serving length-prefixed JSON requests on a Unix socket
//!
//! # Example
//!
//! ```rust,no_run
//! use schedsync_server::{App, ServiceConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServiceConfig::load()?;
//!     let app = App::from_config(&config)?;
//!     app.run_until_shutdown().await?;
//!     Ok(())
//! }
//! ```

mod app;
mod calendar_sync;
mod config;
mod credentials;
mod error;
mod groups;
mod handler;
pub mod publisher;
mod schedule;
mod secret;
mod signals;
mod socket;
pub mod store;
#[cfg(test)]
mod testing;

pub use app::App;
pub use calendar_sync::CalendarSync;
pub use config::{
    CONFIG_ENV, ConfigError, GoogleSettings, LoggingSettings, PublisherSettings, ServerSettings,
    ServiceConfig,
};
pub use credentials::{AuthState, CredentialVault, DEFAULT_STATE_TTL};
pub use error::{ErrorKind, ServiceError, ServiceResult};
pub use groups::{GroupService, LINK_LENGTH, generate_link};
pub use handler::RequestHandler;
pub use publisher::{EventPublisher, PublisherConfig, PublisherStatsSnapshot};
pub use schedule::ScheduleWorkflow;
pub use signals::{ShutdownHandle, ShutdownSignal};
pub use socket::{Connection, SocketConfig, SocketServer, default_socket_path};
