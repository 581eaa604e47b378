//! Service configuration.
//!
//! All settings live in one TOML file, by default
//! `$XDG_CONFIG_HOME/schedsync/config.toml`; `SCHEDSYNC_CONFIG` overrides
//! the path.
//!
//! ```toml
//! state_ttl_secs = 600
//!
//! [google]
//! client_id = "env::GOOGLE_CLIENT_ID"
//! client_secret = "file::/run/secrets/google_client_secret"
//! redirect_url = "https://schedule.example.com/oauth/callback"
//!
//! [server]
//! socket_path = "/run/schedsync/schedsync.sock"
//! connection_timeout_secs = 30
//! max_connections = 100
//!
//! [publisher]
//! queue_capacity = 256
//! rest_proxy_url = "http://redpanda:8082"
//!
//! [logging]
//! level = "info"
//! format = "json"
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use schedsync_calendar::google::{GoogleConfig, OAuthCredentials};
use schedsync_core::{TracingConfig, TracingOutputFormat};
use serde::Deserialize;
use thiserror::Error;
use tracing::Level;

use crate::credentials::DEFAULT_STATE_TTL;
use crate::publisher::{DEFAULT_QUEUE_CAPACITY, PublisherConfig};
use crate::socket::SocketConfig;

/// Environment variable overriding the config path.
pub const CONFIG_ENV: &str = "SCHEDSYNC_CONFIG";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema.
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A required setting is absent.
    #[error("missing setting `{0}`")]
    Missing(&'static str),

    /// A setting has an unusable value.
    #[error("invalid setting `{field}`: {message}")]
    Invalid { field: &'static str, message: String },
}

impl ConfigError {
    fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            message: message.into(),
        }
    }
}

/// Top-level service configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Lifetime of a pending login state, in seconds.
    pub state_ttl_secs: u64,

    /// Google Calendar settings.
    pub google: Option<GoogleSettings>,

    /// Socket listener settings.
    pub server: ServerSettings,

    /// Event publisher settings.
    pub publisher: PublisherSettings,

    /// Logging settings.
    pub logging: LoggingSettings,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            state_ttl_secs: DEFAULT_STATE_TTL.as_secs(),
            google: None,
            server: ServerSettings::default(),
            publisher: PublisherSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl ServiceConfig {
    /// Loads the config from `SCHEDSYNC_CONFIG` or the default path.
    ///
    /// A missing default file yields the defaults; a missing file named by
    /// `SCHEDSYNC_CONFIG` is an error.
    pub fn load() -> Result<Self, ConfigError> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Self::load_from(Path::new(&path));
        }
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads the config from a file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parses TOML content.
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Returns the default config file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("schedsync")
            .join("config.toml")
    }

    /// Returns the login state TTL.
    pub fn state_ttl(&self) -> Duration {
        Duration::from_secs(self.state_ttl_secs)
    }
}

/// `[google]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GoogleSettings {
    /// OAuth client ID. Accepts `env::` and `file::` references.
    pub client_id: Option<String>,

    /// OAuth client secret. Accepts `env::` and `file::` references.
    pub client_secret: Option<String>,

    /// Registered redirect URL.
    pub redirect_url: Option<String>,

    /// Scopes to request. Empty means the calendar scope.
    pub scopes: Vec<String>,

    /// HTTP timeout in seconds.
    pub timeout_secs: Option<u64>,

    /// Authorization endpoint override.
    pub auth_url: Option<String>,

    /// Token endpoint override.
    pub token_url: Option<String>,

    /// Calendar API base override.
    pub api_base: Option<String>,
}

impl GoogleSettings {
    /// Resolves secrets and builds the gateway configuration.
    pub fn to_gateway_config(&self) -> Result<GoogleConfig, ConfigError> {
        let client_id = self
            .client_id
            .as_deref()
            .ok_or(ConfigError::Missing("google.client_id"))?;
        let client_secret = self
            .client_secret
            .as_deref()
            .ok_or(ConfigError::Missing("google.client_secret"))?;
        let redirect_url = self
            .redirect_url
            .as_deref()
            .ok_or(ConfigError::Missing("google.redirect_url"))?;

        let client_id = crate::secret::resolve(client_id)
            .map_err(|e| ConfigError::invalid("google.client_id", e))?;
        let client_secret = crate::secret::resolve(client_secret)
            .map_err(|e| ConfigError::invalid("google.client_secret", e))?;

        let mut config =
            GoogleConfig::new(OAuthCredentials::new(client_id, client_secret), redirect_url);
        if !self.scopes.is_empty() {
            config = config.with_scopes(self.scopes.clone());
        }
        if let Some(secs) = self.timeout_secs {
            config = config.with_timeout(Duration::from_secs(secs));
        }
        if let Some(url) = &self.auth_url {
            config = config.with_auth_url(url);
        }
        if let Some(url) = &self.token_url {
            config = config.with_token_url(url);
        }
        if let Some(url) = &self.api_base {
            config = config.with_api_base(url);
        }
        Ok(config)
    }
}

/// `[server]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Unix socket path. Defaults to `$XDG_RUNTIME_DIR/schedsync.sock`.
    pub socket_path: Option<PathBuf>,

    /// Per-read and per-write timeout on a connection, in seconds.
    pub connection_timeout_secs: u64,

    /// Connections served at once.
    pub max_connections: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        let defaults = SocketConfig::default();
        Self {
            socket_path: None,
            connection_timeout_secs: defaults.connection_timeout.as_secs(),
            max_connections: defaults.max_connections,
        }
    }
}

impl ServerSettings {
    /// Builds the listener configuration.
    pub fn to_socket_config(&self) -> Result<SocketConfig, ConfigError> {
        if self.max_connections == 0 {
            return Err(ConfigError::invalid(
                "server.max_connections",
                "must be at least 1",
            ));
        }
        if self.connection_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "server.connection_timeout_secs",
                "must be at least 1",
            ));
        }

        let config = match &self.socket_path {
            Some(path) => SocketConfig::new(path),
            None => SocketConfig::default(),
        };
        Ok(config
            .with_connection_timeout(Duration::from_secs(self.connection_timeout_secs))
            .with_max_connections(self.max_connections))
    }
}

/// `[publisher]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PublisherSettings {
    /// Capacity of the local queue.
    pub queue_capacity: usize,

    /// Kafka REST proxy base URL. Unset keeps events in memory.
    pub rest_proxy_url: Option<String>,

    /// Prefix prepended to every topic.
    pub topic_prefix: Option<String>,

    /// HTTP timeout for the REST proxy, in seconds.
    pub timeout_secs: u64,
}

impl Default for PublisherSettings {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            rest_proxy_url: None,
            topic_prefix: None,
            timeout_secs: 10,
        }
    }
}

impl PublisherSettings {
    /// Builds the publisher configuration.
    pub fn to_publisher_config(&self) -> Result<PublisherConfig, ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::invalid(
                "publisher.queue_capacity",
                "must be at least 1",
            ));
        }
        if let Some(url) = &self.rest_proxy_url {
            url::Url::parse(url)
                .map_err(|e| ConfigError::invalid("publisher.rest_proxy_url", e.to_string()))?;
        }

        let mut config = PublisherConfig::default().with_queue_capacity(self.queue_capacity);
        if let Some(prefix) = &self.topic_prefix {
            config = config.with_topic_prefix(prefix);
        }
        Ok(config)
    }

    /// Returns the REST proxy timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default level (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,

    /// Output format (`pretty`, `compact`, `json`).
    pub format: TracingOutputFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: TracingOutputFormat::default(),
        }
    }
}

impl LoggingSettings {
    /// Builds the tracing configuration.
    pub fn tracing_config(&self) -> Result<TracingConfig, ConfigError> {
        let level = Level::from_str(&self.level)
            .map_err(|_| ConfigError::invalid("logging.level", self.level.clone()))?;
        Ok(TracingConfig::daemon()
            .with_level(level)
            .with_format(self.format))
    }
}
