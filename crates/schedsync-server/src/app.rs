//! Service wiring.

use std::sync::Arc;
use std::time::Duration;

use schedsync_calendar::CalendarGateway;
use schedsync_calendar::google::GoogleGateway;
use tracing::info;

use crate::calendar_sync::CalendarSync;
use crate::config::ServiceConfig;
use crate::credentials::CredentialVault;
use crate::error::{ServiceError, ServiceResult};
use crate::groups::GroupService;
use crate::handler::RequestHandler;
use crate::publisher::{
    BrokerProducer, EventPublisher, MemoryProducer, PublisherConfig, RestProxyProducer,
};
use crate::schedule::ScheduleWorkflow;
use crate::signals::ShutdownHandle;
use crate::socket::{SocketConfig, SocketServer};
use crate::store::memory::{
    MemoryBindingStore, MemoryCredentialStore, MemoryGroupStore, MemoryScheduleStore,
};

/// A fully wired service.
pub struct App {
    handler: RequestHandler,
    publisher: Arc<EventPublisher>,
    shutdown: ShutdownHandle,
    socket: SocketConfig,
}

impl App {
    /// Builds the Google gateway, stores, publisher and services.
    pub fn from_config(config: &ServiceConfig) -> ServiceResult<Self> {
        let google = config
            .google
            .as_ref()
            .ok_or_else(|| ServiceError::config("missing [google] section"))?
            .to_gateway_config()
            .map_err(|e| ServiceError::config(e.to_string()))?;
        let gateway = Arc::new(GoogleGateway::new(google)?);

        let producer: Arc<dyn BrokerProducer> = match &config.publisher.rest_proxy_url {
            Some(url) => Arc::new(
                RestProxyProducer::new(url, config.publisher.timeout())
                    .map_err(|e| ServiceError::config(e.to_string()))?,
            ),
            None => {
                info!("no rest_proxy_url configured, keeping events in memory");
                Arc::new(MemoryProducer::new())
            }
        };
        let publisher_config = config
            .publisher
            .to_publisher_config()
            .map_err(|e| ServiceError::config(e.to_string()))?;
        let socket = config
            .server
            .to_socket_config()
            .map_err(|e| ServiceError::config(e.to_string()))?;

        Ok(
            Self::with_parts(gateway, producer, publisher_config, config.state_ttl())
                .with_socket(socket),
        )
    }

    /// Wires the services over in-memory stores and the given collaborators.
    pub fn with_parts(
        gateway: Arc<dyn CalendarGateway>,
        producer: Arc<dyn BrokerProducer>,
        publisher_config: PublisherConfig,
        state_ttl: Duration,
    ) -> Self {
        let shutdown = ShutdownHandle::new();
        let vault =
            CredentialVault::new(Arc::new(MemoryCredentialStore::new())).with_state_ttl(state_ttl);
        let bindings = Arc::new(MemoryBindingStore::new());
        let groups = Arc::new(MemoryGroupStore::new());
        let schedules = Arc::new(MemoryScheduleStore::new());

        let calendar = Arc::new(CalendarSync::new(
            gateway,
            vault,
            bindings,
            groups.clone(),
        ));
        let publisher = Arc::new(EventPublisher::new(
            producer,
            publisher_config,
            shutdown.clone(),
        ));
        let workflow = Arc::new(ScheduleWorkflow::new(
            calendar.clone(),
            schedules,
            groups.clone(),
            publisher.clone(),
        ));
        let group_service = Arc::new(GroupService::new(
            groups,
            calendar.clone(),
            publisher.clone(),
        ));
        let handler = RequestHandler::new(workflow, group_service, calendar);

        Self {
            handler,
            publisher,
            shutdown,
            socket: SocketConfig::default(),
        }
    }

    /// Builder: set where requests are served.
    pub fn with_socket(mut self, socket: SocketConfig) -> Self {
        self.socket = socket;
        self
    }

    /// Returns the request handler.
    pub fn handler(&self) -> &RequestHandler {
        &self.handler
    }

    /// Returns the shared shutdown handle.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Returns the publisher, mostly for its counters.
    pub fn publisher(&self) -> &EventPublisher {
        &self.publisher
    }

    /// Binds the socket, starts the publisher and serves requests until
    /// SIGTERM/SIGINT or a programmatic trigger, then stops the publisher.
    pub async fn run_until_shutdown(&self) -> ServiceResult<()> {
        let server = SocketServer::bind(self.socket.clone()).await?;
        self.publisher.start().await;
        let listener = self.shutdown.listen_for_signals();
        info!(socket = %server.socket_path().display(), "schedsync running");

        server
            .serve(self.handler.clone(), self.shutdown.signal())
            .await;
        info!("shutting down");

        drop(server);
        self.publisher.shutdown().await;
        listener.abort();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use schedsync_core::UserId;
    use schedsync_protocol::{Envelope, Request, Response, encode_message};
    use tempfile::tempdir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::UnixStream;

    use crate::config::GoogleSettings;
    use crate::testing::FakeGateway;

    #[test]
    fn from_config_requires_google() {
        let err = App::from_config(&ServiceConfig::default()).err().unwrap();
        assert!(matches!(err, ServiceError::Config(_)));
    }

    #[tokio::test]
    async fn from_config_builds_memory_publisher() {
        let config = ServiceConfig {
            google: Some(GoogleSettings {
                client_id: Some("id".to_string()),
                client_secret: Some("secret".to_string()),
                redirect_url: Some("https://schedule.example.com/cb".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let app = App::from_config(&config).unwrap();
        let response = app
            .handler()
            .handle(Some(UserId::generate()), Request::IsAuthorized)
            .await;
        assert_eq!(response, Response::Authorized { authorized: false });
    }

    #[tokio::test]
    async fn serves_socket_until_trigger() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("schedsync.sock");
        let app = App::with_parts(
            Arc::new(FakeGateway::new()),
            Arc::new(MemoryProducer::new()),
            PublisherConfig::default(),
            Duration::from_secs(600),
        )
        .with_socket(SocketConfig::new(&path));
        let shutdown = app.shutdown_handle();

        let run = app.run_until_shutdown();
        tokio::pin!(run);
        let mut stream = loop {
            tokio::select! {
                result = &mut run => panic!("stopped before trigger: {result:?}"),
                _ = tokio::time::sleep(Duration::from_millis(10)) => {}
            }
            if let Ok(stream) = UnixStream::connect(&path).await {
                break stream;
            }
        };

        let caller = UserId::generate().to_string();
        let request = Envelope::request("r-1", Some(caller), Request::IsAuthorized);
        stream
            .write_all(&encode_message(&request).unwrap())
            .await
            .unwrap();
        let exchange = async {
            let mut header = [0u8; 4];
            stream.read_exact(&mut header).await.unwrap();
            let mut payload = vec![0u8; u32::from_be_bytes(header) as usize];
            stream.read_exact(&mut payload).await.unwrap();
            serde_json::from_slice::<Envelope<Response>>(&payload).unwrap()
        };
        let reply = tokio::select! {
            result = &mut run => panic!("stopped while serving: {result:?}"),
            reply = exchange => reply,
        };
        assert_eq!(reply.request_id, "r-1");
        assert_eq!(reply.payload, Response::Authorized { authorized: false });

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(2), run)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(app.publisher().stats().dropped, 0);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn run_fails_when_socket_is_taken() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("schedsync.sock");
        let _taken = tokio::net::UnixListener::bind(&path).unwrap();

        let app = App::with_parts(
            Arc::new(FakeGateway::new()),
            Arc::new(MemoryProducer::new()),
            PublisherConfig::default(),
            Duration::from_secs(600),
        )
        .with_socket(SocketConfig::new(&path));

        let err = app.run_until_shutdown().await.unwrap_err();
        assert!(matches!(err, ServiceError::SocketInUse(_)));
    }
}
