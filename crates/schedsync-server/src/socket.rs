//! Unix socket front end.
//!
//! Each connection carries any number of length-prefixed
//! [`Envelope<Request>`] frames, answered in order with
//! [`Envelope<Response>`] frames echoing the request id. The caller
//! identity travels in the envelope and is parsed before dispatch.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use schedsync_core::UserId;
use schedsync_protocol::{
    Envelope, ErrorCode, HEADER_LEN, PROTOCOL_VERSION, ProtocolError, Request, Response,
    decode_payload, encode_message, frame_length,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};

use crate::error::{ServiceError, ServiceResult};
use crate::handler::RequestHandler;
use crate::signals::ShutdownSignal;

/// Listener settings.
#[derive(Debug, Clone)]
pub struct SocketConfig {
    pub socket_path: PathBuf,
    /// Applies to each read and write on a connection, so idle clients
    /// are disconnected after this long.
    pub connection_timeout: Duration,
    pub max_connections: usize,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            connection_timeout: Duration::from_secs(30),
            max_connections: 100,
        }
    }
}

impl SocketConfig {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            ..Default::default()
        }
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max.max(1);
        self
    }
}

/// `$XDG_RUNTIME_DIR/schedsync.sock`, or the temp dir when there is no
/// runtime dir.
pub fn default_socket_path() -> PathBuf {
    dirs::runtime_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("schedsync.sock")
}

/// Bound listener. Dropping it removes the socket file.
pub struct SocketServer {
    config: SocketConfig,
    listener: UnixListener,
    connections: Arc<Semaphore>,
}

impl SocketServer {
    /// Binds the socket, replacing a stale socket file left by a crashed
    /// daemon but refusing one that still accepts connections.
    pub async fn bind(config: SocketConfig) -> ServiceResult<Self> {
        let path = &config.socket_path;
        if path.exists() {
            if UnixStream::connect(path).await.is_ok() {
                return Err(ServiceError::SocketInUse(path.display().to_string()));
            }
            info!(path = %path.display(), "removing stale socket");
            std::fs::remove_file(path)?;
        }

        let listener = UnixListener::bind(path)?;
        info!(path = %path.display(), "socket listening");
        let connections = Arc::new(Semaphore::new(config.max_connections));
        Ok(Self {
            config,
            listener,
            connections,
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.config.socket_path
    }

    /// Waits for a free connection slot, then for a client.
    pub async fn accept(&self) -> ServiceResult<Connection> {
        let permit = self
            .connections
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| std::io::Error::other("connection limit closed"))?;
        let (stream, _addr) = self.listener.accept().await?;
        debug!("accepted connection");
        Ok(Connection {
            stream,
            timeout: self.config.connection_timeout,
            _permit: permit,
        })
    }

    /// Accepts connections and answers their requests until `shutdown`
    /// completes. Connections already open finish on their own.
    pub async fn serve(&self, handler: RequestHandler, shutdown: ShutdownSignal) {
        let stopped = shutdown.wait();
        tokio::pin!(stopped);

        loop {
            tokio::select! {
                _ = &mut stopped => break,
                accepted = self.accept() => match accepted {
                    Ok(connection) => {
                        tokio::spawn(serve_connection(connection, handler.clone()));
                    }
                    Err(e) => error!(error = %e, "failed to accept connection"),
                },
            }
        }
        debug!("socket server stopped accepting");
    }
}

impl Drop for SocketServer {
    fn drop(&mut self) {
        let path = &self.config.socket_path;
        if let Err(e) = std::fs::remove_file(path) {
            warn!(path = %path.display(), error = %e, "failed to remove socket file");
        }
    }
}

/// One client connection.
pub struct Connection {
    stream: UnixStream,
    timeout: Duration,
    _permit: OwnedSemaphorePermit,
}

impl Connection {
    /// Reads the next request. `Ok(None)` means the client hung up between
    /// frames.
    pub async fn read_request(&mut self) -> Result<Option<Envelope<Request>>, ProtocolError> {
        let mut header = [0u8; HEADER_LEN];
        match tokio::time::timeout(self.timeout, self.stream.read_exact(&mut header)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                return Err(ProtocolError::Timeout {
                    operation: "read request length",
                });
            }
        }

        let mut payload = vec![0u8; frame_length(header)?];
        match tokio::time::timeout(self.timeout, self.stream.read_exact(&mut payload)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                return Err(ProtocolError::Timeout {
                    operation: "read request payload",
                });
            }
        }

        decode_payload(&payload).map(Some)
    }

    /// Writes one response frame.
    pub async fn respond(
        &mut self,
        request_id: impl Into<String>,
        response: Response,
    ) -> Result<(), ProtocolError> {
        let frame = encode_message(&Envelope::response(request_id, response))?;
        match tokio::time::timeout(self.timeout, self.stream.write_all(&frame)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(ProtocolError::Timeout {
                operation: "write response",
            }),
        }
    }
}

async fn serve_connection(mut connection: Connection, handler: RequestHandler) {
    loop {
        let (request_id, response) = match connection.read_request().await {
            Ok(Some(envelope)) => {
                let request_id = envelope.request_id.clone();
                (request_id, dispatch(&handler, envelope).await)
            }
            Ok(None) => break,
            // The frame was read whole, so the stream is still in step.
            Err(ProtocolError::Serialization(e)) => {
                debug!(error = %e, "malformed request");
                (
                    String::new(),
                    Response::error(ErrorCode::InvalidArgument, "malformed request"),
                )
            }
            Err(e) => {
                debug!(error = %e, "closing connection");
                break;
            }
        };

        if let Err(e) = connection.respond(request_id, response).await {
            warn!(error = %e, "failed to write response");
            break;
        }
    }
}

async fn dispatch(handler: &RequestHandler, envelope: Envelope<Request>) -> Response {
    if !envelope.is_compatible() {
        warn!(
            version = %envelope.protocol_version,
            expected = PROTOCOL_VERSION,
            "incompatible protocol version"
        );
        return Response::error(
            ErrorCode::InvalidArgument,
            format!("unsupported protocol version {}", envelope.protocol_version),
        );
    }

    let caller = match envelope.caller_id.as_deref().map(UserId::parse).transpose() {
        Ok(caller) => caller,
        Err(_) => return Response::error(ErrorCode::InvalidArgument, "invalid caller id"),
    };
    handler.handle(caller, envelope.payload).await
}
