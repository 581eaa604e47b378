//! Shutdown coordination.
//!
//! A single [`ShutdownHandle`] is shared by the app and the event
//! publisher. It is triggered either programmatically or by SIGTERM/SIGINT
//! once [`ShutdownHandle::listen_for_signals`] has been called.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// A handle for triggering or observing shutdown.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    /// Creates a handle in the running state.
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Triggers shutdown. Triggering twice is harmless.
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }

    /// Returns true if shutdown has been triggered.
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Returns a future-like signal that completes on shutdown.
    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.rx.clone(),
        }
    }

    /// Spawns a task triggering shutdown on SIGTERM or SIGINT.
    #[cfg(unix)]
    pub fn listen_for_signals(&self) -> JoinHandle<()> {
        let handle = self.clone();

        tokio::spawn(async move {
            use tokio::signal::unix::{SignalKind, signal};

            let (mut sigterm, mut sigint) =
                match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                    (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
                    (Err(e), _) | (_, Err(e)) => {
                        error!(error = %e, "failed to install signal handlers, falling back to ctrl-c");
                        if tokio::signal::ctrl_c().await.is_ok() {
                            handle.trigger();
                        }
                        return;
                    }
                };

            tokio::select! {
                _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
                _ = sigint.recv() => info!("received SIGINT, shutting down"),
                _ = handle.signal().wait() => {
                    debug!("shutdown triggered elsewhere, signal listener exiting");
                    return;
                }
            }
            handle.trigger();
        })
    }

    /// Spawns a task triggering shutdown on Ctrl+C.
    #[cfg(not(unix))]
    pub fn listen_for_signals(&self) -> JoinHandle<()> {
        let handle = self.clone();

        tokio::spawn(async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if result.is_ok() {
                        info!("received Ctrl+C, shutting down");
                        handle.trigger();
                    }
                }
                _ = handle.signal().wait() => {}
            }
        })
    }
}

/// Completes when shutdown is triggered.
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Waits for shutdown. Returns immediately if already triggered.
    pub async fn wait(mut self) {
        // A dropped sender can never trigger, so treat it as shutdown.
        let _ = self.rx.wait_for(|stopped| *stopped).await;
    }
}
