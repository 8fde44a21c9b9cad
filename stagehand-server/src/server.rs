//! Server loop.
//!
//! Owns the listening socket. Each accepted connection gets a dedicated
//! serving task running a read-route-write loop interleaved with
//! notification pushes; the top-level loop multiplexes accepts, detector
//! ticks, and the stop signal with `tokio::select!`.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use stagehand_wire::error;
use stagehand_wire::transport::uds;
use stagehand_wire::{
    ErrorPayload, FrameError, FrameListener, FrameStream, ListenAddr, Notification, RpcResponse,
    TransportError,
};

use crate::config::{NOTIFICATION_CHANNEL_CAPACITY, ServerConfig};
use crate::detector::ChangeDetector;
use crate::host::{CommandExecutor, ResourceProvider};
use crate::router::Router;
use crate::subscriptions::{ConnId, SubscriptionRegistry};

/// Errors from the server loop.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// StopHandle
// ---------------------------------------------------------------------------

/// Signals the serve loop and every serving task to shut down.
///
/// Cheap to clone. Stopping twice, or after the loop already exited, is
/// harmless. The legacy `stop` action, Ctrl-C, and tests all share one
/// handle.
#[derive(Clone)]
pub struct StopHandle {
    tx: watch::Sender<bool>,
}

impl StopHandle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Flip the stop flag.
    ///
    /// `send_replace` updates the value even when no receiver is subscribed
    /// yet, so a stop issued before the serve loop starts (or after it
    /// exits) is not lost.
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for StopHandle {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// The listening server.
pub struct Server {
    listener: FrameListener,
    router: Router,
    registry: SubscriptionRegistry,
    detector: ChangeDetector,
    poll_interval: Duration,
    stop: StopHandle,
}

impl Server {
    /// Bind the configured listener and assemble the serving state.
    ///
    /// Fails fast when the port already has a listener or the socket path
    /// is unusable, without entering the serve loop.
    pub async fn bind(
        config: &ServerConfig,
        executor: Arc<dyn CommandExecutor>,
        provider: Arc<dyn ResourceProvider>,
    ) -> Result<Self, ServerError> {
        let listener = FrameListener::bind(&config.listen).await?;
        let registry = SubscriptionRegistry::new();
        let stop = StopHandle::new();
        let router = Router::new(
            executor,
            Arc::clone(&provider),
            registry.clone(),
            stop.clone(),
            config.call_timeout(),
        );
        let mut detector = ChangeDetector::new(provider, config.poll_interval());
        // Prime the fingerprint baseline now, before any connection is
        // accepted. Priming lazily on the first poll tick would let an early
        // request's mutation be folded into the baseline and its
        // notification lost.
        detector.tick();
        info!(addr = %listener.local_addr(), "server bound");
        Ok(Self {
            listener,
            router,
            registry,
            detector,
            poll_interval: config.poll_interval(),
            stop,
        })
    }

    /// Handle for stopping the serve loop from another task (Ctrl-C, tests,
    /// or anything else out-of-band; the `stop` action uses it internally).
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// The address actually bound, with the real port when `port:0` was
    /// requested.
    pub fn local_addr(&self) -> ListenAddr {
        self.listener.local_addr()
    }

    /// Run until stopped.
    ///
    /// On the way out: close the listener, wait for serving tasks to drain,
    /// and remove the socket file for Unix listeners.
    pub async fn serve(mut self) -> Result<(), ServerError> {
        let mut stop_rx = self.stop.subscribe();
        let mut poll = tokio::time::interval(self.poll_interval);
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut serving: Vec<JoinHandle<()>> = Vec::new();

        info!(addr = %self.listener.local_addr(), "server listening");

        loop {
            if *stop_rx.borrow() {
                break;
            }
            tokio::select! {
                biased;

                _ = stop_rx.changed() => {}

                accepted = self.listener.accept() => match accepted {
                    Ok(stream) => {
                        let conn = ConnId::new();
                        let (note_tx, note_rx) = mpsc::channel(NOTIFICATION_CHANNEL_CAPACITY);
                        self.registry.register(conn, note_tx);
                        info!(%conn, "connection accepted");

                        let router = self.router.clone();
                        let registry = self.registry.clone();
                        let stop = self.stop.clone();
                        serving.push(tokio::spawn(async move {
                            serve_connection(conn, stream, note_rx, router, stop).await;
                            registry.drop_connection(conn);
                            info!(%conn, "connection closed");
                        }));
                        serving.retain(|task| !task.is_finished());
                    }
                    Err(err) => warn!(error = %err, "accept failed"),
                },

                _ = poll.tick() => {
                    for uri in self.detector.tick() {
                        let note = Notification::resource_update(uri.to_string());
                        let delivered = self.registry.fan_out(&uri, &note);
                        debug!(%uri, delivered, "resource update");
                    }
                }
            }
        }

        info!("server stopping");
        let socket_path = self.listener.socket_path().map(Path::to_path_buf);
        drop(self.listener);
        for task in serving {
            let _ = task.await;
        }
        if let Some(path) = socket_path {
            uds::remove_socket_file(&path).await?;
        }
        info!("server stopped");
        Ok(())
    }
}

/// Per-connection loop: read one framed request, route it, write the framed
/// response, interleaved with notification pushes, until the peer
/// disconnects, the transport faults, or stop is signalled.
async fn serve_connection(
    conn: ConnId,
    mut stream: FrameStream,
    mut notifications: mpsc::Receiver<Notification>,
    router: Router,
    stop: StopHandle,
) {
    let mut stop_rx = stop.subscribe();
    loop {
        if *stop_rx.borrow() {
            break;
        }
        tokio::select! {
            biased;

            _ = stop_rx.changed() => {}

            Some(note) = notifications.recv() => {
                if let Err(err) = stream.send(&note.to_value()).await {
                    debug!(%conn, error = %err, "notification write failed");
                    break;
                }
            }

            read = stream.recv() => match read {
                Ok(Some(request)) => {
                    let response = router.dispatch(conn, request).await;
                    if let Err(err) = stream.send(&response).await {
                        debug!(%conn, error = %err, "response write failed");
                        break;
                    }
                }
                Ok(None) => break,
                Err(TransportError::Frame(FrameError::Json(err))) => {
                    // The bad frame was consumed whole, so the stream is
                    // still aligned; report and keep serving.
                    let response = RpcResponse::error(
                        None,
                        ErrorPayload::new(error::PARSE_ERROR, format!("parse error: {err}")),
                    );
                    if stream.send(&response.into_value()).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    debug!(%conn, error = %err, "read failed");
                    break;
                }
            },
        }
    }
}
