//! Loopback TCP transport.
//!
//! Binds only on 127.0.0.1; this is a trusted local channel, not a network
//! service. Before binding, the listener probes the port for an existing
//! listener and fails fast rather than silently shadowing it.

use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;
use tracing::debug;

use super::codec::FrameCodec;
use super::{FrameStream, TransportError};

const PROBE_TIMEOUT: Duration = Duration::from_millis(250);

/// A framed listener on a loopback TCP port.
#[derive(Debug)]
pub struct TcpFrameListener {
    listener: TcpListener,
}

impl TcpFrameListener {
    /// Bind to `127.0.0.1:<port>`.
    ///
    /// For a fixed port (non-zero), an existing listener is detected by a
    /// probe connection and reported as [`TransportError::PortInUse`].
    pub async fn bind(port: u16) -> Result<Self, TransportError> {
        if port != 0 && listener_present(port).await {
            return Err(TransportError::PortInUse { port });
        }
        let listener = TcpListener::bind(("127.0.0.1", port)).await?;
        debug!(port = listener.local_addr()?.port(), "tcp listener bound");
        Ok(Self { listener })
    }

    /// The actual bound port (resolves port 0 to the assigned one).
    pub fn local_port(&self) -> Result<u16, TransportError> {
        Ok(self.listener.local_addr()?.port())
    }

    /// Accept one incoming connection.
    pub async fn accept(&self) -> Result<FrameStream, TransportError> {
        let (stream, peer) = self.listener.accept().await?;
        debug!(%peer, "tcp connection accepted");
        Ok(FrameStream::Tcp(Framed::new(stream, FrameCodec::new())))
    }
}

/// Connect to a server on `127.0.0.1:<port>`.
pub(super) async fn connect(port: u16) -> Result<FrameStream, TransportError> {
    let stream = TcpStream::connect(("127.0.0.1", port)).await?;
    Ok(FrameStream::Tcp(Framed::new(stream, FrameCodec::new())))
}

/// True when something already accepts connections on the loopback port.
async fn listener_present(port: u16) -> bool {
    matches!(
        tokio::time::timeout(PROBE_TIMEOUT, TcpStream::connect(("127.0.0.1", port))).await,
        Ok(Ok(_))
    )
}
