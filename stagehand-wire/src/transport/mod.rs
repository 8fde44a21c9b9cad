//! Transport layer for stagehand.
//!
//! Provides `len:json` framing (see [`codec`]) over two interchangeable
//! substrates chosen at start-up: a loopback TCP socket on a configured port,
//! or a Unix domain socket at a configured filesystem path.

pub mod codec;
pub mod tcp;
pub mod uds;

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, UnixStream};
use tokio_util::codec::Framed;

pub use codec::FrameCodec;

/// Well-known loopback port both sides fall back to when none is configured.
pub const DEFAULT_PORT: u16 = 4777;

/// Framing-level errors: header scanning, truncation, body JSON parsing.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid frame header: {0}")]
    InvalidHeader(String),
    #[error("peer closed mid-frame ({buffered} bytes buffered)")]
    Truncated { buffered: usize },
    #[error("invalid JSON body: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur during transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("framing error: {0}")]
    Frame(#[from] FrameError),
    #[error("timeout waiting for peer")]
    Timeout,
    #[error("port {port} already has a listener on 127.0.0.1")]
    PortInUse { port: u16 },
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

/// Where a server listens and a client connects.
///
/// Chosen by start-up configuration, never negotiated on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenAddr {
    /// Loopback TCP on the given port (`port:<N>` form).
    Port(u16),
    /// Unix domain socket at the given path (any other string).
    Socket(PathBuf),
}

impl ListenAddr {
    /// Parse an address selector string.
    ///
    /// `port:<N>` selects loopback TCP; anything else is taken as a Unix
    /// socket path.
    pub fn parse(s: &str) -> Result<Self, TransportError> {
        if let Some(port) = s.strip_prefix("port:") {
            let port: u16 = port.parse().map_err(|_| {
                TransportError::InvalidAddress(format!("invalid port number: {port:?}"))
            })?;
            Ok(ListenAddr::Port(port))
        } else if s.is_empty() {
            Err(TransportError::InvalidAddress(
                "empty address selector".to_string(),
            ))
        } else {
            Ok(ListenAddr::Socket(PathBuf::from(s)))
        }
    }
}

impl FromStr for ListenAddr {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ListenAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenAddr::Port(port) => write!(f, "port:{port}"),
            ListenAddr::Socket(path) => write!(f, "{}", path.display()),
        }
    }
}

// Serialized as the selector string so config files read the same way the
// CLI flag does.
impl serde::Serialize for ListenAddr {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for ListenAddr {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::{Deserialize, de::Error as _};
        let s = String::deserialize(deserializer)?;
        ListenAddr::parse(&s).map_err(D::Error::custom)
    }
}

/// A listening socket on either substrate.
pub enum FrameListener {
    Tcp(tcp::TcpFrameListener),
    Uds(uds::UdsFrameListener),
}

impl FrameListener {
    /// Bind to the configured address, failing fast if it is unavailable.
    pub async fn bind(addr: &ListenAddr) -> Result<Self, TransportError> {
        match addr {
            ListenAddr::Port(port) => Ok(FrameListener::Tcp(
                tcp::TcpFrameListener::bind(*port).await?,
            )),
            ListenAddr::Socket(path) => {
                Ok(FrameListener::Uds(uds::UdsFrameListener::bind(path).await?))
            }
        }
    }

    /// Accept one incoming connection.
    pub async fn accept(&self) -> Result<FrameStream, TransportError> {
        match self {
            FrameListener::Tcp(listener) => listener.accept().await,
            FrameListener::Uds(listener) => listener.accept().await,
        }
    }

    /// The actual bound port for TCP listeners (useful when bound to port 0).
    pub fn local_port(&self) -> Option<u16> {
        match self {
            FrameListener::Tcp(listener) => listener.local_port().ok(),
            FrameListener::Uds(_) => None,
        }
    }

    /// The socket file path for UDS listeners.
    pub fn socket_path(&self) -> Option<&Path> {
        match self {
            FrameListener::Tcp(_) => None,
            FrameListener::Uds(listener) => Some(listener.path()),
        }
    }

    /// The address this listener is actually serving.
    pub fn local_addr(&self) -> ListenAddr {
        match self {
            FrameListener::Tcp(listener) => {
                ListenAddr::Port(listener.local_port().unwrap_or_default())
            }
            FrameListener::Uds(listener) => ListenAddr::Socket(listener.path().to_path_buf()),
        }
    }
}

/// A framed connection on either substrate.
pub enum FrameStream {
    Tcp(Framed<TcpStream, FrameCodec>),
    Uds(Framed<UnixStream, FrameCodec>),
}

impl FrameStream {
    /// Connect to a server at the given address.
    pub async fn connect(addr: &ListenAddr) -> Result<Self, TransportError> {
        match addr {
            ListenAddr::Port(port) => tcp::connect(*port).await,
            ListenAddr::Socket(path) => uds::connect(path).await,
        }
    }

    /// Write one value as a single frame.
    pub async fn send(&mut self, value: &Value) -> Result<(), TransportError> {
        match self {
            FrameStream::Tcp(framed) => send_frame(framed, value).await,
            FrameStream::Uds(framed) => send_frame(framed, value).await,
        }
    }

    /// Read one frame. `Ok(None)` means the peer closed cleanly between
    /// frames; a close mid-frame surfaces as a framing error.
    ///
    /// A frame whose body is not valid JSON reports [`FrameError::Json`]
    /// but leaves the stream aligned and usable; the next `recv` reads the
    /// next frame.
    pub async fn recv(&mut self) -> Result<Option<Value>, TransportError> {
        match self {
            FrameStream::Tcp(framed) => recv_frame(framed).await,
            FrameStream::Uds(framed) => recv_frame(framed).await,
        }
    }

    /// Read one frame with a bounded wait.
    pub async fn recv_timeout(&mut self, wait: Duration) -> Result<Option<Value>, TransportError> {
        match tokio::time::timeout(wait, self.recv()).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        }
    }
}

async fn send_frame<S>(
    framed: &mut Framed<S, FrameCodec>,
    value: &Value,
) -> Result<(), TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    framed.send(value).await?;
    Ok(())
}

async fn recv_frame<S>(framed: &mut Framed<S, FrameCodec>) -> Result<Option<Value>, TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match framed.next().await {
        Some(Ok(Ok(value))) => Ok(Some(value)),
        Some(Ok(Err(err))) => Err(FrameError::Json(err).into()),
        Some(Err(err)) => Err(err.into()),
        None => Ok(None),
    }
}
