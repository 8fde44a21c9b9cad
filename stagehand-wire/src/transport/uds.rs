//! Unix domain socket transport.

use std::path::{Path, PathBuf};

use tokio::net::{UnixListener, UnixStream};
use tokio_util::codec::Framed;
use tracing::debug;

use super::codec::FrameCodec;
use super::{FrameStream, TransportError};

/// A framed listener on a Unix domain socket.
#[derive(Debug)]
pub struct UdsFrameListener {
    listener: UnixListener,
    path: PathBuf,
}

impl UdsFrameListener {
    /// Bind to a Unix domain socket path, removing a stale socket file first.
    pub async fn bind(path: &Path) -> Result<Self, TransportError> {
        remove_socket_file(path).await?;
        let listener = UnixListener::bind(path)?;
        debug!(path = %path.display(), "uds listener bound");
        Ok(Self {
            listener,
            path: path.to_path_buf(),
        })
    }

    /// The socket file path this listener is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accept one incoming connection.
    pub async fn accept(&self) -> Result<FrameStream, TransportError> {
        let (stream, _) = self.listener.accept().await?;
        debug!(path = %self.path.display(), "uds connection accepted");
        Ok(FrameStream::Uds(Framed::new(stream, FrameCodec::new())))
    }
}

/// Connect to a server at a Unix domain socket path.
pub(super) async fn connect(path: &Path) -> Result<FrameStream, TransportError> {
    let stream = UnixStream::connect(path).await?;
    Ok(FrameStream::Uds(Framed::new(stream, FrameCodec::new())))
}

/// Remove a socket file, tolerating its absence.
///
/// Used both before binding (stale file from an unclean shutdown) and after
/// the server stops.
pub async fn remove_socket_file(path: &Path) -> Result<(), TransportError> {
    if let Err(err) = tokio::fs::remove_file(path).await
        && err.kind() != std::io::ErrorKind::NotFound
    {
        return Err(err.into());
    }
    Ok(())
}
