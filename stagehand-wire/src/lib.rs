// stagehand-wire
//! Wire protocol for stagehand: length-prefixed JSON frames (`len:body`)
//! over loopback TCP or Unix domain sockets, the two request dialects'
//! envelope types, and resource addressing.

pub mod error;
pub mod protocol;
pub mod transport;
pub mod uri;

pub use protocol::{ErrorPayload, Notification, RequestId, RpcRequest, RpcResponse};
pub use transport::codec::FrameCodec;
pub use transport::{
    DEFAULT_PORT, FrameError, FrameListener, FrameStream, ListenAddr, TransportError,
};
pub use uri::{ResourceCategory, ResourceUri, UriError};
