// stagehand-client
//! Controller-side client for stagehand.
//!
//! Dial a server over loopback TCP or a Unix socket, retry the dial with a
//! linear backoff, and exchange one framed request for one framed response
//! at a time.

mod config;
mod connection;
mod error;

pub use config::{
    ClientConfig, DEFAULT_MAX_RETRIES, DEFAULT_RESPONSE_TIMEOUT_SECS, DEFAULT_RETRY_DELAY_SECS,
};
pub use connection::Client;
pub use error::ClientError;

// Controllers configure addresses with the same selector strings servers do.
pub use stagehand_wire::ListenAddr;
