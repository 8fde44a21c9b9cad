//! Connection management and request helpers.

use std::time::Duration;

use serde_json::{Value, json};
use stagehand_wire::{FrameStream, RequestId, RpcRequest};
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::ClientError;

/// Controller-side connection to a stagehand server.
///
/// Holds at most one outstanding request: [`request`](Self::request) writes
/// one frame and reads exactly one frame back, so responses are never
/// interleaved. Notifications are not consumed here; a controller that
/// subscribes should drain them on a dedicated connection.
pub struct Client {
    config: ClientConfig,
    stream: Option<FrameStream>,
    next_id: i64,
}

impl Client {
    /// A disconnected client; call [`connect`](Self::connect) before use.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            stream: None,
            next_id: 0,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Establish the connection, waiting a linearly growing delay between
    /// attempts. The returned error reports how many attempts were made.
    pub async fn connect(&mut self) -> Result<(), ClientError> {
        let attempts = self.config.attempts();
        let mut attempt = 0;
        loop {
            attempt += 1;
            match FrameStream::connect(&self.config.addr).await {
                Ok(stream) => {
                    debug!(addr = %self.config.addr, attempt, "connected");
                    self.stream = Some(stream);
                    return Ok(());
                }
                Err(err) if attempt < attempts => {
                    debug!(addr = %self.config.addr, attempt, error = %err, "connect attempt failed");
                    tokio::time::sleep(self.config.retry_delay() * attempt).await;
                }
                Err(err) => {
                    return Err(ClientError::ConnectFailed {
                        addr: self.config.addr.to_string(),
                        attempts,
                        source: err,
                    });
                }
            }
        }
    }

    /// Drop the connection. Harmless when already disconnected.
    pub fn disconnect(&mut self) {
        self.stream = None;
    }

    /// Tear the connection down and redial with the same retry schedule as
    /// [`connect`](Self::connect).
    pub async fn reconnect(&mut self) -> Result<(), ClientError> {
        self.disconnect();
        self.connect().await
    }

    /// Send one request and read exactly one response, bounded by the
    /// configured response timeout.
    ///
    /// Any failure drops the connection: a half-written or half-read frame
    /// leaves the stream unusable.
    pub async fn request(&mut self, message: &Value) -> Result<Value, ClientError> {
        let wait = self.config.response_timeout();
        let stream = self.stream.as_mut().ok_or(ClientError::NotConnected)?;
        let result = exchange(stream, message, wait).await;
        if result.is_err() {
            self.stream = None;
        }
        result
    }

    /// Like [`request`](Self::request), but redials and retries when the
    /// failure is connection-related. An application-level error payload is
    /// an ordinary response and comes back as `Ok` on the first attempt.
    pub async fn request_with_retry(&mut self, message: &Value) -> Result<Value, ClientError> {
        let attempts = self.config.attempts();
        let mut attempt = 0;
        loop {
            attempt += 1;
            if self.stream.is_none()
                && let Err(err) = self.connect().await
            {
                if attempt < attempts {
                    warn!(attempt, error = %err, "reconnect failed");
                    continue;
                }
                return Err(err);
            }
            match self.request(message).await {
                Ok(response) => return Ok(response),
                Err(err) if err.is_connection_related() && attempt < attempts => {
                    warn!(attempt, error = %err, "request failed, reconnecting");
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Send a JSON-RPC request for `method`, allocating the next id and
    /// checking that the response echoes it.
    pub async fn call_method(
        &mut self,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, ClientError> {
        self.next_id += 1;
        let id = self.next_id;
        let request = RpcRequest::new(RequestId::Num(id), method, params).into_value();
        let response = self.request_with_retry(&request).await?;
        let echoed = response.get("id").cloned().unwrap_or(Value::Null);
        if echoed != json!(id) {
            // A stale response leaves the stream off by one; drop it so the
            // next call starts clean.
            self.stream = None;
            return Err(ClientError::IdMismatch {
                expected: id,
                got: echoed,
            });
        }
        Ok(response)
    }

    /// Send a legacy-dialect request: `fields` merged around an `action`
    /// key. Non-object `fields` are treated as empty, and the `action`
    /// argument wins over any `action` field.
    pub async fn call_action(&mut self, action: &str, fields: Value) -> Result<Value, ClientError> {
        let mut merged = match fields {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        merged.insert("action".to_string(), json!(action));
        self.request_with_retry(&Value::Object(merged)).await
    }
}

async fn exchange(
    stream: &mut FrameStream,
    message: &Value,
    wait: Duration,
) -> Result<Value, ClientError> {
    stream.send(message).await?;
    match stream.recv_timeout(wait).await? {
        Some(response) => Ok(response),
        None => Err(ClientError::Disconnected),
    }
}
