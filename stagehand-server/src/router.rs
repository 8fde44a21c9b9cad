//! Request routing for both dialects.
//!
//! Classification keys on shape: a `method` field means JSON-RPC, an
//! `action` field means the legacy dialect. Either way the request reduces
//! to one [`Operation`] dispatched through a single handler, and the
//! response envelope mirrors the request's dialect, so new operations never
//! need per-dialect duplication.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{Value, json};
use tracing::{debug, warn};

use stagehand_wire::error;
use stagehand_wire::protocol::legacy_error;
use stagehand_wire::{
    ErrorPayload, RequestId, ResourceCategory, ResourceUri, RpcRequest, RpcResponse,
};

use crate::host::{CommandExecutor, ResourceProvider};
use crate::server::StopHandle;
use crate::subscriptions::{ConnId, SubscriptionRegistry};

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dialect {
    Rpc,
    Legacy,
}

/// A request reduced to its dialect-independent parts.
struct Classified {
    dialect: Dialect,
    id: Option<RequestId>,
    name: String,
    params: Value,
}

/// Classify a decoded message, or build the error response for one that
/// fits neither dialect. Requests with no recognizable dialect are answered
/// in the JSON-RPC shape with a null id.
fn classify(request: Value) -> Result<Classified, Value> {
    let Value::Object(mut fields) = request else {
        return Err(render_err(
            Dialect::Rpc,
            None,
            ErrorPayload::new(error::INVALID_REQUEST, "request must be a JSON object"),
        ));
    };

    if fields.contains_key("method") {
        let id = fields
            .get("id")
            .and_then(|v| serde_json::from_value(v.clone()).ok());
        let request: RpcRequest = match serde_json::from_value(Value::Object(fields)) {
            Ok(request) => request,
            Err(err) => {
                return Err(render_err(
                    Dialect::Rpc,
                    id,
                    ErrorPayload::new(error::INVALID_REQUEST, format!("invalid request: {err}")),
                ));
            }
        };
        return Ok(Classified {
            dialect: Dialect::Rpc,
            id: request.id,
            name: request.method,
            params: request.params.unwrap_or_else(|| json!({})),
        });
    }

    if let Some(action) = fields.remove("action") {
        let Some(name) = action.as_str() else {
            return Err(render_err(
                Dialect::Legacy,
                None,
                ErrorPayload::new(error::INVALID_REQUEST, "action must be a string"),
            ));
        };
        // The legacy request's remaining fields are its parameter object.
        return Ok(Classified {
            dialect: Dialect::Legacy,
            id: None,
            name: name.to_string(),
            params: Value::Object(fields),
        });
    }

    Err(render_err(
        Dialect::Rpc,
        None,
        ErrorPayload::new(error::INVALID_REQUEST, "expected a method or action field"),
    ))
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum Operation {
    ListTools,
    CallTool { name: String, arguments: Value },
    ListResources,
    ReadResource { uri: ResourceUri },
    Subscribe { uri: ResourceUri },
    Unsubscribe { uri: ResourceUri },
    Liveness,
    Status,
    Stop,
}

fn resolve(dialect: Dialect, name: &str, params: &Value) -> Result<Operation, ErrorPayload> {
    match (dialect, name) {
        (Dialect::Rpc, "tools/list") | (Dialect::Legacy, "list_tools") => Ok(Operation::ListTools),
        (Dialect::Rpc, "tools/call") | (Dialect::Legacy, "call_tool") => Ok(Operation::CallTool {
            name: require_str(params, "name")?,
            arguments: params.get("arguments").cloned().unwrap_or_else(|| json!({})),
        }),
        (Dialect::Rpc, "resources/list") | (Dialect::Legacy, "list_resources") => {
            Ok(Operation::ListResources)
        }
        (Dialect::Rpc, "resources/read") | (Dialect::Legacy, "read_resource") => {
            Ok(Operation::ReadResource {
                uri: require_uri(params)?,
            })
        }
        (Dialect::Legacy, "subscribe_resource") => Ok(Operation::Subscribe {
            uri: require_uri(params)?,
        }),
        (Dialect::Legacy, "unsubscribe_resource") => Ok(Operation::Unsubscribe {
            uri: require_uri(params)?,
        }),
        (Dialect::Legacy, "test") => Ok(Operation::Liveness),
        (Dialect::Legacy, "status") => Ok(Operation::Status),
        (Dialect::Legacy, "stop") => Ok(Operation::Stop),
        (Dialect::Rpc, unknown) => Err(ErrorPayload::new(
            error::METHOD_NOT_FOUND,
            format!("unknown method: {unknown}"),
        )),
        (Dialect::Legacy, unknown) => Err(ErrorPayload::new(
            error::METHOD_NOT_FOUND,
            format!("unknown action: {unknown}"),
        )),
    }
}

fn require_str(params: &Value, key: &str) -> Result<String, ErrorPayload> {
    params
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            ErrorPayload::new(
                error::INVALID_PARAMS,
                format!("missing required parameter: {key}"),
            )
        })
}

fn require_uri(params: &Value) -> Result<ResourceUri, ErrorPayload> {
    let raw = require_str(params, "uri")?;
    ResourceUri::parse(&raw).map_err(|err| ErrorPayload::new(error::INVALID_PARAMS, err.to_string()))
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Dispatches classified requests against the host collaborators and the
/// subscription registry.
#[derive(Clone)]
pub struct Router {
    executor: Arc<dyn CommandExecutor>,
    provider: Arc<dyn ResourceProvider>,
    registry: SubscriptionRegistry,
    stop: StopHandle,
    call_timeout: Duration,
    started: Instant,
}

impl Router {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        provider: Arc<dyn ResourceProvider>,
        registry: SubscriptionRegistry,
        stop: StopHandle,
        call_timeout: Duration,
    ) -> Self {
        Self {
            executor,
            provider,
            registry,
            stop,
            call_timeout,
            started: Instant::now(),
        }
    }

    /// Route one decoded request and build the response in the request's
    /// dialect. Application-level failures become error payloads; nothing
    /// here closes the connection.
    pub async fn dispatch(&self, conn: ConnId, request: Value) -> Value {
        let Classified {
            dialect,
            id,
            name,
            params,
        } = match classify(request) {
            Ok(classified) => classified,
            Err(response) => return response,
        };
        debug!(%conn, %name, ?dialect, "dispatching request");

        let outcome = match resolve(dialect, &name, &params) {
            Ok(operation) => self.handle(conn, operation).await,
            Err(payload) => Err(payload),
        };
        match outcome {
            Ok(result) => render_ok(dialect, id, result),
            Err(payload) => {
                debug!(code = payload.code, message = %payload.message, "request failed");
                render_err(dialect, id, payload)
            }
        }
    }

    async fn handle(&self, conn: ConnId, operation: Operation) -> Result<Value, ErrorPayload> {
        match operation {
            Operation::ListTools => Ok(json!({ "tools": self.executor.tools() })),
            Operation::CallTool { name, arguments } => {
                self.call_tool_bounded(name, arguments).await
            }
            Operation::ListResources => {
                let mut resources = Vec::new();
                for category in ResourceCategory::ALL {
                    for id in self.provider.list(category) {
                        resources.push(json!({
                            "uri": ResourceUri::new(category, &id).to_string(),
                            "name": id,
                        }));
                    }
                }
                Ok(json!({ "resources": resources }))
            }
            Operation::ReadResource { uri } => {
                let value = self.provider.read(&uri).map_err(internal)?;
                Ok(json!({
                    "contents": [{
                        "uri": uri.to_string(),
                        "mimeType": "application/json",
                        "text": value.to_string(),
                    }]
                }))
            }
            Operation::Subscribe { uri } => {
                self.registry.subscribe(uri.clone(), conn);
                Ok(json!({ "subscribed": true, "uri": uri.to_string() }))
            }
            Operation::Unsubscribe { uri } => {
                self.registry.unsubscribe(&uri, conn);
                Ok(json!({ "subscribed": false, "uri": uri.to_string() }))
            }
            Operation::Liveness => Ok(json!({ "status": "ok" })),
            Operation::Status => Ok(json!({
                "status": "running",
                "uptime_seconds": self.started.elapsed().as_secs_f64(),
                "connections": self.registry.connection_count(),
                "subscriptions": self.registry.subscription_count(),
            })),
            Operation::Stop => {
                self.stop.stop();
                Ok(json!({ "stopping": true }))
            }
        }
    }

    /// Invoke one tool with a bounded wait.
    ///
    /// The invocation runs in a spawned task and the wait applies to its
    /// join handle, so an invocation that outlives the deadline keeps
    /// running detached and its eventual result is discarded.
    async fn call_tool_bounded(
        &self,
        name: String,
        arguments: Value,
    ) -> Result<Value, ErrorPayload> {
        let executor = Arc::clone(&self.executor);
        let tool = name.clone();
        let invocation = tokio::spawn(async move { executor.invoke(&tool, arguments).await });

        match tokio::time::timeout(self.call_timeout, invocation).await {
            Ok(Ok(Ok(result))) => Ok(normalize_tool_result(result)),
            Ok(Ok(Err(err))) => Err(internal(err)),
            Ok(Err(join_err)) => Err(internal(format!("tool task failed: {join_err}"))),
            Err(_) => {
                warn!(tool = %name, timeout = ?self.call_timeout, "abandoning tool call");
                Err(ErrorPayload::new(
                    error::TIMEOUT,
                    format!(
                        "tool call {name:?} timed out after {:.1}s",
                        self.call_timeout.as_secs_f64()
                    ),
                ))
            }
        }
    }
}

fn internal(err: impl std::fmt::Display) -> ErrorPayload {
    ErrorPayload::new(error::INTERNAL_ERROR, err.to_string())
}

fn render_ok(dialect: Dialect, id: Option<RequestId>, result: Value) -> Value {
    match dialect {
        Dialect::Rpc => RpcResponse::success(id, result).into_value(),
        Dialect::Legacy => result,
    }
}

fn render_err(dialect: Dialect, id: Option<RequestId>, payload: ErrorPayload) -> Value {
    match dialect {
        Dialect::Rpc => RpcResponse::error(id, payload).into_value(),
        Dialect::Legacy => legacy_error(payload),
    }
}

// ---------------------------------------------------------------------------
// Tool-result normalization
// ---------------------------------------------------------------------------

/// Fold whatever shape a tool returned (record, list, bare string) into the
/// uniform `{content: [...], isError}` envelope.
fn normalize_tool_result(result: Value) -> Value {
    let content = match result {
        Value::Null => Vec::new(),
        Value::String(text) => vec![text_block(text)],
        Value::Array(items) => items.into_iter().map(content_block).collect(),
        Value::Object(mut map) => {
            // Already in envelope shape: pass through, defaulting isError.
            if map.contains_key("content") {
                map.entry("isError").or_insert(json!(false));
                return Value::Object(map);
            }
            vec![content_block(Value::Object(map))]
        }
        other => vec![content_block(other)],
    };
    json!({ "content": content, "isError": false })
}

fn content_block(item: Value) -> Value {
    match item {
        Value::String(text) => text_block(text),
        other => text_block(other.to_string()),
    }
}

fn text_block(text: impl Into<String>) -> Value {
    json!({ "type": "text", "text": text.into() })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
