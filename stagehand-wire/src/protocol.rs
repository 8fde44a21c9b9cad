//! Request, response, and notification envelope types.
//!
//! Two request dialects share the channel: JSON-RPC 2.0 (`jsonrpc`, `id`,
//! `method`, `params`) and a legacy action style (`action` plus ad hoc
//! fields). Responses mirror the request's dialect. Params and results are
//! kept as `serde_json::Value` because the router inspects them.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// JSON-RPC message identifier (number or string).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Num(i64),
    Str(String),
}

/// JSON-RPC request.
///
/// The version field is defaulted on input: dialect classification keys on
/// the presence of `method`, so a `method`-only request is still JSON-RPC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

fn jsonrpc_version() -> String {
    "2.0".to_string()
}

impl RpcRequest {
    pub fn new(id: RequestId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(id),
            method: method.into(),
            params,
        }
    }

    /// The request as a wire value.
    pub fn into_value(self) -> Value {
        serde_json::to_value(&self).unwrap_or(Value::Null)
    }
}

/// JSON-RPC response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Option<RequestId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

/// Error payload carried by both dialects: inside `error` on the JSON-RPC
/// side, as the body of `{"error": ...}` on the legacy side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorPayload {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

impl RpcResponse {
    /// Construct a success response with the given result.
    pub fn success(id: Option<RequestId>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Construct an error response.
    pub fn error(id: Option<RequestId>, payload: ErrorPayload) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(payload),
        }
    }

    /// The response as a wire value.
    pub fn into_value(self) -> Value {
        serde_json::to_value(&self).unwrap_or(Value::Null)
    }
}

/// Unsolicited server push. Never carries an id; never answered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    ResourceUpdate { uri: String, timestamp: f64 },
}

impl Notification {
    /// A resource-update notification stamped with the current time.
    pub fn resource_update(uri: impl Into<String>) -> Self {
        Notification::ResourceUpdate {
            uri: uri.into(),
            timestamp: epoch_seconds(),
        }
    }

    /// The notification as a wire value.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn uri(&self) -> &str {
        match self {
            Notification::ResourceUpdate { uri, .. } => uri,
        }
    }
}

/// Unix epoch seconds as a float, the wire timestamp format.
pub fn epoch_seconds() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Build a legacy-dialect error response.
pub fn legacy_error(payload: ErrorPayload) -> Value {
    json!({ "error": payload })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn request_roundtrip_numeric_id() {
        let json = r#"{"jsonrpc":"2.0","id":42,"method":"tools/list"}"#;
        let req: RpcRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.jsonrpc, "2.0");
        assert_eq!(req.id, Some(RequestId::Num(42)));
        assert_eq!(req.method, "tools/list");
        assert!(req.params.is_none());

        let serialized = serde_json::to_string(&req).unwrap();
        let req2: RpcRequest = serde_json::from_str(&serialized).unwrap();
        assert_eq!(req2.id, Some(RequestId::Num(42)));
    }

    #[test]
    fn request_version_defaults_when_absent() {
        let req: RpcRequest = serde_json::from_str(r#"{"id":3,"method":"tools/list"}"#).unwrap();
        assert_eq!(req.jsonrpc, "2.0");
        assert_eq!(req.id, Some(RequestId::Num(3)));
    }

    #[test]
    fn request_roundtrip_string_id() {
        let json = r#"{"jsonrpc":"2.0","id":"req-7","method":"resources/read","params":{"uri":"stage://object/Cube"}}"#;
        let req: RpcRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.id, Some(RequestId::Str("req-7".to_string())));
        assert_eq!(req.params.unwrap()["uri"], "stage://object/Cube");
    }

    #[test]
    fn success_response_shape() {
        let resp = RpcResponse::success(Some(RequestId::Num(1)), json!({"tools": []}));
        let value = resp.into_value();
        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["id"], 1);
        assert_eq!(value["result"], json!({"tools": []}));
        assert!(value.get("error").is_none());
    }

    #[test]
    fn error_response_shape() {
        let resp = RpcResponse::error(
            Some(RequestId::Num(5)),
            ErrorPayload::new(crate::error::METHOD_NOT_FOUND, "unknown method: nope"),
        );
        let value = resp.into_value();
        assert_eq!(value["id"], 5);
        assert!(value.get("result").is_none());
        assert_eq!(value["error"]["code"], -32601);
        assert_eq!(value["error"]["message"], "unknown method: nope");
        assert!(value["error"].get("data").is_none());
    }

    #[test]
    fn error_response_null_id_serializes_id() {
        // Parse errors answer with id null, not a missing id key.
        let resp = RpcResponse::error(None, ErrorPayload::new(crate::error::PARSE_ERROR, "bad"));
        let value = resp.into_value();
        assert!(value.get("id").is_some());
        assert_eq!(value["id"], Value::Null);
    }

    #[test]
    fn notification_wire_shape() {
        let note = Notification::resource_update("stage://object/Cube");
        let value = note.to_value();
        assert_eq!(value["type"], "resource_update");
        assert_eq!(value["uri"], "stage://object/Cube");
        assert!(value["timestamp"].as_f64().unwrap() > 0.0);
        assert!(value.get("id").is_none());
    }

    #[test]
    fn notification_deserializes_from_wire() {
        let value = json!({"type": "resource_update", "uri": "stage://light/Key", "timestamp": 1.5});
        let note: Notification = serde_json::from_value(value).unwrap();
        assert_eq!(note.uri(), "stage://light/Key");
    }

    #[test]
    fn legacy_error_shape() {
        let value = legacy_error(ErrorPayload::new(-32600, "expected method or action"));
        assert_eq!(value["error"]["code"], -32600);
        assert_eq!(value["error"]["message"], "expected method or action");
        assert!(value.get("jsonrpc").is_none());
    }
}
