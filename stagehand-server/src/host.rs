//! Host collaborator traits.
//!
//! The server core never touches host state directly. Commands run through
//! an injected [`CommandExecutor`]; resource reads and change polling run
//! through a [`ResourceProvider`]. The in-memory reference implementation of
//! both lives in [`crate::memory`].

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use stagehand_wire::{ResourceCategory, ResourceUri};

/// Errors surfaced by the host collaborators.
///
/// The router converts these into InternalError payloads; they never close
/// the connection.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("unknown resource: {0}")]
    UnknownResource(String),
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("{0}")]
    Failed(String),
}

/// Tool descriptor advertised by `tools/list` / `list_tools`.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// One resource instance's identity plus the mutable observable attributes
/// the change detector fingerprints.
#[derive(Debug, Clone)]
pub struct ObservedResource {
    pub id: String,
    pub state: Value,
}

impl ObservedResource {
    pub fn new(id: impl Into<String>, state: Value) -> Self {
        Self {
            id: id.into(),
            state,
        }
    }
}

/// Performs named operations against host state.
///
/// `invoke` may be arbitrarily slow; the router bounds its wait and abandons
/// (does not cancel) invocations that outlive the bound.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// The advertised tool set.
    fn tools(&self) -> Vec<ToolSpec>;

    /// Invoke a named tool with a JSON arguments object.
    async fn invoke(&self, name: &str, arguments: Value) -> Result<Value, HostError>;
}

/// Read access to host resources for the router and the change detector.
pub trait ResourceProvider: Send + Sync {
    /// Ids currently live in one category, in stable order.
    fn list(&self, category: ResourceCategory) -> Vec<String>;

    /// Full JSON representation of one resource.
    fn read(&self, uri: &ResourceUri) -> Result<Value, HostError>;

    /// Identity plus mutable observable attributes for every instance in a
    /// category. Only attributes whose change should notify subscribers
    /// belong in the returned state.
    fn observe(&self, category: ResourceCategory) -> Vec<ObservedResource>;
}
