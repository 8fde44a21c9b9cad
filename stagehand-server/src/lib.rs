// stagehand-server
//! Host-side server for stagehand: dual-dialect request routing, polling
//! resource-change detection, and subscription fan-out over framed
//! transports.

pub mod config;
pub mod detector;
pub mod host;
pub mod memory;
pub mod router;
pub mod server;
pub mod subscriptions;

pub use config::ServerConfig;
pub use host::{CommandExecutor, HostError, ObservedResource, ResourceProvider, ToolSpec};
pub use memory::MemoryHost;
pub use router::Router;
pub use server::{Server, ServerError, StopHandle};
pub use subscriptions::{ConnId, SubscriptionRegistry};
