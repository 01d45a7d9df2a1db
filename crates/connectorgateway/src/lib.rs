// connectorgateway: an MCP server that drives Azure API Connections through
// ARM and compiles each connected API's Swagger document into typed tools.

pub mod arm;
pub mod auth;
pub mod config;
pub mod invoke;
pub mod openapi;
pub mod registry;
pub mod server;

pub use arm::{ArmClient, ArmContext, ArmError, ConnectionInfo, ConnectionStatus};
pub use registry::lifecycle::{LifecycleCoordinator, ListChangedNotifier, RegistrationSummary};
pub use registry::{SchemaCache, ToolRegistry};
pub use server::ConnectorGateway;
