// Lifecycle coordination: startup scan, incremental registration, refresh
//
// Failures to fetch or parse a single API's schema never prevent the other
// connections from registering.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::arm::{ArmClient, ArmError, ConnectionInfo};
use crate::openapi::{filter_operations, generate_input_schema, parse_document};

use super::{
	DynamicTool, RegistryError, SchemaCache, ToolRegistry, build_tool_name, compose_description,
};

/// Tally returned by every lifecycle entry point
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistrationSummary {
	pub registered: usize,
	pub skipped: usize,
	pub errors: usize,
}

impl fmt::Display for RegistrationSummary {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"{} registered, {} skipped, {} errors",
			self.registered, self.skipped, self.errors
		)
	}
}

/// Emits the tool-protocol `notifications/tools/list_changed`. The server
/// transport provides the real implementation; tests count calls.
#[async_trait]
pub trait ListChangedNotifier: Send + Sync + fmt::Debug {
	async fn notify_tools_changed(&self);
}

/// No-op notifier for contexts with no connected client
#[derive(Debug, Default, Clone)]
pub struct NullNotifier;

#[async_trait]
impl ListChangedNotifier for NullNotifier {
	async fn notify_tools_changed(&self) {}
}

/// Drives compilation of connections into registered tools
#[derive(Debug, Clone)]
pub struct LifecycleCoordinator {
	arm: ArmClient,
	registry: Arc<ToolRegistry>,
	cache: Arc<SchemaCache>,
	notifier: Arc<dyn ListChangedNotifier>,
}

impl LifecycleCoordinator {
	pub fn new(
		arm: ArmClient,
		registry: Arc<ToolRegistry>,
		cache: Arc<SchemaCache>,
		notifier: Arc<dyn ListChangedNotifier>,
	) -> Self {
		Self { arm, registry, cache, notifier }
	}

	/// Compile every connection in the resource group into tools.
	/// Per-connection failures are tallied and the scan continues.
	pub async fn startup_scan(&self) -> RegistrationSummary {
		let mut summary = RegistrationSummary::default();

		let connections = match self.arm.list_connections().await {
			Ok(connections) => connections,
			Err(e) => {
				warn!(target: "dynamic_tools", error = %e, "failed to list connections");
				summary.errors += 1;
				return summary;
			},
		};

		info!(
			target: "dynamic_tools",
			connections = connections.len(),
			"scanning connections for dynamic tools"
		);
		for connection in &connections {
			self.compile_connection(connection, &mut summary).await;
		}

		info!(target: "dynamic_tools", %summary, "scan complete");
		summary
	}

	/// Register tools for one freshly provisioned connection. Short-circuits
	/// when the API already has tools; notifies the client at most once, and
	/// only when something new registered.
	pub async fn register_connection(&self, connection: &ConnectionInfo) -> RegistrationSummary {
		if self.registry.has_prefix(&connection.api_name) {
			debug!(
				target: "dynamic_tools",
				api = %connection.api_name,
				"tools already registered, skipping incremental registration"
			);
			return RegistrationSummary::default();
		}

		let mut summary = RegistrationSummary::default();
		self.compile_connection(connection, &mut summary).await;

		if summary.registered > 0 {
			self.notifier.notify_tools_changed().await;
		}
		summary
	}

	/// Additive refresh: drop cached documents and re-scan. Existing
	/// registrations stay; collisions count as skipped.
	pub async fn refresh(&self) -> RegistrationSummary {
		self.cache.clear();
		self.startup_scan().await
	}

	async fn compile_connection(
		&self,
		connection: &ConnectionInfo,
		summary: &mut RegistrationSummary,
	) {
		let doc = match self.connector_document(&connection.api_name).await {
			Ok(Some(doc)) => doc,
			Ok(None) => {
				// The managed API exists but exports no Swagger; nothing to
				// register and nothing to count as a failure.
				warn!(
					target: "dynamic_tools",
					api = %connection.api_name,
					"managed API document has no embedded swagger, skipping"
				);
				return;
			},
			Err(e) => {
				warn!(
					target: "dynamic_tools",
					api = %connection.api_name,
					error = %e,
					"failed to fetch managed API document"
				);
				summary.errors += 1;
				return;
			},
		};

		let operations = filter_operations(parse_document(&doc, &connection.api_name));
		for operation in operations {
			let name = build_tool_name(&connection.api_name, &operation.operation_id);
			let description = compose_description(connection, &operation);
			let input_schema = generate_input_schema(&operation);
			let tool = DynamicTool {
				connection: connection.clone(),
				operation,
				description,
				input_schema,
			};
			match self.registry.insert(name.clone(), tool) {
				Ok(()) => {
					debug!(target: "dynamic_tools", tool = %name, "registered");
					summary.registered += 1;
				},
				Err(RegistryError::DuplicateToolName(_)) => {
					debug!(target: "dynamic_tools", tool = %name, "name taken, skipping");
					summary.skipped += 1;
				},
			}
		}
	}

	/// Cached Swagger for an API, fetching (with `export=true`) on miss.
	/// `Ok(None)` means the document carries no embedded Swagger.
	async fn connector_document(&self, api_name: &str) -> Result<Option<Arc<Value>>, ArmError> {
		if let Some(doc) = self.cache.get(api_name) {
			return Ok(Some(doc));
		}

		let response = self.arm.get_managed_api(api_name).await?;
		let Some(swagger) = response.pointer("/properties/swagger") else {
			return Ok(None);
		};
		let doc = Arc::new(swagger.clone());
		self.cache.put(api_name, Arc::clone(&doc));
		Ok(Some(doc))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_summary_display() {
		let summary = RegistrationSummary { registered: 3, skipped: 1, errors: 0 };
		assert_eq!(summary.to_string(), "3 registered, 1 skipped, 0 errors");
	}
}
