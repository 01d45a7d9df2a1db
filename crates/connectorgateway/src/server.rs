// MCP server surface: the six static connection-management tools plus the
// dynamic registry snapshot
//
// The handler validates client arguments against each tool's descriptor map
// before dispatch; handlers return error content blocks, never protocol
// failures.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use rmcp::model::{
	CallToolRequestParam, CallToolResult, Content, InitializeRequestParam, InitializeResult,
	Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion, ServerCapabilities,
	ServerInfo, Tool, ToolsCapability,
};
use rmcp::service::RequestContext;
use rmcp::{ErrorData, Peer, RoleServer, ServerHandler, ServiceError};
use serde_json::{Map, Value, json};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::arm::{ArmClient, ConnectionInfo};
use crate::invoke::invoke_operation;
use crate::openapi::{
	InputSchema, ParamKind, ParamSpec, render_json_schema, validate_args,
};
use crate::registry::lifecycle::{LifecycleCoordinator, ListChangedNotifier, RegistrationSummary};
use crate::registry::{SchemaCache, ToolRegistry};

/// Sends `notifications/tools/list_changed` to every live peer, dropping
/// peers whose transport has gone away.
#[derive(Clone, Default)]
pub struct PeerNotifier {
	peers: Arc<RwLock<Vec<Peer<RoleServer>>>>,
}

impl fmt::Debug for PeerNotifier {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("PeerNotifier").finish_non_exhaustive()
	}
}

impl PeerNotifier {
	async fn track(&self, peer: Peer<RoleServer>) {
		self.peers.write().await.push(peer);
	}
}

#[async_trait]
impl ListChangedNotifier for PeerNotifier {
	async fn notify_tools_changed(&self) {
		let mut peers = self.peers.write().await;
		let mut retained = Vec::new();
		for peer in peers.iter() {
			if peer.is_transport_closed() {
				continue;
			}
			match peer.notify_tool_list_changed().await {
				Ok(()) => retained.push(peer.clone()),
				Err(ServiceError::TransportSend(_) | ServiceError::TransportClosed) => {
					error!(target: "dynamic_tools", "peer unreachable for list_changed, dropping");
				},
				Err(e) => {
					error!(target: "dynamic_tools", error = %e, "failed to notify peer of tool change");
					retained.push(peer.clone());
				},
			}
		}
		*peers = retained;
	}
}

/// The server: ARM client, dynamic registry, and lifecycle coordinator
#[derive(Debug, Clone)]
pub struct ConnectorGateway {
	arm: ArmClient,
	registry: Arc<ToolRegistry>,
	coordinator: LifecycleCoordinator,
	notifier: PeerNotifier,
}

impl ConnectorGateway {
	pub fn new(arm: ArmClient) -> Self {
		let registry = Arc::new(ToolRegistry::new());
		let cache = Arc::new(SchemaCache::new());
		let notifier = PeerNotifier::default();
		let coordinator = LifecycleCoordinator::new(
			arm.clone(),
			Arc::clone(&registry),
			cache,
			Arc::new(notifier.clone()),
		);
		Self { arm, registry, coordinator, notifier }
	}

	/// Compile all existing connections; called once before serving
	pub async fn startup_scan(&self) -> RegistrationSummary {
		self.coordinator.startup_scan().await
	}

	async fn dispatch_static(
		&self,
		name: &str,
		params: indexmap::IndexMap<String, Value>,
	) -> CallToolResult {
		match name {
			"list_managed_apis" => self.list_managed_apis(&params).await,
			"put_connection" => self.put_connection(&params).await,
			"list_connections" => self.list_connections().await,
			"get_consent_link" => self.get_consent_link(&params).await,
			"list_dynamic_tools" => self.list_dynamic_tools(),
			"refresh_tools" => self.refresh_tools().await,
			_ => error_result(format!("unhandled static tool '{name}'")),
		}
	}

	async fn list_managed_apis(&self, params: &indexmap::IndexMap<String, Value>) -> CallToolResult {
		let location = params
			.get("location")
			.and_then(Value::as_str)
			.unwrap_or(&self.arm.context().location)
			.to_string();
		let microsoft_only = params
			.get("microsoftOnly")
			.and_then(Value::as_bool)
			.unwrap_or(true);

		match self.arm.list_managed_apis(&location).await {
			Ok(response) => {
				let apis: Vec<Value> = response
					.get("value")
					.and_then(Value::as_array)
					.map(|items| {
						items
							.iter()
							.filter(|item| !microsoft_only || is_microsoft_published(item))
							.map(|item| {
								json!({
									"name": item.get("name").cloned().unwrap_or_default(),
									"displayName": item.pointer("/properties/displayName").cloned().unwrap_or_default(),
									"description": item.pointer("/properties/description").cloned().unwrap_or_default(),
								})
							})
							.collect()
					})
					.unwrap_or_default();
				text_result(&json!({ "managedApis": apis }))
			},
			Err(e) => error_result(e.to_string()),
		}
	}

	async fn put_connection(&self, params: &indexmap::IndexMap<String, Value>) -> CallToolResult {
		let connection_name = required_str(params, "connectionName");
		let managed_api_name = required_str(params, "managedApiName");
		let display_name = required_str(params, "displayName");
		let parameter_values = params.get("parameterValues").map(coerce_object);
		let location = params.get("location").and_then(Value::as_str);

		let mut response = match self
			.arm
			.put_connection(
				connection_name,
				managed_api_name,
				display_name,
				parameter_values,
				location,
			)
			.await
		{
			Ok(response) => response,
			Err(e) => return error_result(e.to_string()),
		};

		// A fresh connection means a fresh API to compile; already-known
		// APIs short-circuit inside the coordinator.
		if let Some(info) = ConnectionInfo::from_resource(&response) {
			let summary = self.coordinator.register_connection(&info).await;
			if summary.registered > 0 {
				info!(
					target: "dynamic_tools",
					api = %info.api_name,
					%summary,
					"registered dynamic tools for new connection"
				);
				response["dynamicTools"] = json!({
					"registered": summary.registered,
					"skipped": summary.skipped,
					"errors": summary.errors,
				});
			}
		}

		text_result(&response)
	}

	async fn list_connections(&self) -> CallToolResult {
		match self.arm.list_connections().await {
			Ok(connections) => match serde_json::to_value(&connections) {
				Ok(value) => text_result(&json!({ "connections": value })),
				Err(e) => error_result(e.to_string()),
			},
			Err(e) => error_result(e.to_string()),
		}
	}

	async fn get_consent_link(&self, params: &indexmap::IndexMap<String, Value>) -> CallToolResult {
		let connection_name = required_str(params, "connectionName");
		let object_id = required_str(params, "objectId");
		let tenant_id = params
			.get("tenantId")
			.and_then(Value::as_str)
			.unwrap_or("common");

		match self
			.arm
			.list_consent_links(connection_name, object_id, tenant_id)
			.await
		{
			Ok(response) => text_result(&response),
			Err(e) => error_result(e.to_string()),
		}
	}

	fn list_dynamic_tools(&self) -> CallToolResult {
		let tools: Vec<Value> = self
			.registry
			.snapshot()
			.into_iter()
			.map(|(name, tool)| {
				json!({
					"name": name,
					"connection": tool.connection.name,
					"apiName": tool.connection.api_name,
					"operationId": tool.operation.operation_id,
					"method": tool.operation.method.as_upper(),
					"path": tool.operation.path,
					"description": tool.description,
				})
			})
			.collect();
		text_result(&json!({ "count": tools.len(), "dynamicTools": tools }))
	}

	async fn refresh_tools(&self) -> CallToolResult {
		let summary = self.coordinator.refresh().await;
		CallToolResult::success(vec![Content::text(format!("Refresh complete: {summary}"))])
	}
}

impl ServerHandler for ConnectorGateway {
	fn get_info(&self) -> ServerInfo {
		ServerInfo {
			protocol_version: ProtocolVersion::default(),
			capabilities: ServerCapabilities {
				tools: Some(ToolsCapability { list_changed: Some(true) }),
				..Default::default()
			},
			server_info: Implementation::from_build_env(),
			instructions: Some(
				"Exposes Azure API Connections as tools. Static tools manage connections; \
				 each connected API's operations surface as dynamically generated tools."
					.to_string(),
			),
		}
	}

	async fn initialize(
		&self,
		_request: InitializeRequestParam,
		context: RequestContext<RoleServer>,
	) -> Result<InitializeResult, ErrorData> {
		self.notifier.track(context.peer).await;
		Ok(self.get_info())
	}

	async fn list_tools(
		&self,
		_request: Option<PaginatedRequestParam>,
		_context: RequestContext<RoleServer>,
	) -> Result<ListToolsResult, ErrorData> {
		let mut tools: Vec<Tool> = static_tools()
			.into_iter()
			.map(|(name, description, schema)| {
				Tool::new(name, description, Arc::new(render_json_schema(&schema)))
			})
			.collect();

		for (name, tool) in self.registry.snapshot() {
			tools.push(Tool::new(
				name,
				tool.description.clone(),
				Arc::new(render_json_schema(&tool.input_schema)),
			));
		}

		debug!(target: "dynamic_tools", tools = tools.len(), "list_tools");
		Ok(ListToolsResult { tools, next_cursor: None, meta: None })
	}

	async fn call_tool(
		&self,
		request: CallToolRequestParam,
		_context: RequestContext<RoleServer>,
	) -> Result<CallToolResult, ErrorData> {
		let name = request.name.as_ref();
		let args: Map<String, Value> = request.arguments.unwrap_or_default();

		if let Some(schema) = static_tool_schema(name) {
			let params = match validate_args(&schema, &args) {
				Ok(params) => params,
				Err(e) => return Ok(error_result(e.to_string())),
			};
			return Ok(self.dispatch_static(name, params).await);
		}

		if let Some(tool) = self.registry.get(name) {
			let params = match validate_args(&tool.input_schema, &args) {
				Ok(params) => params,
				Err(e) => return Ok(error_result(e.to_string())),
			};
			return Ok(match invoke_operation(&self.arm, &tool, &params).await {
				Ok(text) => CallToolResult::success(vec![Content::text(text)]),
				Err(e) => error_result(format!(
					"Error invoking {}/{}: {}",
					tool.connection.api_name, tool.operation.operation_id, e
				)),
			});
		}

		Err(ErrorData::invalid_params(format!("unknown tool '{name}'"), None))
	}
}

/// Managed APIs carry a publisher field; the default listing keeps the
/// first-party ones.
fn is_microsoft_published(item: &Value) -> bool {
	item
		.pointer("/properties/publisher")
		.and_then(Value::as_str)
		.is_some_and(|p| p.to_ascii_lowercase().contains("microsoft"))
}

/// Values declared as objects may arrive as JSON-encoded strings
fn coerce_object(value: &Value) -> Value {
	match value {
		Value::String(s) => serde_json::from_str(s).unwrap_or_else(|_| value.clone()),
		_ => value.clone(),
	}
}

fn required_str<'a>(params: &'a indexmap::IndexMap<String, Value>, key: &str) -> &'a str {
	// Required string params were already enforced by validate_args
	params.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn text_result(value: &Value) -> CallToolResult {
	CallToolResult::success(vec![Content::text(
		serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string()),
	)])
}

fn error_result(message: impl Into<String>) -> CallToolResult {
	CallToolResult::error(vec![Content::text(message.into())])
}

fn string_spec(required: bool, description: &str) -> ParamSpec {
	ParamSpec::new(ParamKind::String)
		.required(required)
		.with_description(Some(description.to_string()))
}

/// Descriptor maps for the static tools, in the same shape the dynamic
/// tools use so one validator covers both.
fn static_tool_schema(name: &str) -> Option<InputSchema> {
	let mut schema = InputSchema::new();
	match name {
		"list_managed_apis" => {
			schema.insert(
				"location".to_string(),
				string_spec(false, "Azure location; defaults to the configured one"),
			);
			schema.insert(
				"microsoftOnly".to_string(),
				ParamSpec::new(ParamKind::Boolean)
					.with_default(Some(json!(true)))
					.with_description(Some("Only list Microsoft-published connectors".to_string())),
			);
		},
		"put_connection" => {
			schema.insert(
				"connectionName".to_string(),
				string_spec(true, "Name for the connection resource"),
			);
			schema.insert(
				"managedApiName".to_string(),
				string_spec(true, "Managed API to bind, e.g. office365"),
			);
			schema.insert(
				"displayName".to_string(),
				string_spec(true, "Human-readable connection name"),
			);
			schema.insert(
				"parameterValues".to_string(),
				ParamSpec::new(ParamKind::Object)
					.with_description(Some("Connector-specific connection parameters".to_string())),
			);
			schema.insert(
				"location".to_string(),
				string_spec(false, "Azure location; defaults to the configured one"),
			);
		},
		"get_consent_link" => {
			schema.insert(
				"connectionName".to_string(),
				string_spec(true, "Connection awaiting consent"),
			);
			schema.insert(
				"objectId".to_string(),
				string_spec(true, "AAD object id of the consenting user"),
			);
			schema.insert(
				"tenantId".to_string(),
				string_spec(false, "AAD tenant id").with_default(Some(json!("common"))),
			);
		},
		"list_connections" | "list_dynamic_tools" | "refresh_tools" => {},
		_ => return None,
	}
	Some(schema)
}

fn static_tools() -> Vec<(&'static str, &'static str, InputSchema)> {
	[
		(
			"list_managed_apis",
			"List the managed API connectors available in a location.",
		),
		(
			"put_connection",
			"Create or update an API connection and register its operations as tools.",
		),
		(
			"list_connections",
			"List the API connections in the configured resource group.",
		),
		(
			"get_consent_link",
			"Get the OAuth consent link a user visits to authorize a connection.",
		),
		(
			"list_dynamic_tools",
			"List the dynamically generated connector tools currently registered.",
		),
		(
			"refresh_tools",
			"Re-scan connections and register tools for newly appearing APIs.",
		),
	]
	.into_iter()
	.map(|(name, description)| {
		let schema = static_tool_schema(name).unwrap_or_default();
		(name, description, schema)
	})
	.collect()
}
