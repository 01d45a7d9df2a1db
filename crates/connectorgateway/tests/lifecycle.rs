// Integration tests for the tool lifecycle against a mock ARM

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::{Value, json};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use connectorgateway::auth::StaticTokenProvider;
use connectorgateway::{
	ArmClient, ArmContext, ConnectionInfo, ConnectionStatus, LifecycleCoordinator,
	ListChangedNotifier, SchemaCache, ToolRegistry,
};

const CONNECTIONS_PATH: &str =
	"/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Web/connections";

#[derive(Debug, Default)]
struct CountingNotifier(AtomicUsize);

#[async_trait::async_trait]
impl ListChangedNotifier for CountingNotifier {
	async fn notify_tools_changed(&self) {
		self.0.fetch_add(1, Ordering::SeqCst);
	}
}

struct Harness {
	coordinator: LifecycleCoordinator,
	registry: Arc<ToolRegistry>,
	cache: Arc<SchemaCache>,
	notifier: Arc<CountingNotifier>,
}

fn harness(base_url: &str) -> Harness {
	let context = ArmContext {
		subscription_id: "sub".to_string(),
		resource_group: "rg".to_string(),
		location: "eastus".to_string(),
	};
	let arm = ArmClient::new(context, Arc::new(StaticTokenProvider("token".to_string())))
		.unwrap()
		.with_base_url(base_url);
	let registry = Arc::new(ToolRegistry::new());
	let cache = Arc::new(SchemaCache::new());
	let notifier = Arc::new(CountingNotifier::default());
	let dyn_notifier: Arc<dyn ListChangedNotifier> = notifier.clone();
	let coordinator =
		LifecycleCoordinator::new(arm, Arc::clone(&registry), Arc::clone(&cache), dyn_notifier);
	Harness { coordinator, registry, cache, notifier }
}

fn office365_swagger() -> Value {
	json!({
		"swagger": "2.0",
		"paths": {
			"/{connectionId}/v2/Mail": {
				"post": {
					"operationId": "SendEmail",
					"summary": "Send an email",
					"parameters": [
						{"name": "connectionId", "in": "path", "required": true, "type": "string"},
						{
							"name": "emailMessage",
							"in": "body",
							"required": true,
							"schema": {
								"type": "object",
								"required": ["Subject"],
								"properties": {
									"Subject": {"type": "string"},
									"Body": {"type": "string"}
								}
							}
						}
					]
				},
				"get": {
					"operationId": "GetEmails",
					"parameters": [
						{"name": "connectionId", "in": "path", "required": true, "type": "string"},
						{"name": "$top", "in": "query", "type": "integer"}
					]
				}
			},
			"/{connectionId}/v2/Mail/{messageId}": {
				"delete": {
					"operationId": "DeleteMessage",
					"deprecated": true,
					"x-ms-api-annotation": {"family": "DeleteMessage", "revision": 1},
					"parameters": [
						{"name": "connectionId", "in": "path", "required": true, "type": "string"},
						{"name": "messageId", "in": "path", "required": true, "type": "string"}
					]
				}
			},
			"/{connectionId}/codeless/v2/Mail/{messageId}": {
				"delete": {
					"operationId": "DeleteMessageV2",
					"x-ms-api-annotation": {"family": "DeleteMessage", "revision": 2},
					"parameters": [
						{"name": "connectionId", "in": "path", "required": true, "type": "string"},
						{"name": "messageId", "in": "path", "required": true, "type": "string"}
					]
				}
			},
			"/{connectionId}/internal": {
				"get": {"operationId": "InternalPing", "x-ms-visibility": "internal"}
			},
			"/{connectionId}/$subscriptions": {
				"post": {"operationId": "CreateOnNewEmailSubscription"}
			}
		}
	})
}

fn connection_resource(name: &str, api_name: &str, status: &str) -> Value {
	json!({
		"name": name,
		"id": format!("{CONNECTIONS_PATH}/{name}"),
		"properties": {
			"displayName": format!("{api_name} connection"),
			"overallStatus": status,
			"api": {
				"id": format!(
					"/subscriptions/sub/providers/Microsoft.Web/locations/eastus/managedApis/{api_name}"
				),
				"name": api_name
			}
		}
	})
}

async fn mount_managed_api(server: &MockServer, api_name: &str, swagger: &Value) {
	Mock::given(method("GET"))
		.and(path(format!(
			"/subscriptions/sub/providers/Microsoft.Web/locations/eastus/managedApis/{api_name}"
		)))
		.and(query_param("export", "true"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({
			"name": api_name,
			"properties": {"swagger": swagger}
		})))
		.mount(server)
		.await;
}

async fn mount_connections(server: &MockServer, connections: Value) {
	Mock::given(method("GET"))
		.and(path(CONNECTIONS_PATH))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": connections})))
		.mount(server)
		.await;
}

#[tokio::test]
async fn test_startup_scan_registers_filtered_operations() {
	let server = MockServer::start().await;
	mount_connections(
		&server,
		json!([connection_resource("office365", "office365", "Connected")]),
	)
	.await;
	mount_managed_api(&server, "office365", &office365_swagger()).await;

	let h = harness(&server.uri());
	let summary = h.coordinator.startup_scan().await;

	assert_eq!(summary.registered, 3);
	assert_eq!(summary.skipped, 0);
	assert_eq!(summary.errors, 0);

	let names: Vec<String> = h.registry.snapshot().into_iter().map(|(n, _)| n).collect();
	// Internal, trigger-path, and superseded-revision operations are gone
	assert_eq!(
		names,
		vec![
			"office365_send_email",
			"office365_get_emails",
			"office365_delete_message_v2",
		]
	);

	// The swagger was cached for later refreshes
	assert!(h.cache.get("office365").is_some());

	// Startup registration never notifies; there is no client yet
	assert_eq!(h.notifier.0.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_generated_tool_schema_shape() {
	let server = MockServer::start().await;
	mount_connections(
		&server,
		json!([connection_resource("office365", "office365", "Connected")]),
	)
	.await;
	mount_managed_api(&server, "office365", &office365_swagger()).await;

	let h = harness(&server.uri());
	h.coordinator.startup_scan().await;

	let send = h.registry.get("office365_send_email").unwrap();
	assert!(send.input_schema.contains_key("Subject"));
	assert!(send.input_schema.contains_key("Body"));
	assert!(!send.input_schema.contains_key("connectionId"));
	assert!(send.input_schema["Subject"].required);

	let get = h.registry.get("office365_get_emails").unwrap();
	assert!(get.input_schema.contains_key("_top"));
}

#[tokio::test]
async fn test_unauthenticated_connection_flagged_in_description() {
	let server = MockServer::start().await;
	mount_connections(
		&server,
		json!([connection_resource("office365", "office365", "Unauthenticated")]),
	)
	.await;
	mount_managed_api(&server, "office365", &office365_swagger()).await;

	let h = harness(&server.uri());
	h.coordinator.startup_scan().await;

	let send = h.registry.get("office365_send_email").unwrap();
	assert_eq!(send.connection.status, ConnectionStatus::Unauthenticated);
	assert!(send.description.contains("⚠️ Connection not authenticated"));
}

#[tokio::test]
async fn test_incremental_registration_is_idempotent() {
	// Property 9 / S6: the second registration for the same API is a no-op
	// and the client hears about the change exactly once.
	let server = MockServer::start().await;
	Mock::given(method("GET"))
		.and(path(
			"/subscriptions/sub/providers/Microsoft.Web/locations/eastus/managedApis/slack",
		))
		.and(query_param("export", "true"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({
			"name": "slack",
			"properties": {"swagger": {
				"swagger": "2.0",
				"paths": {
					"/{connectionId}/chat.postMessage": {
						"post": {
							"operationId": "PostMessage",
							"parameters": [
								{"name": "connectionId", "in": "path", "required": true, "type": "string"}
							]
						}
					}
				}
			}}
		})))
		.expect(1)
		.mount(&server)
		.await;

	let h = harness(&server.uri());
	let info = ConnectionInfo::from_resource(&connection_resource("slack", "slack", "Connected"))
		.unwrap();

	let first = h.coordinator.register_connection(&info).await;
	assert!(first.registered > 0);
	let size_after_first = h.registry.len();
	assert_eq!(h.notifier.0.load(Ordering::SeqCst), 1);

	let second = h.coordinator.register_connection(&info).await;
	assert_eq!(second.registered, 0);
	assert_eq!(second.skipped, 0);
	assert_eq!(h.registry.len(), size_after_first);
	assert_eq!(h.notifier.0.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_refresh_is_additive() {
	let server = MockServer::start().await;
	mount_connections(
		&server,
		json!([connection_resource("office365", "office365", "Connected")]),
	)
	.await;
	mount_managed_api(&server, "office365", &office365_swagger()).await;

	let h = harness(&server.uri());
	let first = h.coordinator.startup_scan().await;
	assert_eq!(first.registered, 3);

	let refreshed = h.coordinator.refresh().await;
	// The cache was dropped and the document re-fetched, but existing
	// registrations stay and collide as skips.
	assert_eq!(refreshed.registered, 0);
	assert_eq!(refreshed.skipped, 3);
	assert_eq!(h.registry.len(), 3);

	let fetches = server
		.received_requests()
		.await
		.unwrap()
		.iter()
		.filter(|r| r.url.path().contains("managedApis/office365"))
		.count();
	assert_eq!(fetches, 2);
}

#[tokio::test]
async fn test_missing_swagger_is_skipped_without_error() {
	let server = MockServer::start().await;
	mount_connections(
		&server,
		json!([connection_resource("custom", "custom", "Connected")]),
	)
	.await;
	Mock::given(method("GET"))
		.and(path(
			"/subscriptions/sub/providers/Microsoft.Web/locations/eastus/managedApis/custom",
		))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({
			"name": "custom",
			"properties": {}
		})))
		.mount(&server)
		.await;

	let h = harness(&server.uri());
	let summary = h.coordinator.startup_scan().await;
	assert_eq!(summary.registered, 0);
	assert_eq!(summary.errors, 0);
	assert!(h.registry.is_empty());
}

#[tokio::test]
async fn test_per_connection_failures_are_contained() {
	// The first connection's document fetch 404s; the second still registers
	let server = MockServer::start().await;
	mount_connections(
		&server,
		json!([
			connection_resource("broken", "broken", "Connected"),
			connection_resource("office365", "office365", "Connected"),
		]),
	)
	.await;
	Mock::given(method("GET"))
		.and(path(
			"/subscriptions/sub/providers/Microsoft.Web/locations/eastus/managedApis/broken",
		))
		.respond_with(ResponseTemplate::new(404).set_body_json(json!({
			"error": {"code": "NotFound", "message": "no such API"}
		})))
		.mount(&server)
		.await;
	mount_managed_api(&server, "office365", &office365_swagger()).await;

	let h = harness(&server.uri());
	let summary = h.coordinator.startup_scan().await;
	assert_eq!(summary.errors, 1);
	assert_eq!(summary.registered, 3);
	assert!(h.registry.get("office365_send_email").is_some());
}
