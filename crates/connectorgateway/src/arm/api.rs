// Typed wrappers for the ARM endpoints this server drives
//
// Paths and api-versions follow the Microsoft.Web connections surface; the
// consent-link endpoint is the one call on a preview api-version.

use reqwest::Method;
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::warn;

use super::{ArmClient, ArmError, CONSENT_LINK_API_VERSION};

/// Consent links always request the OAuth token parameter
pub const CONSENT_PARAMETER_NAME: &str = "token";
pub const CONSENT_REDIRECT_URL: &str = "http://localhost:8080";

/// Connection health as reported by ARM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionStatus {
	Connected,
	Unauthenticated,
	Error,
	Unknown,
}

impl ConnectionStatus {
	pub fn parse(s: Option<&str>) -> Self {
		match s.map(str::to_ascii_lowercase).as_deref() {
			Some("connected") => Self::Connected,
			Some("unauthenticated") => Self::Unauthenticated,
			Some("error") => Self::Error,
			_ => Self::Unknown,
		}
	}

	pub fn is_connected(&self) -> bool {
		matches!(self, Self::Connected)
	}
}

/// Projection of a `Microsoft.Web/connections` resource
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
	/// Connection resource name, unique within the resource group
	pub name: String,
	/// Managed-API identifier, e.g. "office365"
	pub api_name: String,
	pub display_name: String,
	pub status: ConnectionStatus,
	/// Full ARM resource id of the managed API
	pub api_id: String,
}

impl ConnectionInfo {
	/// Project an ARM connection resource. Returns None when the resource
	/// is missing its name or managed-API identity.
	pub fn from_resource(resource: &Value) -> Option<Self> {
		let name = resource.get("name")?.as_str()?.to_string();

		let api_id = resource
			.pointer("/properties/api/id")
			.and_then(Value::as_str)
			.unwrap_or_default()
			.to_string();
		let api_name = resource
			.pointer("/properties/api/name")
			.and_then(Value::as_str)
			.map(str::to_string)
			.or_else(|| api_id.rsplit('/').next().map(str::to_string))
			.unwrap_or_default();
		if name.is_empty() || api_name.is_empty() {
			return None;
		}

		let display_name = resource
			.pointer("/properties/displayName")
			.and_then(Value::as_str)
			.unwrap_or(&name)
			.to_string();
		let status = resource
			.pointer("/properties/overallStatus")
			.and_then(Value::as_str)
			.or_else(|| {
				resource
					.pointer("/properties/statuses/0/status")
					.and_then(Value::as_str)
			});

		Some(Self {
			name,
			api_name,
			display_name,
			status: ConnectionStatus::parse(status),
			api_id,
		})
	}
}

impl ArmClient {
	fn managed_apis_path(&self, location: &str) -> String {
		format!(
			"/subscriptions/{}/providers/Microsoft.Web/locations/{}/managedApis",
			self.context().subscription_id,
			location
		)
	}

	fn connections_path(&self) -> String {
		format!(
			"/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Web/connections",
			self.context().subscription_id,
			self.context().resource_group
		)
	}

	/// Full ARM resource id for a managed API in the context location
	pub fn managed_api_id(&self, api_name: &str) -> String {
		format!("{}/{}", self.managed_apis_path(&self.context().location), api_name)
	}

	/// GET the managed APIs available in a location
	pub async fn list_managed_apis(&self, location: &str) -> Result<Value, ArmError> {
		self
			.request(Method::GET, self.managed_apis_path(location))
			.send()
			.await
	}

	/// GET one managed-API document with its embedded Swagger
	pub async fn get_managed_api(&self, api_name: &str) -> Result<Value, ArmError> {
		self
			.request(Method::GET, self.managed_api_id(api_name))
			.query("export", "true")
			.send()
			.await
	}

	/// GET all connections in the resource group, projected. Resources that
	/// fail the projection invariants are logged and skipped.
	pub async fn list_connections(&self) -> Result<Vec<ConnectionInfo>, ArmError> {
		let response = self.request(Method::GET, self.connections_path()).send().await?;
		let mut connections = Vec::new();
		if let Some(items) = response.get("value").and_then(Value::as_array) {
			for item in items {
				match ConnectionInfo::from_resource(item) {
					Some(info) => connections.push(info),
					None => {
						warn!(
							target: "arm",
							resource = %item.get("id").and_then(serde_json::Value::as_str).unwrap_or("<unnamed>"),
							"skipping connection resource without a name or API identity"
						);
					},
				}
			}
		}
		Ok(connections)
	}

	/// PUT a connection resource, returning the raw ARM response
	pub async fn put_connection(
		&self,
		connection_name: &str,
		managed_api_name: &str,
		display_name: &str,
		parameter_values: Option<Value>,
		location: Option<&str>,
	) -> Result<Value, ArmError> {
		let location = location.unwrap_or(&self.context().location);
		let mut properties = Map::new();
		properties.insert("displayName".to_string(), json!(display_name));
		properties.insert(
			"api".to_string(),
			json!({
				"id": format!(
					"/subscriptions/{}/providers/Microsoft.Web/locations/{}/managedApis/{}",
					self.context().subscription_id,
					location,
					managed_api_name
				)
			}),
		);
		if let Some(values) = parameter_values {
			properties.insert("parameterValues".to_string(), values);
		}

		self
			.request(
				Method::PUT,
				format!("{}/{}", self.connections_path(), connection_name),
			)
			.body(json!({
				"properties": Value::Object(properties),
				"location": location,
			}))
			.send()
			.await
	}

	/// POST listConsentLinks for a connection (preview api-version)
	pub async fn list_consent_links(
		&self,
		connection_name: &str,
		object_id: &str,
		tenant_id: &str,
	) -> Result<Value, ArmError> {
		self
			.request(
				Method::POST,
				format!("{}/{}/listConsentLinks", self.connections_path(), connection_name),
			)
			.api_version(CONSENT_LINK_API_VERSION)
			.body(json!({
				"parameters": [{
					"parameterName": CONSENT_PARAMETER_NAME,
					"redirectUrl": CONSENT_REDIRECT_URL,
					"objectId": object_id,
					"tenantId": tenant_id,
				}]
			}))
			.send()
			.await
	}

	/// POST a dynamicInvoke envelope at a connection
	pub async fn dynamic_invoke(
		&self,
		connection_name: &str,
		envelope: Value,
	) -> Result<Value, ArmError> {
		self
			.request(
				Method::POST,
				format!("{}/{}/dynamicInvoke", self.connections_path(), connection_name),
			)
			.body(envelope)
			.send()
			.await
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_connection_projection() {
		let resource = json!({
			"name": "office365",
			"id": "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Web/connections/office365",
			"properties": {
				"displayName": "Office 365 Outlook",
				"overallStatus": "Connected",
				"api": {
					"id": "/subscriptions/s/providers/Microsoft.Web/locations/eastus/managedApis/office365",
					"name": "office365"
				}
			}
		});
		let info = ConnectionInfo::from_resource(&resource).unwrap();
		assert_eq!(info.name, "office365");
		assert_eq!(info.api_name, "office365");
		assert_eq!(info.display_name, "Office 365 Outlook");
		assert_eq!(info.status, ConnectionStatus::Connected);
	}

	#[test]
	fn test_connection_api_name_from_id_tail() {
		let resource = json!({
			"name": "teams-1",
			"properties": {
				"statuses": [{"status": "Error"}],
				"api": {"id": "/subscriptions/s/providers/Microsoft.Web/locations/eastus/managedApis/teams"}
			}
		});
		let info = ConnectionInfo::from_resource(&resource).unwrap();
		assert_eq!(info.api_name, "teams");
		assert_eq!(info.display_name, "teams-1");
		assert_eq!(info.status, ConnectionStatus::Error);
	}

	#[test]
	fn test_connection_projection_rejects_missing_identity() {
		assert!(ConnectionInfo::from_resource(&json!({"name": "x", "properties": {}})).is_none());
		assert!(ConnectionInfo::from_resource(&json!({"properties": {"api": {"name": "y"}}})).is_none());
	}

	#[test]
	fn test_status_parse_is_lenient() {
		assert_eq!(ConnectionStatus::parse(Some("connected")), ConnectionStatus::Connected);
		assert_eq!(
			ConnectionStatus::parse(Some("Unauthenticated")),
			ConnectionStatus::Unauthenticated
		);
		assert_eq!(ConnectionStatus::parse(Some("Something")), ConnectionStatus::Unknown);
		assert_eq!(ConnectionStatus::parse(None), ConnectionStatus::Unknown);
	}
}
