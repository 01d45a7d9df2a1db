// Invocation translation: validated tool params -> ARM dynamicInvoke envelope
//
// The envelope keys carry the original (pre-sanitization) parameter and
// property names; params are read back by their sanitized keys.

use indexmap::IndexMap;
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::arm::{ArmClient, ArmError};
use crate::openapi::{JSON_STRING_TYPE, ParamLocation, ParsedOperation, sanitize_key};
use crate::registry::DynamicTool;

/// Build the `{ request: { method, path, headers?, body?, queries? } }`
/// envelope for one operation call.
pub fn build_invoke_envelope(
	operation: &ParsedOperation,
	params: &IndexMap<String, Value>,
) -> Value {
	// The connectionId segment is implied by the URL the envelope is posted to
	let mut invocation_path = operation
		.path
		.strip_prefix("/{connectionId}")
		.unwrap_or(&operation.path)
		.to_string();

	let mut queries = Map::new();
	for param in &operation.parameters {
		if param.name == "connectionId" {
			continue;
		}
		let Some(value) = params.get(&sanitize_key(&param.name)) else {
			continue;
		};
		match param.location {
			ParamLocation::Path => {
				invocation_path =
					invocation_path.replace(&format!("{{{}}}", param.name), &value_to_string(value));
			},
			ParamLocation::Query => {
				queries.insert(param.name.clone(), Value::String(value_to_string(value)));
			},
			// Custom header parameters are not forwarded through dynamicInvoke
			ParamLocation::Header => {},
		}
	}

	let mut body = Map::new();
	if let Some(request_body) = &operation.request_body {
		for property in &request_body.properties {
			let key = sanitize_key(&property.name);
			let value = params
				.get(&key)
				.or_else(|| params.get(&format!("body_{key}")));
			let Some(value) = value else {
				continue;
			};
			body.insert(property.name.clone(), coerce_body_value(&property.prop_type, value));
		}
	}

	let mut request = Map::new();
	request.insert("method".to_string(), json!(operation.method.as_upper()));
	request.insert("path".to_string(), json!(invocation_path));
	if !body.is_empty() {
		request.insert(
			"headers".to_string(),
			json!({"Content-Type": "application/json"}),
		);
		request.insert("body".to_string(), Value::Object(body));
	}
	if !queries.is_empty() {
		request.insert("queries".to_string(), Value::Object(queries));
	}

	json!({ "request": Value::Object(request) })
}

/// Object-typed properties accept either structured JSON or a JSON-encoded
/// string; an unparseable string stays a string.
fn coerce_body_value(prop_type: &str, value: &Value) -> Value {
	match value {
		Value::String(s) if prop_type == "object" || prop_type == JSON_STRING_TYPE => {
			serde_json::from_str(s).unwrap_or_else(|_| value.clone())
		},
		_ => value.clone(),
	}
}

/// Path and query values travel as bare strings
fn value_to_string(value: &Value) -> String {
	match value {
		Value::String(s) => s.clone(),
		other => other.to_string(),
	}
}

/// The interesting part of a dynamicInvoke result is `response.body`; fall
/// back to the whole payload when the shape differs.
pub fn extract_invoke_result(result: Value) -> Value {
	match result.pointer("/response/body") {
		Some(body) => body.clone(),
		None => result,
	}
}

/// Run one dynamic tool call end to end, returning the JSON text the tool
/// caller sees.
pub async fn invoke_operation(
	arm: &ArmClient,
	tool: &DynamicTool,
	params: &IndexMap<String, Value>,
) -> Result<String, ArmError> {
	let envelope = build_invoke_envelope(&tool.operation, params);
	debug!(
		target: "dynamic_tools",
		connection = %tool.connection.name,
		operation = %tool.operation.operation_id,
		"dynamic invoke"
	);
	let result = arm.dynamic_invoke(&tool.connection.name, envelope).await?;
	Ok(serde_json::to_string_pretty(&extract_invoke_result(result))?)
}
