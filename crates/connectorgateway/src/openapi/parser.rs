// Swagger 2.0 walker: compiles each (path, method) pair into a ParsedOperation
//
// Connector documents are Swagger 2.0 with Microsoft vendor extensions
// (x-ms-visibility, x-ms-trigger, x-ms-api-annotation, x-ms-dynamic-values),
// so this walks the raw JSON rather than going through an OpenAPI 3 model.

use serde_json::Value;
use tracing::debug;

use super::types::{
	ApiAnnotation, DynamicValuesRef, JSON_STRING_TYPE, Method, ParamLocation, ParsedBodyProperty,
	ParsedOperation, ParsedParameter, RequestBody, Visibility,
};

/// Object properties nested at or beyond this depth collapse to plain
/// `object` instead of the `"string (JSON)"` synthetic type.
const MAX_FLATTEN_DEPTH: usize = 2;

/// Walk every path/method of `doc` in document order. `api_name` is a label
/// for logging only.
pub fn parse_document(doc: &Value, api_name: &str) -> Vec<ParsedOperation> {
	let mut operations = Vec::new();
	let Some(paths) = doc.get("paths").and_then(Value::as_object) else {
		debug!(target: "dynamic_tools", api = api_name, "document has no paths");
		return operations;
	};

	for (path, item) in paths {
		let Some(item) = item.as_object() else {
			continue;
		};
		for (key, op) in item {
			let Some(method) = Method::parse(key) else {
				continue;
			};
			if !op.is_object() {
				continue;
			}
			operations.push(parse_operation(doc, path, method, op));
		}
	}

	debug!(
		target: "dynamic_tools",
		api = api_name,
		operations = operations.len(),
		"parsed connector document"
	);
	operations
}

fn parse_operation(doc: &Value, path: &str, method: Method, op: &Value) -> ParsedOperation {
	let operation_id = op
		.get("operationId")
		.and_then(Value::as_str)
		.map(str::to_string)
		.unwrap_or_else(|| format!("{}_{}", method.as_str(), path));

	let mut parameters = Vec::new();
	let mut request_body = None;

	if let Some(raw_params) = op.get("parameters").and_then(Value::as_array) {
		for raw in raw_params {
			let resolved;
			let param = if raw.get("$ref").is_some() {
				match resolve_ref(doc, raw["$ref"].as_str().unwrap_or_default()) {
					Some(r) => {
						resolved = r;
						&resolved
					},
					None => raw,
				}
			} else {
				raw
			};

			if param.get("in").and_then(Value::as_str) == Some("body") {
				// Swagger 2.0 allows at most one body parameter; keep the first.
				if request_body.is_none() {
					let schema = param.get("schema").unwrap_or(&Value::Null);
					let required = param
						.get("required")
						.and_then(Value::as_bool)
						.unwrap_or(false);
					request_body = Some(flatten_body(doc, schema, required));
				}
				continue;
			}

			if let Some(parsed) = parse_parameter(param) {
				parameters.push(parsed);
			}
		}
	}

	ParsedOperation {
		operation_id,
		method,
		path: path.to_string(),
		summary: string_field(op, "summary"),
		description: string_field(op, "description"),
		deprecated: op
			.get("deprecated")
			.and_then(Value::as_bool)
			.unwrap_or(false),
		visibility: Visibility::parse(op.get("x-ms-visibility").and_then(Value::as_str)),
		is_trigger: op.get("x-ms-trigger").is_some(),
		api_annotation: parse_annotation(op.get("x-ms-api-annotation")),
		parameters,
		request_body,
		response_schema: response_schema(doc, op),
	}
}

fn parse_annotation(value: Option<&Value>) -> Option<ApiAnnotation> {
	let ann = value?.as_object()?;
	Some(ApiAnnotation {
		family: ann
			.get("family")
			.and_then(Value::as_str)
			.map(str::to_string),
		// Families start at V1 without annotating a revision
		revision: ann.get("revision").and_then(Value::as_i64).unwrap_or(1),
		status: ann
			.get("status")
			.and_then(Value::as_str)
			.map(str::to_string),
	})
}

fn parse_parameter(param: &Value) -> Option<ParsedParameter> {
	let location = ParamLocation::parse(param.get("in").and_then(Value::as_str)?)?;
	let name = param.get("name").and_then(Value::as_str)?.to_string();

	Some(ParsedParameter {
		name,
		location,
		param_type: param
			.get("type")
			.and_then(Value::as_str)
			.unwrap_or("string")
			.to_string(),
		format: string_field(param, "format"),
		required: param
			.get("required")
			.and_then(Value::as_bool)
			.unwrap_or(false),
		description: string_field(param, "description"),
		default: param.get("default").cloned(),
		enum_values: param
			.get("enum")
			.and_then(Value::as_array)
			.map(|v| v.to_vec()),
		dynamic_values: parse_dynamic_values(param.get("x-ms-dynamic-values")),
	})
}

fn parse_dynamic_values(value: Option<&Value>) -> Option<DynamicValuesRef> {
	let dv = value?.as_object()?;
	Some(DynamicValuesRef {
		operation_id: dv
			.get("operationId")
			.and_then(Value::as_str)
			.map(str::to_string),
		value_collection: dv
			.get("value-collection")
			.and_then(Value::as_str)
			.map(str::to_string),
		value_path: dv
			.get("value-path")
			.and_then(Value::as_str)
			.map(str::to_string),
		value_title: dv
			.get("value-title")
			.and_then(Value::as_str)
			.map(str::to_string),
		parameters: dv.get("parameters").cloned(),
	})
}

/// Flatten a body schema into its top-level properties. Object properties
/// with their own properties above MAX_FLATTEN_DEPTH are re-typed as
/// `"string (JSON)"`; binary properties are dropped (the transport cannot
/// carry them).
fn flatten_body(doc: &Value, schema: &Value, required: bool) -> RequestBody {
	let schema = resolve_schema(doc, schema);
	let required_fields: Vec<String> = schema
		.get("required")
		.and_then(Value::as_array)
		.map(|r| {
			r.iter()
				.filter_map(Value::as_str)
				.map(str::to_string)
				.collect()
		})
		.unwrap_or_default();

	let mut properties = Vec::new();
	if let Some(props) = schema.get("properties").and_then(Value::as_object) {
		for (name, raw) in props {
			let prop = resolve_schema(doc, raw);
			if prop.get("format").and_then(Value::as_str) == Some("binary") {
				debug!(target: "dynamic_tools", property = %name, "skipping binary body property");
				continue;
			}

			let declared = prop
				.get("type")
				.and_then(Value::as_str)
				.unwrap_or("string");
			let has_nested = prop
				.get("properties")
				.and_then(Value::as_object)
				.is_some_and(|p| !p.is_empty());
			// Top-level properties sit at depth 1
			let prop_type = body_property_type(declared, has_nested, 1);

			properties.push(ParsedBodyProperty {
				name: name.clone(),
				prop_type,
				format: string_field(&prop, "format"),
				description: string_field(&prop, "description"),
				required: required_fields.iter().any(|f| f == name),
				visibility: Visibility::parse(prop.get("x-ms-visibility").and_then(Value::as_str)),
				enum_values: prop
					.get("enum")
					.and_then(Value::as_array)
					.map(|v| v.to_vec()),
				default: prop.get("default").cloned(),
			});
		}
	}

	RequestBody { required, required_fields, properties }
}

/// Objects with their own properties within the flatten depth become the
/// synthetic `"string (JSON)"` type; anything deeper collapses to `object`.
fn body_property_type(declared: &str, has_nested: bool, depth: usize) -> String {
	if declared == "object" && has_nested && depth < MAX_FLATTEN_DEPTH {
		JSON_STRING_TYPE.to_string()
	} else {
		declared.to_string()
	}
}

fn response_schema(doc: &Value, op: &Value) -> Option<Value> {
	let responses = op.get("responses")?;
	let schema = responses
		.get("200")
		.and_then(|r| r.get("schema"))
		.or_else(|| responses.get("201").and_then(|r| r.get("schema")))?;
	Some(resolve_schema(doc, schema))
}

/// Resolve a `$ref` if present, falling back to a copy of the original
/// schema when the reference does not resolve.
fn resolve_schema(doc: &Value, schema: &Value) -> Value {
	if let Some(reference) = schema.get("$ref").and_then(Value::as_str)
		&& let Some(resolved) = resolve_ref(doc, reference)
	{
		return resolved;
	}
	schema.clone()
}

/// Walk a local `#/…` reference through the document. The result is a deep
/// copy so later mutation cannot corrupt the definitions tree.
pub fn resolve_ref(doc: &Value, reference: &str) -> Option<Value> {
	let pointer = reference.strip_prefix("#/")?;
	let mut current = doc;
	for segment in pointer.split('/') {
		current = current.get(segment)?;
	}
	Some(current.clone())
}

fn string_field(value: &Value, key: &str) -> Option<String> {
	value.get(key).and_then(Value::as_str).map(str::to_string)
}
