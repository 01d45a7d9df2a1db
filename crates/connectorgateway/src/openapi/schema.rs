// Input-schema generation: parsed operations -> typed parameter descriptors
//
// The descriptors are deliberately not a full JSON-Schema model; eight kinds
// cover everything the connectors declare. The validator lives here too but
// is separate from the descriptor so the registrar can apply it on its own.

use indexmap::IndexMap;
use serde_json::{Map, Value, json};
use thiserror::Error;

use super::types::{JSON_STRING_TYPE, ParsedOperation};

/// The external naming contract for tool and parameter keys
pub const KEY_MAX_LEN: usize = 64;

/// Typed kind of a tool input parameter
#[derive(Debug, Clone, PartialEq)]
pub enum ParamKind {
	String,
	Integer,
	Number,
	Boolean,
	/// `items` constrains elements; None accepts anything
	Array { items: Option<Box<ParamKind>> },
	/// Accepts an arbitrary map, or a JSON-encoded string of one
	Object,
	Enum(Vec<Value>),
}

/// Descriptor for a single tool input parameter
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
	pub kind: ParamKind,
	pub required: bool,
	pub default: Option<Value>,
	pub description: Option<String>,
}

impl ParamSpec {
	pub fn new(kind: ParamKind) -> Self {
		Self { kind, required: false, default: None, description: None }
	}

	pub fn required(mut self, required: bool) -> Self {
		self.required = required;
		self
	}

	pub fn with_default(mut self, default: Option<Value>) -> Self {
		self.default = default;
		self
	}

	pub fn with_description(mut self, description: Option<String>) -> Self {
		self.description = description;
		self
	}
}

/// Insertion-ordered parameter map; keys are sanitized and unique
pub type InputSchema = IndexMap<String, ParamSpec>;

/// Ensure a key matches `^[a-zA-Z0-9_.-]{1,64}$`. Idempotent, so sanitized
/// names survive a second pass unchanged.
pub fn sanitize_key(raw: &str) -> String {
	let replaced: String = raw
		.chars()
		.map(|c| {
			if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-' {
				c
			} else {
				'_'
			}
		})
		.collect();
	let trimmed = replaced.trim_start_matches(['.', '-']);

	let mut collapsed = String::with_capacity(trimmed.len());
	let mut last_underscore = false;
	for c in trimmed.chars() {
		if c == '_' {
			if !last_underscore {
				collapsed.push(c);
			}
			last_underscore = true;
		} else {
			collapsed.push(c);
			last_underscore = false;
		}
	}

	collapsed.truncate(KEY_MAX_LEN);
	if collapsed.is_empty() {
		"param".to_string()
	} else {
		collapsed
	}
}

/// Flatten an operation into its tool input schema. The `connectionId` path
/// parameter never surfaces; the invocation translator injects it.
pub fn generate_input_schema(op: &ParsedOperation) -> InputSchema {
	let mut schema = InputSchema::new();

	for param in &op.parameters {
		if param.name == "connectionId" {
			continue;
		}
		let kind = match param.param_type.as_str() {
			"integer" => ParamKind::Integer,
			"boolean" => ParamKind::Boolean,
			"array" => ParamKind::Array { items: Some(Box::new(ParamKind::String)) },
			_ => match &param.enum_values {
				Some(values) => ParamKind::Enum(values.clone()),
				None => ParamKind::String,
			},
		};
		schema.insert(
			sanitize_key(&param.name),
			ParamSpec::new(kind)
				.required(param.required)
				.with_default(param.default.clone())
				.with_description(param.description.clone()),
		);
	}

	if let Some(body) = &op.request_body {
		for prop in &body.properties {
			if prop.format.as_deref() == Some("binary") {
				continue;
			}
			let kind = match prop.prop_type.as_str() {
				"integer" | "number" => ParamKind::Number,
				"boolean" => ParamKind::Boolean,
				"array" => ParamKind::Array { items: None },
				"object" | JSON_STRING_TYPE => ParamKind::Object,
				_ => match &prop.enum_values {
					Some(values) => ParamKind::Enum(values.clone()),
					None => ParamKind::String,
				},
			};
			let mut key = sanitize_key(&prop.name);
			if schema.contains_key(&key) {
				key = format!("body_{key}");
			}
			schema.insert(
				key,
				ParamSpec::new(kind)
					.required(prop.required)
					.with_default(prop.default.clone())
					.with_description(prop.description.clone()),
			);
		}
	}

	schema
}

/// Render the descriptor map as a JSON-Schema object for the tool protocol
pub fn render_json_schema(schema: &InputSchema) -> Map<String, Value> {
	let mut properties = Map::new();
	let mut required = Vec::new();

	for (name, spec) in schema {
		let mut rendered = match &spec.kind {
			ParamKind::String => json!({"type": "string"}),
			ParamKind::Integer => json!({"type": "integer"}),
			ParamKind::Number => json!({"type": "number"}),
			ParamKind::Boolean => json!({"type": "boolean"}),
			ParamKind::Array { items: Some(items) } => {
				json!({"type": "array", "items": {"type": kind_name(items)}})
			},
			ParamKind::Array { items: None } => json!({"type": "array"}),
			ParamKind::Object => json!({"type": "object"}),
			ParamKind::Enum(values) => json!({"type": "string", "enum": values}),
		};
		if let Some(description) = &spec.description {
			rendered["description"] = json!(description);
		}
		if let Some(default) = &spec.default {
			rendered["default"] = default.clone();
		}
		properties.insert(name.clone(), rendered);
		if spec.required {
			required.push(Value::String(name.clone()));
		}
	}

	let mut out = Map::new();
	out.insert("type".to_string(), json!("object"));
	out.insert("properties".to_string(), Value::Object(properties));
	if !required.is_empty() {
		out.insert("required".to_string(), Value::Array(required));
	}
	out
}

fn kind_name(kind: &ParamKind) -> &'static str {
	match kind {
		ParamKind::String | ParamKind::Enum(_) => "string",
		ParamKind::Integer => "integer",
		ParamKind::Number => "number",
		ParamKind::Boolean => "boolean",
		ParamKind::Array { .. } => "array",
		ParamKind::Object => "object",
	}
}

/// Client-supplied arguments that fail the descriptor map
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
	#[error("missing required parameter '{0}'")]
	MissingRequired(String),

	#[error("parameter '{name}' expects {expected}")]
	TypeMismatch { name: String, expected: &'static str },

	#[error("parameter '{name}' must be one of the declared enum values")]
	NotInEnum { name: String },
}

/// Validate client arguments against a descriptor map, injecting defaults
/// for absent optional parameters. Unknown keys are ignored; the handlers
/// never read them. Returns the validated map in schema order.
pub fn validate_args(
	schema: &InputSchema,
	args: &Map<String, Value>,
) -> Result<IndexMap<String, Value>, ValidationError> {
	let mut validated = IndexMap::new();

	for (name, spec) in schema {
		let value = match args.get(name) {
			Some(v) if !v.is_null() => v.clone(),
			_ => match (&spec.default, spec.required) {
				(Some(default), _) => default.clone(),
				(None, true) => return Err(ValidationError::MissingRequired(name.clone())),
				(None, false) => continue,
			},
		};
		check_kind(name, &spec.kind, &value)?;
		validated.insert(name.clone(), value);
	}

	Ok(validated)
}

fn check_kind(name: &str, kind: &ParamKind, value: &Value) -> Result<(), ValidationError> {
	let mismatch = |expected| {
		Err(ValidationError::TypeMismatch { name: name.to_string(), expected })
	};
	match kind {
		ParamKind::String => {
			if !value.is_string() {
				return mismatch("a string");
			}
		},
		ParamKind::Integer => {
			if !(value.is_i64() || value.is_u64()) {
				return mismatch("an integer");
			}
		},
		ParamKind::Number => {
			if !value.is_number() {
				return mismatch("a number");
			}
		},
		ParamKind::Boolean => {
			if !value.is_boolean() {
				return mismatch("a boolean");
			}
		},
		ParamKind::Array { items } => {
			let Some(elements) = value.as_array() else {
				return mismatch("an array");
			};
			if matches!(items.as_deref(), Some(ParamKind::String))
				&& !elements.iter().all(Value::is_string)
			{
				return mismatch("an array of strings");
			}
		},
		// Object-typed properties also accept a JSON-encoded string
		ParamKind::Object => {
			if !(value.is_object() || value.is_string()) {
				return mismatch("an object or a JSON string");
			}
		},
		ParamKind::Enum(values) => {
			if !values.contains(value) {
				return Err(ValidationError::NotInEnum { name: name.to_string() });
			}
		},
	}
	Ok(())
}
