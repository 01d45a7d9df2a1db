// Domain model for operations compiled out of a connector's Swagger 2.0 document

use serde_json::Value;

/// Synthetic type assigned to flattened object properties. The runtime accepts
/// either a parsed object or a JSON-encoded string for these.
pub const JSON_STRING_TYPE: &str = "string (JSON)";

/// HTTP methods surfaced by connector documents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
	Get,
	Post,
	Put,
	Patch,
	Delete,
}

impl Method {
	/// Parse a Swagger path-item key. Anything other than the five supported
	/// verbs (e.g. `parameters`, `x-ms-*` siblings) returns None.
	pub fn parse(s: &str) -> Option<Self> {
		match s {
			"get" => Some(Self::Get),
			"post" => Some(Self::Post),
			"put" => Some(Self::Put),
			"patch" => Some(Self::Patch),
			"delete" => Some(Self::Delete),
			_ => None,
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Get => "get",
			Self::Post => "post",
			Self::Put => "put",
			Self::Patch => "patch",
			Self::Delete => "delete",
		}
	}

	/// Uppercase form used in the dynamicInvoke envelope
	pub fn as_upper(&self) -> &'static str {
		match self {
			Self::Get => "GET",
			Self::Post => "POST",
			Self::Put => "PUT",
			Self::Patch => "PATCH",
			Self::Delete => "DELETE",
		}
	}

	/// Whether ARM accepts a request body for this method
	pub fn allows_body(&self) -> bool {
		matches!(self, Self::Post | Self::Put)
	}
}

/// `x-ms-visibility` values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
	#[default]
	None,
	Important,
	Advanced,
	Internal,
}

impl Visibility {
	/// Unknown strings fall back to `None`, matching how connectors treat
	/// absent visibility.
	pub fn parse(s: Option<&str>) -> Self {
		match s {
			Some("important") => Self::Important,
			Some("advanced") => Self::Advanced,
			Some("internal") => Self::Internal,
			_ => Self::None,
		}
	}
}

/// Where a non-body parameter is carried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamLocation {
	Path,
	Query,
	Header,
}

impl ParamLocation {
	pub fn parse(s: &str) -> Option<Self> {
		match s {
			"path" => Some(Self::Path),
			"query" => Some(Self::Query),
			"header" => Some(Self::Header),
			_ => None,
		}
	}
}

/// `x-ms-api-annotation`: groups evolving revisions of one logical action
#[derive(Debug, Clone, PartialEq)]
pub struct ApiAnnotation {
	pub family: Option<String>,
	pub revision: i64,
	pub status: Option<String>,
}

/// `x-ms-dynamic-values` hint: the operation to call for value suggestions
/// and the response fields holding the collection/value/title.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicValuesRef {
	pub operation_id: Option<String>,
	pub value_collection: Option<String>,
	pub value_path: Option<String>,
	pub value_title: Option<String>,
	/// Nested parameter map forwarded verbatim
	pub parameters: Option<Value>,
}

/// A path, query, or header parameter of a parsed operation
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedParameter {
	pub name: String,
	pub location: ParamLocation,
	pub param_type: String,
	pub format: Option<String>,
	pub required: bool,
	pub description: Option<String>,
	pub default: Option<Value>,
	pub enum_values: Option<Vec<Value>>,
	pub dynamic_values: Option<DynamicValuesRef>,
}

/// One flattened top-level property of a request body schema
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedBodyProperty {
	pub name: String,
	pub prop_type: String,
	pub format: Option<String>,
	pub description: Option<String>,
	pub required: bool,
	pub visibility: Visibility,
	pub enum_values: Option<Vec<Value>>,
	pub default: Option<Value>,
}

/// Flattened request body. Properties keep document order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RequestBody {
	pub required: bool,
	pub required_fields: Vec<String>,
	pub properties: Vec<ParsedBodyProperty>,
}

/// Result of compiling one (path, method) pair out of a Swagger document
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedOperation {
	pub operation_id: String,
	pub method: Method,
	/// Templated path, beginning with `/{connectionId}`
	pub path: String,
	pub summary: Option<String>,
	pub description: Option<String>,
	pub deprecated: bool,
	pub visibility: Visibility,
	pub is_trigger: bool,
	pub api_annotation: Option<ApiAnnotation>,
	pub parameters: Vec<ParsedParameter>,
	pub request_body: Option<RequestBody>,
	/// Resolved 200/201 response schema, informational only
	pub response_schema: Option<Value>,
}

impl ParsedOperation {
	/// Summary, falling back to description, for tool descriptions
	pub fn summary_or_description(&self) -> &str {
		self
			.summary
			.as_deref()
			.filter(|s| !s.is_empty())
			.or(self.description.as_deref())
			.unwrap_or_default()
	}
}
