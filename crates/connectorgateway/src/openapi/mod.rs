// Swagger 2.0 compilation: parse, filter, and turn operations into typed
// tool input schemas

pub mod filter;
pub mod parser;
pub mod schema;
pub mod types;

pub use filter::filter_operations;
pub use parser::parse_document;
pub use schema::{
	InputSchema, ParamKind, ParamSpec, ValidationError, generate_input_schema, render_json_schema,
	sanitize_key, validate_args,
};
pub use types::{
	ApiAnnotation, DynamicValuesRef, JSON_STRING_TYPE, Method, ParamLocation, ParsedBodyProperty,
	ParsedOperation, ParsedParameter, RequestBody, Visibility,
};
