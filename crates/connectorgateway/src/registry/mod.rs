// Dynamic tool registry and schema cache
//
// Process-wide state behind narrow interfaces so the coordinator and the
// meta-tools stay unit-testable. The registry is append-mostly; refresh
// clears only the cache.

pub mod lifecycle;

use std::collections::HashMap;
use std::sync::Arc;

use heck::ToSnakeCase;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::Value;
use thiserror::Error;

use crate::arm::ConnectionInfo;
use crate::openapi::{InputSchema, ParsedOperation, sanitize_key};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
	#[error("duplicate tool name: '{0}'")]
	DuplicateToolName(String),
}

/// A registered dynamic tool: the connection and operation it binds, plus
/// the precompiled description and input schema.
#[derive(Debug)]
pub struct DynamicTool {
	pub connection: ConnectionInfo,
	pub operation: ParsedOperation,
	pub description: String,
	pub input_schema: InputSchema,
}

/// Name -> dynamic tool. Insertion order is the registration order, which
/// `list_dynamic_tools` surfaces.
#[derive(Debug, Default)]
pub struct ToolRegistry {
	tools: RwLock<IndexMap<String, Arc<DynamicTool>>>,
}

impl ToolRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// True iff some registered tool name starts with `"<apiName>_"`.
	/// Incremental registration short-circuits on this.
	pub fn has_prefix(&self, api_name: &str) -> bool {
		let prefix = format!("{api_name}_");
		self.tools.read().keys().any(|name| name.starts_with(&prefix))
	}

	/// Insert a tool; an already-taken name is rejected and counted as
	/// skipped by the caller.
	pub fn insert(&self, name: String, tool: DynamicTool) -> Result<(), RegistryError> {
		let mut tools = self.tools.write();
		if tools.contains_key(&name) {
			return Err(RegistryError::DuplicateToolName(name));
		}
		tools.insert(name, Arc::new(tool));
		Ok(())
	}

	pub fn get(&self, name: &str) -> Option<Arc<DynamicTool>> {
		self.tools.read().get(name).cloned()
	}

	/// Iterable copy in registration order
	pub fn snapshot(&self) -> Vec<(String, Arc<DynamicTool>)> {
		self
			.tools
			.read()
			.iter()
			.map(|(name, tool)| (name.clone(), Arc::clone(tool)))
			.collect()
	}

	pub fn len(&self) -> usize {
		self.tools.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.tools.read().is_empty()
	}

	pub fn clear_all(&self) {
		self.tools.write().clear();
	}
}

/// apiName -> raw Swagger document, filled lazily on first fetch and
/// cleared by refresh
#[derive(Debug, Default)]
pub struct SchemaCache {
	docs: RwLock<HashMap<String, Arc<Value>>>,
}

impl SchemaCache {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn get(&self, api_name: &str) -> Option<Arc<Value>> {
		self.docs.read().get(api_name).cloned()
	}

	pub fn put(&self, api_name: impl Into<String>, doc: Arc<Value>) {
		self.docs.write().insert(api_name.into(), doc);
	}

	pub fn clear(&self) {
		self.docs.write().clear();
	}

	pub fn len(&self) -> usize {
		self.docs.read().len()
	}
}

/// `"<apiName>_<snake_operationId>"`, lowercased and clamped to the
/// external naming contract.
pub fn build_tool_name(api_name: &str, operation_id: &str) -> String {
	let name = format!("{}_{}", api_name, operation_id.to_snake_case()).to_lowercase();
	sanitize_key(&name)
}

/// `"[<displayName>] <summary>"`, flagged when the connection still needs
/// user consent.
pub fn compose_description(connection: &ConnectionInfo, operation: &ParsedOperation) -> String {
	let mut description = format!(
		"[{}] {}",
		connection.display_name,
		operation.summary_or_description()
	);
	if !connection.status.is_connected() {
		description.push_str(" ⚠️ Connection not authenticated");
	}
	description
}
