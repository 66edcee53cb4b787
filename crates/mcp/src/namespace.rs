//! Backend-qualified tool names.

use serde_json::{Map, Value};

use overflow_core::NAMESPACE_SEPARATOR;

use crate::types::ToolInfo;

/// `<backend>_<tool>`.
pub fn namespaced(backend: &str, raw_name: &str) -> String {
    format!("{backend}{NAMESPACE_SEPARATOR}{raw_name}")
}

/// Split at the first separator into `(backend, tool)`.
pub fn split_namespaced(name: &str) -> Option<(&str, &str)> {
    name.split_once(NAMESPACE_SEPARATOR)
}

/// A tool discovered on one backend, renamed for the combined catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    pub namespaced_name: String,
    pub backend: String,
    pub raw_name: String,
    pub description: Option<String>,
    pub input_schema: Value,
    /// Fields the backend reported beyond name, description and schema.
    pub extra: Map<String, Value>,
}

impl ToolDescriptor {
    pub fn from_backend(backend: &str, tool: ToolInfo) -> Self {
        Self {
            namespaced_name: namespaced(backend, &tool.name),
            backend: backend.to_string(),
            raw_name: tool.name,
            description: tool.description,
            input_schema: tool.input_schema,
            extra: tool.extra,
        }
    }

    /// The descriptor as presented upstream, under its namespaced name.
    pub fn to_tool_info(&self) -> ToolInfo {
        ToolInfo {
            name: self.namespaced_name.clone(),
            description: self.description.clone(),
            input_schema: self.input_schema.clone(),
            extra: self.extra.clone(),
        }
    }
}
