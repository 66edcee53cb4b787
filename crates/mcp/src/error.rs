//! Error types for the MCP crate.

use std::time::Duration;

use crate::types::{error_codes, JsonRpcError};

/// Errors that can occur while talking to the upstream client or a backend.
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    /// Failed to parse or produce JSON.
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Transport I/O error.
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The requested method is not supported.
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// Invalid parameters for a method.
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// The backend process could not be started.
    #[error("Failed to launch backend '{backend}': {reason}")]
    Launch { backend: String, reason: String },

    /// The backend's reply was missing or unreadable.
    #[error("Protocol error from backend '{backend}': {reason}")]
    Protocol { backend: String, reason: String },

    /// The backend answered with a JSON-RPC error object.
    #[error("Backend '{backend}' returned error {code}: {message}")]
    Backend {
        backend: String,
        code: i64,
        message: String,
    },

    /// The backend did not answer before the exchange deadline.
    #[error("Backend '{backend}' did not respond within {}s", .after.as_secs_f64())]
    Timeout { backend: String, after: Duration },

    /// Tool name has no backend prefix.
    #[error("Invalid tool name: {0}")]
    UnnamespacedTool(String),

    /// Tool name prefix does not match any registered backend.
    #[error("Server {0} not found")]
    UnknownBackend(String),
}

impl McpError {
    /// Whether this error came from resolving a tool name, before any
    /// backend was contacted.
    pub fn is_routing(&self) -> bool {
        matches!(self, McpError::UnnamespacedTool(_) | McpError::UnknownBackend(_))
    }

    /// The backend this error is attributed to, if any.
    pub fn backend(&self) -> Option<&str> {
        match self {
            McpError::Launch { backend, .. }
            | McpError::Protocol { backend, .. }
            | McpError::Backend { backend, .. }
            | McpError::Timeout { backend, .. } => Some(backend),
            _ => None,
        }
    }

    /// Convert to a JSON-RPC error object for the upstream client.
    ///
    /// Everything except an unknown method is reported as an internal error.
    pub fn to_rpc_error(&self) -> JsonRpcError {
        let code = match self {
            McpError::MethodNotFound(_) => error_codes::METHOD_NOT_FOUND,
            _ => error_codes::INTERNAL_ERROR,
        };
        JsonRpcError {
            code,
            message: self.to_string(),
            data: None,
        }
    }
}
