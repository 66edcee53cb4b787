//! JSON-RPC 2.0 and MCP protocol types.
//!
//! Every message on either side of the aggregator is one compact JSON object
//! per line. Requests and replies share a single [`Envelope`] shape;
//! notifications use [`JsonRpcNotification`] so they never carry an id.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ── JSON-RPC 2.0 Base Types ─────────────────────────────────────────

/// One JSON-RPC 2.0 message.
///
/// A request populates `method` (and usually `params`); a reply populates
/// either `result` or `error`. The id is always written, as `null` when a
/// request arrived without one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<RpcId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

fn jsonrpc_version() -> String {
    "2.0".to_string()
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A JSON-RPC 2.0 notification (no id, no response expected).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// JSON-RPC request ID. Can be a number or a string per the spec.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum RpcId {
    Number(i64),
    String(String),
}

// ── Standard JSON-RPC error codes ───────────────────────────────────

/// Standard JSON-RPC 2.0 error codes.
pub mod error_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
}

// ── MCP Initialize ──────────────────────────────────────────────────

/// Parameters the aggregator sends with `initialize` to each backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: String,
    pub capabilities: ClientCapabilities,
    pub client_info: ClientInfo,
}

/// Client capabilities advertised during initialization. Always empty here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientCapabilities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roots: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampling: Option<Value>,
}

/// Information about the connecting client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Result returned to the upstream client from `initialize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    pub capabilities: ServerCapabilities,
    pub server_info: ServerInfo,
}

/// Server capabilities advertised during initialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerCapabilities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Value>,
}

/// Tools capability descriptor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsCapability {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub list_changed: bool,
}

/// Information about the MCP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

// ── MCP tools/list ──────────────────────────────────────────────────

/// Result of `tools/list`, both as read from backends and as sent upstream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListToolsResult {
    #[serde(default)]
    pub tools: Vec<ToolInfo>,
}

/// Describes a single tool in MCP format.
///
/// Fields other than the three below (annotations, output schemas, ...)
/// are kept in `extra` and passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub input_schema: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ── MCP tools/call ──────────────────────────────────────────────────

/// Parameters for `tools/call`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolParams {
    pub name: String,
    #[serde(default = "empty_arguments")]
    pub arguments: Value,
}

fn empty_arguments() -> Value {
    Value::Object(Map::new())
}

// ── Helpers ─────────────────────────────────────────────────────────

impl Envelope {
    /// Create a new JSON-RPC 2.0 request.
    pub fn request(id: RpcId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            id: Some(id),
            method: Some(method.into()),
            params,
            result: None,
            error: None,
        }
    }

    /// Create a successful response.
    pub fn success(id: Option<RpcId>, result: Value) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            id,
            method: None,
            params: None,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(id: Option<RpcId>, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            id,
            method: None,
            params: None,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    pub fn is_request(&self) -> bool {
        self.method.is_some()
    }
}

impl JsonRpcNotification {
    /// Create a new JSON-RPC 2.0 notification.
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            method: method.into(),
            params,
        }
    }
}

// ── MCP Protocol version ────────────────────────────────────────────

/// The MCP protocol version this crate speaks, both upstream and to backends.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_shape() {
        let req = Envelope::request(RpcId::Number(2), "tools/list", Some(json!({})));
        let line = serde_json::to_string(&req).unwrap();
        assert_eq!(
            line,
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/list","params":{}}"#
        );
    }

    #[test]
    fn test_success_keeps_null_id() {
        let resp = Envelope::success(None, json!({"ok": true}));
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value, json!({"jsonrpc": "2.0", "id": null, "result": {"ok": true}}));
    }

    #[test]
    fn test_error_wire_shape() {
        let resp = Envelope::error(
            Some(RpcId::String("abc".to_string())),
            error_codes::INTERNAL_ERROR,
            "boom",
        );
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(
            value,
            json!({"jsonrpc": "2.0", "id": "abc", "error": {"code": -32603, "message": "boom"}})
        );
    }

    #[test]
    fn test_decode_request_without_id() {
        let env: Envelope = serde_json::from_str(r#"{"jsonrpc":"2.0","method":"initialize"}"#).unwrap();
        assert!(env.id.is_none());
        assert!(env.is_request());
        assert_eq!(env.method.as_deref(), Some("initialize"));
    }

    #[test]
    fn test_decode_reply() {
        let env: Envelope =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"result":{"tools":[]}}"#).unwrap();
        assert!(!env.is_request());
        assert_eq!(env.id, Some(RpcId::Number(1)));
        assert_eq!(env.result, Some(json!({"tools": []})));
    }

    #[test]
    fn test_decode_rejects_non_objects() {
        assert!(serde_json::from_str::<Envelope>("not json").is_err());
        assert!(serde_json::from_str::<Envelope>("[1, 2]").is_err());
        assert!(serde_json::from_str::<Envelope>("42").is_err());
    }

    #[test]
    fn test_notification_has_no_id() {
        let notif = JsonRpcNotification::new("notifications/initialized", None);
        let value = serde_json::to_value(&notif).unwrap();
        assert_eq!(value, json!({"jsonrpc": "2.0", "method": "notifications/initialized"}));
    }

    #[test]
    fn test_rpc_id_forms() {
        assert_eq!(serde_json::to_string(&RpcId::Number(42)).unwrap(), "42");
        assert_eq!(
            serde_json::from_str::<RpcId>("\"req-1\"").unwrap(),
            RpcId::String("req-1".to_string())
        );
    }

    #[test]
    fn test_tool_info_keeps_unknown_fields() {
        let raw = json!({
            "name": "read",
            "description": "Read a file",
            "inputSchema": {"type": "object"},
            "annotations": {"readOnlyHint": true}
        });
        let info: ToolInfo = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(info.name, "read");
        assert_eq!(info.extra["annotations"], json!({"readOnlyHint": true}));
        assert_eq!(serde_json::to_value(&info).unwrap(), raw);
    }

    #[test]
    fn test_tool_info_minimal() {
        let info: ToolInfo = serde_json::from_value(json!({"name": "ping"})).unwrap();
        assert!(info.description.is_none());
        assert!(info.input_schema.is_null());
        assert_eq!(serde_json::to_value(&info).unwrap(), json!({"name": "ping"}));
    }

    #[test]
    fn test_list_tools_result_missing_tools() {
        let result: ListToolsResult = serde_json::from_value(json!({})).unwrap();
        assert!(result.tools.is_empty());
    }

    #[test]
    fn test_call_params_default_arguments() {
        let params: CallToolParams = serde_json::from_value(json!({"name": "alpha_write"})).unwrap();
        assert_eq!(params.arguments, json!({}));
    }

    #[test]
    fn test_initialize_result_capabilities() {
        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability::default()),
                resources: Some(json!({})),
            },
            server_info: ServerInfo {
                name: "mcp-overflow-aggregator".to_string(),
                version: Some("1.0.0".to_string()),
            },
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["capabilities"], json!({"tools": {}, "resources": {}}));
        assert_eq!(value["serverInfo"]["name"], "mcp-overflow-aggregator");
        assert_eq!(value["protocolVersion"], PROTOCOL_VERSION);
    }
}
