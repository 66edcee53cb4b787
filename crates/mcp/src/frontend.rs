//! Upstream-facing MCP server loop.
//!
//! Reads one envelope per line from the upstream client and writes exactly
//! one reply per request. Lines that do not decode are dropped without a
//! reply, and a failing request becomes an error envelope; neither stops
//! the loop.

use serde_json::Value;
use std::sync::Arc;

use overflow_core::{ExclusionSet, Registry};

use crate::catalog::{Catalog, CatalogAggregator};
use crate::error::McpError;
use crate::pool::SessionManager;
use crate::router::RequestRouter;
use crate::transport::McpTransport;
use crate::types::*;

/// Id used for error replies to requests that carried none.
pub const DEFAULT_ERROR_ID: i64 = 1;

/// Name the aggregator announces to the upstream client.
pub const SERVER_NAME: &str = "mcp-overflow-aggregator";

/// The aggregator as seen by the upstream client.
pub struct ProtocolFrontend {
    registry: Arc<Registry>,
    exclusions: Arc<ExclusionSet>,
    catalog: CatalogAggregator,
    router: RequestRouter,
    server_name: String,
    server_version: String,
}

impl ProtocolFrontend {
    pub fn new(
        registry: Arc<Registry>,
        exclusions: Arc<ExclusionSet>,
        sessions: Arc<SessionManager>,
        max_concurrency: usize,
    ) -> Self {
        Self {
            registry,
            exclusions,
            catalog: CatalogAggregator::new(Arc::clone(&sessions), max_concurrency),
            router: RequestRouter::new(sessions),
            server_name: SERVER_NAME.to_string(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Set the server name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = name.into();
        self
    }

    /// Run the server loop until the transport is closed.
    ///
    /// Only a failure of the transport itself ends the loop early.
    pub async fn run<T: McpTransport>(&self, transport: &mut T) -> Result<(), McpError> {
        tracing::info!(
            server = %self.server_name,
            backends = self.registry.len(),
            "MCP overflow server starting"
        );

        while let Some(line) = transport.receive().await? {
            tracing::debug!(message = %line, "Received message");

            if let Some(response) = self.handle_line(&line).await {
                let json = serde_json::to_string(&response)?;
                tracing::debug!(response = %json, "Sending response");
                transport.send(&json).await?;
            }
        }

        tracing::info!("Transport closed, shutting down");
        Ok(())
    }

    /// Handle one raw input line. Returns the reply to write, if any.
    pub async fn handle_line(&self, line: &str) -> Option<Envelope> {
        let request: Envelope = match serde_json::from_str(line) {
            Ok(req) => req,
            Err(e) => {
                tracing::debug!(error = %e, "Dropping undecodable line");
                return None;
            }
        };

        let method = match request.method.as_deref() {
            Some(method) => method,
            None => {
                tracing::debug!("Dropping message without a method");
                return None;
            }
        };

        if method.starts_with("notifications/") {
            self.handle_notification(method);
            return None;
        }

        Some(self.handle_request(&request).await)
    }

    /// Handle a decoded request and produce its reply.
    pub async fn handle_request(&self, request: &Envelope) -> Envelope {
        let method = request.method.as_deref().unwrap_or_default();

        let outcome = match method {
            "initialize" => self.handle_initialize(),
            "tools/list" => self.handle_list_tools().await,
            "tools/call" => self.handle_call_tool(request.params.as_ref()).await,
            other => Err(McpError::MethodNotFound(other.to_string())),
        };

        match outcome {
            Ok(result) => Envelope::success(request.id.clone(), result),
            Err(err) => {
                tracing::warn!(method = %method, error = %err, "Request failed");
                let rpc = err.to_rpc_error();
                let id = request
                    .id
                    .clone()
                    .unwrap_or(RpcId::Number(DEFAULT_ERROR_ID));
                Envelope::error(Some(id), rpc.code, rpc.message)
            }
        }
    }

    /// Run one aggregation pass.
    pub async fn overflow_catalog(&self) -> Catalog {
        self.catalog
            .list_overflow_tools(&self.registry, &self.exclusions)
            .await
    }

    fn handle_notification(&self, method: &str) {
        match method {
            "notifications/initialized" => {
                tracing::info!("Client confirmed initialization");
            }
            "notifications/cancelled" => {
                tracing::debug!("Client cancelled a request");
            }
            method => {
                tracing::debug!(method = %method, "Unknown notification, ignoring");
            }
        }
    }

    fn handle_initialize(&self) -> Result<Value, McpError> {
        tracing::info!("Handling initialize");

        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability::default()),
                resources: Some(Value::Object(Default::default())),
            },
            server_info: ServerInfo {
                name: self.server_name.clone(),
                version: Some(self.server_version.clone()),
            },
        };
        Ok(serde_json::to_value(result)?)
    }

    async fn handle_list_tools(&self) -> Result<Value, McpError> {
        tracing::debug!("Handling tools/list");
        let catalog = self.overflow_catalog().await;
        Ok(serde_json::to_value(catalog.to_list_result())?)
    }

    async fn handle_call_tool(&self, params: Option<&Value>) -> Result<Value, McpError> {
        let params = params.ok_or_else(|| McpError::InvalidParams("missing params".to_string()))?;
        let call: CallToolParams = serde_json::from_value(params.clone())
            .map_err(|e| McpError::InvalidParams(e.to_string()))?;

        tracing::debug!(tool = %call.name, "Handling tools/call");
        self.router
            .invoke(&self.registry, &call.name, call.arguments)
            .await
    }
}
