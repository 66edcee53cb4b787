//! Combined tool catalog across all registered backends.

use futures::stream::{self, StreamExt};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

use overflow_core::{ExclusionSet, Registry, RegistryEntry};

use crate::error::McpError;
use crate::namespace::ToolDescriptor;
use crate::pool::SessionManager;
use crate::types::{ListToolsResult, ToolInfo};

/// A backend that contributed nothing to the catalog, and why.
#[derive(Debug)]
pub struct DiscoveryFailure {
    pub backend: String,
    pub error: McpError,
}

/// Result of one aggregation pass.
#[derive(Debug, Default)]
pub struct Catalog {
    /// Overflow tools in registry order, then backend reply order.
    pub tools: Vec<ToolDescriptor>,
    pub failures: Vec<DiscoveryFailure>,
}

impl Catalog {
    /// The tools as presented upstream.
    pub fn to_list_result(&self) -> ListToolsResult {
        ListToolsResult {
            tools: self.tools.iter().map(ToolDescriptor::to_tool_info).collect(),
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.namespaced_name.as_str()).collect()
    }
}

/// Queries every backend for its tools and merges the answers.
pub struct CatalogAggregator {
    sessions: Arc<SessionManager>,
    max_concurrency: usize,
}

impl CatalogAggregator {
    pub fn new(sessions: Arc<SessionManager>, max_concurrency: usize) -> Self {
        Self {
            sessions,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Discover every backend's tools, namespace them and drop the excluded
    /// names.
    ///
    /// Up to `max_concurrency` backends are queried at once; results are
    /// reassembled in registry order. A failing backend contributes no tools
    /// and is reported in `Catalog::failures`.
    pub async fn list_overflow_tools(&self, registry: &Registry, exclusions: &ExclusionSet) -> Catalog {
        let outcomes: Vec<(String, Result<Vec<ToolDescriptor>, McpError>)> =
            stream::iter(registry.entries())
                .map(|entry| async move { (entry.name.clone(), self.discover(entry).await) })
                .buffered(self.max_concurrency)
                .collect()
                .await;

        let mut catalog = Catalog::default();
        for (backend, outcome) in outcomes {
            match outcome {
                Ok(tools) => {
                    debug!(backend = %backend, count = tools.len(), "Discovered tools");
                    catalog.tools.extend(tools);
                }
                Err(error) => {
                    warn!(backend = %backend, error = %error, "Tool discovery failed");
                    catalog.failures.push(DiscoveryFailure { backend, error });
                }
            }
        }

        let discovered = catalog.tools.len();
        catalog
            .tools
            .retain(|tool| !exclusions.contains(&tool.namespaced_name));

        info!(
            backends = registry.len(),
            failed = catalog.failures.len(),
            discovered = discovered,
            overflow = catalog.tools.len(),
            "Catalog aggregated"
        );
        catalog
    }

    /// List one backend's tools, namespaced but unfiltered.
    pub async fn discover(&self, entry: &RegistryEntry) -> Result<Vec<ToolDescriptor>, McpError> {
        let result = self.sessions.exchange(entry, "tools/list", json!({})).await?;
        let listing: ListToolsResult =
            serde_json::from_value(result).map_err(|e| McpError::Protocol {
                backend: entry.name.clone(),
                reason: format!("malformed tools/list result: {e}"),
            })?;

        Ok(listing
            .tools
            .into_iter()
            .map(|tool: ToolInfo| ToolDescriptor::from_backend(&entry.name, tool))
            .collect())
    }
}
