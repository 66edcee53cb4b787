//! MCP overflow aggregation.
//!
//! Presents the tools of many stdio MCP backends to one upstream client as
//! a single catalog, renaming each tool to `<backend>_<tool>` and routing
//! calls back to the backend that owns it.
//!
//! # Architecture
//!
//! - **types**: JSON-RPC 2.0 and MCP-specific protocol types
//! - **transport**: Line-framed transports (stdio, child pipes, channels)
//! - **backend**: Launching backends and running exchanges against them
//! - **pool**: Per-call or pooled session handling
//! - **namespace**: Backend-qualified tool names
//! - **catalog**: Concurrent discovery and exclusion filtering
//! - **router**: Forwarding `tools/call` to the owning backend
//! - **frontend**: The upstream-facing server loop
//! - **error**: Unified error types
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use overflow_core::{ExclusionSet, Registry, Settings};
//! use overflow_mcp::{ProcessLauncher, ProtocolFrontend, SessionManager, StdioTransport};
//!
//! # async fn example() {
//! let settings = Settings::default();
//! let registry = Registry::load(&settings.registry_path).unwrap();
//! let launcher = Arc::new(ProcessLauncher::new(settings.shutdown_grace));
//! let sessions = Arc::new(SessionManager::from_settings(launcher, &settings));
//! let frontend = ProtocolFrontend::new(
//!     Arc::new(registry),
//!     Arc::new(ExclusionSet::direct_defaults()),
//!     sessions,
//!     settings.max_concurrency,
//! );
//! let mut transport = StdioTransport::stdio();
//! frontend.run(&mut transport).await.unwrap();
//! # }
//! ```

pub mod types;
pub mod transport;
pub mod error;
pub mod backend;
pub mod pool;
pub mod namespace;
pub mod catalog;
pub mod router;
pub mod frontend;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use types::*;
pub use transport::{ChannelTransport, LineTransport, McpTransport, StdioTransport};
pub use error::McpError;
pub use backend::{BackendLink, BackendSession, Launcher, ProcessLauncher};
pub use pool::SessionManager;
pub use namespace::{namespaced, split_namespaced, ToolDescriptor};
pub use catalog::{Catalog, CatalogAggregator, DiscoveryFailure};
pub use router::RequestRouter;
pub use frontend::ProtocolFrontend;
