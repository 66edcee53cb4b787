//! Routes namespaced tool calls to their backend.

use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use overflow_core::Registry;

use crate::error::McpError;
use crate::namespace::split_namespaced;
use crate::pool::SessionManager;

/// Forwards `tools/call` to the backend that owns the tool.
pub struct RequestRouter {
    sessions: Arc<SessionManager>,
}

impl RequestRouter {
    pub fn new(sessions: Arc<SessionManager>) -> Self {
        Self { sessions }
    }

    /// Call `namespaced_name` with `arguments` and return the backend's
    /// result unchanged.
    ///
    /// Name resolution happens before any process is started: a name with
    /// no separator, or with a prefix that is not a registered backend,
    /// fails without spawning anything.
    pub async fn invoke(
        &self,
        registry: &Registry,
        namespaced_name: &str,
        arguments: Value,
    ) -> Result<Value, McpError> {
        let (backend, tool) = split_namespaced(namespaced_name)
            .ok_or_else(|| McpError::UnnamespacedTool(namespaced_name.to_string()))?;
        let entry = registry
            .get(backend)
            .ok_or_else(|| McpError::UnknownBackend(backend.to_string()))?;

        debug!(backend = %backend, tool = %tool, "Routing tool call");

        self.sessions
            .exchange(entry, "tools/call", json!({ "name": tool, "arguments": arguments }))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeBackend, LaunchStats, ScriptedLauncher};
    use overflow_core::RegistryEntry;
    use std::time::Duration;

    fn router(launcher: ScriptedLauncher) -> (RequestRouter, Arc<LaunchStats>) {
        let stats = launcher.stats();
        let sessions = Arc::new(SessionManager::new(Arc::new(launcher), Duration::from_secs(5)));
        (RequestRouter::new(sessions), stats)
    }

    fn registry() -> Registry {
        Registry::from_entries([
            RegistryEntry::new("alpha", "alpha-server"),
            RegistryEntry::new("beta", "beta-server"),
        ])
    }

    #[tokio::test]
    async fn test_forwards_raw_name_and_arguments() {
        let (router, stats) = router(
            ScriptedLauncher::new().with_backend("alpha", FakeBackend::serving(&["write"])),
        );

        let arguments = json!({"path": "/tmp/x"});
        let result = router
            .invoke(&registry(), "alpha_write", arguments.clone())
            .await
            .unwrap();

        let call = stats
            .requests_for("alpha")
            .into_iter()
            .find(|r| r.method == "tools/call")
            .unwrap();
        assert_eq!(
            call.params,
            Some(json!({"name": "write", "arguments": {"path": "/tmp/x"}}))
        );
        assert_eq!(
            result,
            FakeBackend::call_reply("alpha", &json!({"name": "write", "arguments": arguments}))
        );
        assert_eq!(stats.launched(), 1);
        assert_eq!(stats.terminated(), 1);
    }

    #[tokio::test]
    async fn test_raw_name_keeps_later_separators() {
        let (router, stats) = router(
            ScriptedLauncher::new().with_backend("alpha", FakeBackend::serving(&["read_file"])),
        );
        router
            .invoke(&registry(), "alpha_read_file", json!({}))
            .await
            .unwrap();
        let call = stats
            .requests_for("alpha")
            .into_iter()
            .find(|r| r.method == "tools/call")
            .unwrap();
        assert_eq!(call.params.unwrap()["name"], "read_file");
    }

    #[tokio::test]
    async fn test_unnamespaced_name_spawns_nothing() {
        let (router, stats) = router(
            ScriptedLauncher::new().with_backend("alpha", FakeBackend::serving(&["write"])),
        );
        let err = router
            .invoke(&registry(), "write", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::UnnamespacedTool(ref n) if n == "write"));
        assert_eq!(stats.attempts(), 0);
    }

    #[tokio::test]
    async fn test_unknown_backend_spawns_nothing() {
        let (router, stats) = router(
            ScriptedLauncher::new().with_backend("gamma", FakeBackend::serving(&["write"])),
        );
        let err = router
            .invoke(&registry(), "gamma_write", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::UnknownBackend(ref b) if b == "gamma"));
        assert!(err.is_routing());
        assert_eq!(stats.attempts(), 0);
    }

    #[tokio::test]
    async fn test_backend_failures_surface() {
        let (router, stats) = router(
            ScriptedLauncher::new()
                .with_backend("alpha", FakeBackend::RefuseLaunch)
                .with_backend("beta", FakeBackend::HangUp),
        );

        let err = router
            .invoke(&registry(), "alpha_write", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::Launch { .. }));

        let err = router
            .invoke(&registry(), "beta_write", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::Protocol { .. }));
        assert_eq!(stats.live(), 0);
    }
}
