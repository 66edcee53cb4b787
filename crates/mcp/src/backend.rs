//! Backend process launching and per-operation sessions.
//!
//! A `Launcher` turns a registry entry into a live `BackendLink` (a running
//! process plus its stdio). A `BackendSession` wraps one link, performs the
//! MCP handshake and request/response round trips, and is consumed by
//! `close()`, so it cannot be closed twice.

use async_trait::async_trait;
use serde_json::Value;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

use overflow_core::RegistryEntry;

use crate::error::McpError;
use crate::transport::{LineTransport, McpTransport};
use crate::types::*;

/// Client name announced to every backend during `initialize`.
pub const CLIENT_NAME: &str = "mcp-overflow-aggregator";

/// A running backend reachable over a line transport.
#[async_trait]
pub trait BackendLink: McpTransport {
    /// Ask the process to exit and wait until it is gone.
    async fn terminate(&mut self) -> Result<(), McpError>;

    /// Whether the process is still running with its pipes open.
    fn is_alive(&mut self) -> bool;
}

/// Starts backend processes.
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self, entry: &RegistryEntry) -> Result<Box<dyn BackendLink>, McpError>;
}

// ── Child process launcher ──────────────────────────────────────────

/// Launches backends as child processes with piped stdin/stdout.
///
/// Backend stderr is inherited so its diagnostics land next to ours.
pub struct ProcessLauncher {
    shutdown_grace: Duration,
}

impl ProcessLauncher {
    pub fn new(shutdown_grace: Duration) -> Self {
        Self { shutdown_grace }
    }
}

impl Default for ProcessLauncher {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl Launcher for ProcessLauncher {
    async fn launch(&self, entry: &RegistryEntry) -> Result<Box<dyn BackendLink>, McpError> {
        info!(backend = %entry.name, command = %entry.command, "Spawning backend process");

        let mut child = Command::new(&entry.command)
            .args(&entry.args)
            .envs(&entry.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| McpError::Launch {
                backend: entry.name.clone(),
                reason: e.to_string(),
            })?;

        let stdin = child.stdin.take().ok_or_else(|| McpError::Launch {
            backend: entry.name.clone(),
            reason: "failed to capture backend stdin".to_string(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| McpError::Launch {
            backend: entry.name.clone(),
            reason: "failed to capture backend stdout".to_string(),
        })?;

        Ok(Box::new(ProcessLink {
            backend: entry.name.clone(),
            child,
            transport: Some(LineTransport::new(stdout, stdin)),
            shutdown_grace: self.shutdown_grace,
        }))
    }
}

/// A spawned child process and its pipes.
///
/// The child is killed if the link is dropped without `terminate`.
pub struct ProcessLink {
    backend: String,
    child: Child,
    transport: Option<LineTransport<ChildStdout, ChildStdin>>,
    shutdown_grace: Duration,
}

impl ProcessLink {
    fn pipes(&mut self) -> Result<&mut LineTransport<ChildStdout, ChildStdin>, McpError> {
        self.transport.as_mut().ok_or_else(|| McpError::Protocol {
            backend: self.backend.clone(),
            reason: "backend pipes already closed".to_string(),
        })
    }
}

#[async_trait]
impl McpTransport for ProcessLink {
    async fn receive(&mut self) -> Result<Option<String>, McpError> {
        self.pipes()?.receive().await
    }

    async fn send(&mut self, message: &str) -> Result<(), McpError> {
        self.pipes()?.send(message).await
    }
}

#[async_trait]
impl BackendLink for ProcessLink {
    async fn terminate(&mut self) -> Result<(), McpError> {
        // Closing stdin is the stdio server's cue to exit.
        self.transport = None;

        match tokio::time::timeout(self.shutdown_grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                debug!(backend = %self.backend, %status, "Backend exited");
                Ok(())
            }
            Ok(Err(e)) => {
                if let Err(kill_err) = self.child.kill().await {
                    warn!(backend = %self.backend, error = %kill_err, "Failed to kill backend");
                }
                Err(McpError::Transport(e))
            }
            Err(_) => {
                warn!(
                    backend = %self.backend,
                    grace_secs = self.shutdown_grace.as_secs(),
                    "Backend ignored shutdown, killing"
                );
                self.child.kill().await?;
                Ok(())
            }
        }
    }

    fn is_alive(&mut self) -> bool {
        self.transport.is_some() && matches!(self.child.try_wait(), Ok(None))
    }
}

// ── Session ─────────────────────────────────────────────────────────

/// Exclusive ownership of one backend process.
pub struct BackendSession {
    backend: String,
    link: Box<dyn BackendLink>,
    next_id: i64,
    timeout: Duration,
    handshaken: bool,
    undelivered: bool,
}

impl BackendSession {
    /// Launch the backend described by `entry`.
    ///
    /// Every exchange on the returned session is bounded by `timeout`.
    pub async fn open(
        launcher: &dyn Launcher,
        entry: &RegistryEntry,
        timeout: Duration,
    ) -> Result<Self, McpError> {
        let link = launcher.launch(entry).await?;
        Ok(Self {
            backend: entry.name.clone(),
            link,
            next_id: 1,
            timeout,
            handshaken: false,
            undelivered: false,
        })
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn is_handshaken(&self) -> bool {
        self.handshaken
    }

    /// Whether the backend process is still there to talk to.
    pub fn is_alive(&mut self) -> bool {
        self.link.is_alive()
    }

    /// Whether the last failed request never reached the backend, so the
    /// backend cannot have acted on it.
    pub fn request_undelivered(&self) -> bool {
        self.undelivered
    }

    /// Perform the MCP initialization handshake.
    ///
    /// The reply only has to decode as an envelope; its contents are not
    /// inspected. The `initialized` notification follows.
    pub async fn handshake(&mut self) -> Result<(), McpError> {
        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ClientCapabilities::default(),
            client_info: ClientInfo {
                name: CLIENT_NAME.to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            },
        };

        self.round_trip("initialize", Some(serde_json::to_value(params)?))
            .await?;

        let notif = JsonRpcNotification::new("notifications/initialized", None);
        let line = serde_json::to_string(&notif)?;
        self.link
            .send(&line)
            .await
            .map_err(|e| self.attribute(e))?;

        self.handshaken = true;
        debug!(backend = %self.backend, "Backend handshake complete");
        Ok(())
    }

    /// Send one request and return the `result` of the single reply line.
    pub async fn exchange(&mut self, method: &str, params: Value) -> Result<Value, McpError> {
        let id = RpcId::Number(self.next_id);
        let reply = self.round_trip(method, Some(params)).await?;

        if let Some(err) = reply.error {
            return Err(McpError::Backend {
                backend: self.backend.clone(),
                code: err.code,
                message: err.message,
            });
        }

        if reply.id.as_ref() != Some(&id) {
            let got = match (&reply.method, &reply.id) {
                (Some(other), _) => format!("a '{other}' message"),
                (None, Some(other)) => format!("a reply to request {}", describe_id(other)),
                (None, None) => "a reply without an id".to_string(),
            };
            return Err(McpError::Protocol {
                backend: self.backend.clone(),
                reason: format!("expected reply to request {}, got {got}", describe_id(&id)),
            });
        }

        reply.result.ok_or_else(|| McpError::Protocol {
            backend: self.backend.clone(),
            reason: "response carried neither result nor error".to_string(),
        })
    }

    /// Terminate the backend process. Consumes the session.
    pub async fn close(mut self) {
        if let Err(e) = self.link.terminate().await {
            warn!(backend = %self.backend, error = %e, "Failed to terminate backend cleanly");
        }
    }

    async fn round_trip(&mut self, method: &str, params: Option<Value>) -> Result<Envelope, McpError> {
        let id = self.next_id;
        self.next_id += 1;

        let request = Envelope::request(RpcId::Number(id), method, params);
        let line = serde_json::to_string(&request)?;
        debug!(backend = %self.backend, method = %method, id = id, "Sending request");

        let timeout = self.timeout;
        self.undelivered = false;
        let outcome = {
            let link = &mut self.link;
            tokio::time::timeout(timeout, async move {
                // `false` marks a request that was never written.
                match link.send(&line).await {
                    Ok(()) => link.receive().await.map_err(|e| (true, e)),
                    Err(e) => Err((false, e)),
                }
            })
            .await
        };
        let received = match outcome {
            Ok(Ok(received)) => received,
            Ok(Err((delivered, e))) => {
                self.undelivered = !delivered;
                return Err(self.attribute(e));
            }
            Err(_) => {
                warn!(backend = %self.backend, method = %method, "Backend exchange timed out");
                return Err(McpError::Timeout {
                    backend: self.backend.clone(),
                    after: timeout,
                });
            }
        };

        let line = received.ok_or_else(|| McpError::Protocol {
            backend: self.backend.clone(),
            reason: "no response (backend closed its output)".to_string(),
        })?;

        serde_json::from_str(&line).map_err(|e| McpError::Protocol {
            backend: self.backend.clone(),
            reason: format!("malformed response line: {e}"),
        })
    }

    /// Pin stream failures on this backend.
    fn attribute(&self, err: McpError) -> McpError {
        match err {
            McpError::Transport(e) => McpError::Protocol {
                backend: self.backend.clone(),
                reason: format!("stream failure: {e}"),
            },
            other => other,
        }
    }
}

fn describe_id(id: &RpcId) -> String {
    match id {
        RpcId::Number(n) => n.to_string(),
        RpcId::String(s) => format!("\"{s}\""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeBackend, ScriptedLauncher};
    use serde_json::json;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn entry(name: &str) -> RegistryEntry {
        RegistryEntry::new(name, format!("{name}-server"))
    }

    #[tokio::test]
    async fn test_handshake_then_list() {
        let launcher = ScriptedLauncher::new()
            .with_backend("alpha", FakeBackend::serving(&["read", "write"]));

        let mut session = BackendSession::open(&launcher, &entry("alpha"), TIMEOUT)
            .await
            .unwrap();
        assert!(!session.is_handshaken());
        session.handshake().await.unwrap();
        assert!(session.is_handshaken());

        let result = session.exchange("tools/list", json!({})).await.unwrap();
        let names: Vec<&str> = result["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["read", "write"]);
        session.close().await;

        let methods = launcher.stats().methods_for("alpha");
        assert_eq!(methods, vec!["initialize", "notifications/initialized", "tools/list"]);
        assert_eq!(launcher.stats().launched(), 1);
        assert_eq!(launcher.stats().terminated(), 1);
    }

    #[tokio::test]
    async fn test_initialize_params_sent() {
        let launcher = ScriptedLauncher::new().with_backend("alpha", FakeBackend::serving(&[]));
        let mut session = BackendSession::open(&launcher, &entry("alpha"), TIMEOUT)
            .await
            .unwrap();
        session.handshake().await.unwrap();
        session.close().await;

        let init = launcher.stats().requests_for("alpha").remove(0);
        let params = init.params.unwrap();
        assert_eq!(params["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(params["capabilities"], json!({}));
        assert_eq!(params["clientInfo"]["name"], CLIENT_NAME);
    }

    #[tokio::test]
    async fn test_launch_failure() {
        let launcher = ScriptedLauncher::new().with_backend("alpha", FakeBackend::RefuseLaunch);
        let err = BackendSession::open(&launcher, &entry("alpha"), TIMEOUT)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, McpError::Launch { .. }));
        assert_eq!(launcher.stats().launched(), 0);
    }

    #[tokio::test]
    async fn test_closed_output_is_protocol_error() {
        let launcher = ScriptedLauncher::new().with_backend("beta", FakeBackend::HangUp);
        let mut session = BackendSession::open(&launcher, &entry("beta"), TIMEOUT)
            .await
            .unwrap();
        let err = session.handshake().await.unwrap_err();
        assert!(matches!(err, McpError::Protocol { .. }), "got {err:?}");
        session.close().await;
        assert_eq!(launcher.stats().terminated(), 1);
    }

    #[tokio::test]
    async fn test_malformed_reply_is_protocol_error() {
        let launcher = ScriptedLauncher::new().with_backend("gamma", FakeBackend::Garbage);
        let mut session = BackendSession::open(&launcher, &entry("gamma"), TIMEOUT)
            .await
            .unwrap();
        session.handshake().await.unwrap();
        let err = session.exchange("tools/list", json!({})).await.unwrap_err();
        match err {
            McpError::Protocol { backend, reason } => {
                assert_eq!(backend, "gamma");
                assert!(reason.contains("malformed"));
            }
            other => panic!("expected Protocol, got {other:?}"),
        }
        session.close().await;
    }

    #[tokio::test]
    async fn test_error_reply_surfaces_backend_error() {
        let launcher = ScriptedLauncher::new().with_backend(
            "delta",
            FakeBackend::Rejecting {
                code: -32601,
                message: "Method not found".to_string(),
            },
        );
        let mut session = BackendSession::open(&launcher, &entry("delta"), TIMEOUT)
            .await
            .unwrap();
        session.handshake().await.unwrap();
        let err = session.exchange("tools/list", json!({})).await.unwrap_err();
        match err {
            McpError::Backend { code, message, .. } => {
                assert_eq!(code, -32601);
                assert_eq!(message, "Method not found");
            }
            other => panic!("expected Backend, got {other:?}"),
        }
        session.close().await;
    }

    #[tokio::test]
    async fn test_notification_instead_of_reply_is_protocol_error() {
        let launcher = ScriptedLauncher::new().with_backend("chatty", FakeBackend::Chatty);
        let mut session = BackendSession::open(&launcher, &entry("chatty"), TIMEOUT)
            .await
            .unwrap();
        session.handshake().await.unwrap();
        let err = session.exchange("tools/list", json!({})).await.unwrap_err();
        match err {
            McpError::Protocol { backend, reason } => {
                assert_eq!(backend, "chatty");
                assert!(reason.contains("expected reply to request 2"), "{reason}");
                assert!(reason.contains("notifications/message"), "{reason}");
            }
            other => panic!("expected Protocol, got {other:?}"),
        }
        assert!(!session.request_undelivered());
        session.close().await;
    }

    #[tokio::test]
    async fn test_send_to_exited_backend_is_undelivered() {
        let launcher = ScriptedLauncher::new()
            .with_backend("alpha", FakeBackend::serving_then_exit(&["x"], 1));
        let mut session = BackendSession::open(&launcher, &entry("alpha"), TIMEOUT)
            .await
            .unwrap();
        session.handshake().await.unwrap();
        assert!(session.is_alive());

        session.exchange("tools/list", json!({})).await.unwrap();
        assert!(!session.is_alive());

        let err = session.exchange("tools/list", json!({})).await.unwrap_err();
        assert!(matches!(err, McpError::Protocol { .. }), "got {err:?}");
        assert!(session.request_undelivered());
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_backend_times_out() {
        let launcher = ScriptedLauncher::new().with_backend("mute", FakeBackend::Silent);
        let mut session = BackendSession::open(&launcher, &entry("mute"), Duration::from_secs(2))
            .await
            .unwrap();
        let err = session.handshake().await.unwrap_err();
        match err {
            McpError::Timeout { backend, after } => {
                assert_eq!(backend, "mute");
                assert_eq!(after, Duration::from_secs(2));
            }
            other => panic!("expected Timeout, got {other:?}"),
        }
        session.close().await;
        assert_eq!(launcher.stats().terminated(), 1);
    }

    #[tokio::test]
    async fn test_request_ids_increase() {
        let launcher = ScriptedLauncher::new().with_backend("alpha", FakeBackend::serving(&["x"]));
        let mut session = BackendSession::open(&launcher, &entry("alpha"), TIMEOUT)
            .await
            .unwrap();
        session.handshake().await.unwrap();
        session.exchange("tools/list", json!({})).await.unwrap();
        session.exchange("tools/list", json!({})).await.unwrap();
        session.close().await;

        let ids: Vec<Option<RpcId>> = launcher
            .stats()
            .requests_for("alpha")
            .into_iter()
            .filter(|r| r.method != "notifications/initialized")
            .map(|r| r.id)
            .collect();
        assert_eq!(
            ids,
            vec![
                Some(RpcId::Number(1)),
                Some(RpcId::Number(2)),
                Some(RpcId::Number(3))
            ]
        );
    }
}
