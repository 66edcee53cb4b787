//! In-memory backends for tests.
//!
//! `ScriptedLauncher` hands out channel-backed links whose other end is a
//! small task that plays a scripted MCP server. Every launch, termination
//! and received request is recorded in `LaunchStats`.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use overflow_core::RegistryEntry;

use crate::backend::{BackendLink, Launcher};
use crate::error::McpError;
use crate::transport::{ChannelTransport, McpTransport};
use crate::types::{Envelope, RpcId, PROTOCOL_VERSION};

/// How a scripted backend behaves.
#[derive(Debug, Clone)]
pub enum FakeBackend {
    /// Answers the handshake, lists `tools`, and answers every call.
    /// With `replies` set, exits after that many answers past the handshake.
    Serve { tools: Vec<Value>, replies: Option<usize> },
    /// The process cannot be started.
    RefuseLaunch,
    /// Starts, then exits before answering anything.
    HangUp,
    /// Answers the handshake, then writes a non-JSON line for every request.
    Garbage,
    /// Answers the handshake, then replies with a JSON-RPC error.
    Rejecting { code: i64, message: String },
    /// Reads requests and never answers.
    Silent,
    /// Answers the handshake, then writes a log notification ahead of
    /// every reply.
    Chatty,
}

impl FakeBackend {
    /// A serving backend with minimal tool descriptors for `names`.
    pub fn serving(names: &[&str]) -> Self {
        let tools = names
            .iter()
            .map(|name| {
                json!({
                    "name": name,
                    "description": format!("{name} tool"),
                    "inputSchema": {"type": "object"}
                })
            })
            .collect();
        FakeBackend::Serve { tools, replies: None }
    }

    /// Like `serving`, but the process exits after `replies` answers.
    pub fn serving_then_exit(names: &[&str], replies: usize) -> Self {
        match Self::serving(names) {
            FakeBackend::Serve { tools, .. } => FakeBackend::Serve {
                tools,
                replies: Some(replies),
            },
            other => other,
        }
    }

    /// The reply a serving backend gives to `tools/call`.
    pub fn call_reply(backend: &str, params: &Value) -> Value {
        let name = params.get("name").and_then(Value::as_str).unwrap_or_default();
        json!({
            "content": [{"type": "text", "text": format!("{name} handled by {backend}")}],
            "echo": params.get("arguments").cloned().unwrap_or(Value::Null),
        })
    }
}

/// A request as seen by a scripted backend.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub backend: String,
    pub id: Option<RpcId>,
    pub method: String,
    pub params: Option<Value>,
}

/// Counters shared between a launcher, its links and their fake servers.
#[derive(Debug, Default)]
pub struct LaunchStats {
    attempts: AtomicUsize,
    launched: AtomicUsize,
    terminated: AtomicUsize,
    leaked: AtomicUsize,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl LaunchStats {
    /// Launch calls, including refused ones.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Processes successfully started.
    pub fn launched(&self) -> usize {
        self.launched.load(Ordering::SeqCst)
    }

    /// `terminate` calls.
    pub fn terminated(&self) -> usize {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Links dropped without ever being terminated.
    pub fn leaked(&self) -> usize {
        self.leaked.load(Ordering::SeqCst)
    }

    /// Processes started and not yet terminated.
    pub fn live(&self) -> usize {
        self.launched() - self.terminated()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn requests_for(&self, backend: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.backend == backend)
            .collect()
    }

    pub fn methods_for(&self, backend: &str) -> Vec<String> {
        self.requests_for(backend)
            .into_iter()
            .map(|r| r.method)
            .collect()
    }

    fn record(&self, request: RecordedRequest) {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request);
    }
}

/// Launcher that starts scripted in-memory backends.
#[derive(Default)]
pub struct ScriptedLauncher {
    backends: HashMap<String, FakeBackend>,
    stats: Arc<LaunchStats>,
}

impl ScriptedLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backend(mut self, name: impl Into<String>, backend: FakeBackend) -> Self {
        self.backends.insert(name.into(), backend);
        self
    }

    pub fn stats(&self) -> Arc<LaunchStats> {
        Arc::clone(&self.stats)
    }
}

#[async_trait]
impl Launcher for ScriptedLauncher {
    async fn launch(&self, entry: &RegistryEntry) -> Result<Box<dyn BackendLink>, McpError> {
        self.stats.attempts.fetch_add(1, Ordering::SeqCst);

        let script = match self.backends.get(&entry.name) {
            Some(FakeBackend::RefuseLaunch) | None => {
                return Err(McpError::Launch {
                    backend: entry.name.clone(),
                    reason: format!("{}: command not found", entry.command),
                });
            }
            Some(script) => script.clone(),
        };

        let (ours, theirs) = ChannelTransport::pair();
        tokio::spawn(play(entry.name.clone(), script, theirs, Arc::clone(&self.stats)));
        self.stats.launched.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(FakeLink {
            transport: Some(ours),
            stats: Arc::clone(&self.stats),
        }))
    }
}

struct FakeLink {
    transport: Option<ChannelTransport>,
    stats: Arc<LaunchStats>,
}

impl FakeLink {
    fn channel(&mut self) -> Result<&mut ChannelTransport, McpError> {
        self.transport.as_mut().ok_or_else(|| {
            McpError::Transport(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "fake backend already terminated",
            ))
        })
    }
}

#[async_trait]
impl McpTransport for FakeLink {
    async fn receive(&mut self) -> Result<Option<String>, McpError> {
        self.channel()?.receive().await
    }

    async fn send(&mut self, message: &str) -> Result<(), McpError> {
        self.channel()?.send(message).await
    }
}

#[async_trait]
impl BackendLink for FakeLink {
    async fn terminate(&mut self) -> Result<(), McpError> {
        self.stats.terminated.fetch_add(1, Ordering::SeqCst);
        self.transport = None;
        Ok(())
    }

    fn is_alive(&mut self) -> bool {
        self.transport.as_ref().is_some_and(|t| !t.is_closed())
    }
}

impl Drop for FakeLink {
    fn drop(&mut self) {
        if self.transport.is_some() {
            self.stats.leaked.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// The fake server side of one link.
async fn play(backend: String, script: FakeBackend, mut transport: ChannelTransport, stats: Arc<LaunchStats>) {
    if matches!(script, FakeBackend::HangUp) {
        return;
    }

    let mut answered = 0;
    while let Ok(Some(line)) = transport.receive().await {
        let Ok(request) = serde_json::from_str::<Envelope>(&line) else {
            continue;
        };
        let method = request.method.clone().unwrap_or_default();
        stats.record(RecordedRequest {
            backend: backend.clone(),
            id: request.id.clone(),
            method: method.clone(),
            params: request.params.clone(),
        });

        if method.starts_with("notifications/") {
            continue;
        }

        let id = request.id.clone();
        let reply = match (&script, method.as_str()) {
            (FakeBackend::Silent, _) => continue,
            (_, "initialize") => Envelope::success(
                id,
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {"tools": {}},
                    "serverInfo": {"name": backend}
                }),
            ),
            (FakeBackend::Garbage, _) => {
                if transport.send("this is not json").await.is_err() {
                    return;
                }
                continue;
            }
            (FakeBackend::Rejecting { code, message }, _) => Envelope::error(id, *code, message.clone()),
            (FakeBackend::Chatty, _) => {
                let log = json!({
                    "jsonrpc": "2.0",
                    "method": "notifications/message",
                    "params": {"level": "info", "data": "working"}
                });
                if transport.send(&log.to_string()).await.is_err() {
                    return;
                }
                Envelope::success(id, json!({}))
            }
            (FakeBackend::Serve { tools, .. }, "tools/list") => Envelope::success(id, json!({ "tools": tools })),
            (FakeBackend::Serve { .. }, "tools/call") => {
                let params = request.params.unwrap_or(Value::Null);
                Envelope::success(id, FakeBackend::call_reply(&backend, &params))
            }
            (_, other) => Envelope::error(id, -32601, format!("Method not found: {other}")),
        };

        let Ok(line) = serde_json::to_string(&reply) else {
            return;
        };
        if transport.send(&line).await.is_err() {
            return;
        }

        if method != "initialize" {
            answered += 1;
            if let FakeBackend::Serve { replies: Some(limit), .. } = script {
                if answered >= limit {
                    return;
                }
            }
        }
    }
}
