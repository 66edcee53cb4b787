//! Session acquisition and reuse.
//!
//! `SessionManager::exchange` is the single entry point used by discovery
//! and routing: acquire a handshaken session, run one exchange, then close
//! the session (per-call policy, or any failure) or park it for reuse
//! (pooled policy). Parked sessions are closed once they have been idle
//! longer than the idle timeout, or on `shutdown`.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use overflow_core::{RegistryEntry, SessionPolicy, Settings};

use crate::backend::{BackendSession, Launcher};
use crate::error::McpError;

struct IdleSession {
    session: BackendSession,
    parked_at: Instant,
}

/// Hands out backend sessions according to a `SessionPolicy`.
pub struct SessionManager {
    launcher: Arc<dyn Launcher>,
    exchange_timeout: Duration,
    policy: SessionPolicy,
    idle_timeout: Duration,
    idle: Mutex<HashMap<String, Vec<IdleSession>>>,
}

impl SessionManager {
    pub fn new(launcher: Arc<dyn Launcher>, exchange_timeout: Duration) -> Self {
        Self {
            launcher,
            exchange_timeout,
            policy: SessionPolicy::PerCall,
            idle_timeout: Duration::from_secs(60),
            idle: Mutex::new(HashMap::new()),
        }
    }

    /// Build from runtime settings.
    pub fn from_settings(launcher: Arc<dyn Launcher>, settings: &Settings) -> Self {
        Self::new(launcher, settings.exchange_timeout)
            .with_policy(settings.session_policy, settings.pool_idle_timeout)
    }

    pub fn with_policy(mut self, policy: SessionPolicy, idle_timeout: Duration) -> Self {
        self.policy = policy;
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn policy(&self) -> SessionPolicy {
        self.policy
    }

    /// Run one request against `entry`'s backend and return its result.
    ///
    /// The session used is closed before this returns unless it succeeded
    /// and the pooled policy keeps it. A pooled session whose backend went
    /// away before the request reached it is replaced by a fresh one.
    pub async fn exchange(
        &self,
        entry: &RegistryEntry,
        method: &str,
        params: Value,
    ) -> Result<Value, McpError> {
        if self.policy == SessionPolicy::Pooled {
            self.evict_idle().await;
            if let Some(mut session) = self.take_idle(&entry.name).await {
                debug!(backend = %entry.name, "Reusing pooled session");
                match session.exchange(method, params.clone()).await {
                    Ok(result) => {
                        self.park(session).await;
                        return Ok(result);
                    }
                    Err(e) if session.request_undelivered() => {
                        debug!(backend = %entry.name, error = %e, "Pooled session is gone, reopening");
                        session.close().await;
                    }
                    Err(e) => {
                        session.close().await;
                        return Err(e);
                    }
                }
            }
        }

        let mut session = self.open(entry).await?;
        let outcome = session.exchange(method, params).await;

        match (&outcome, self.policy) {
            (Ok(_), SessionPolicy::Pooled) => self.park(session).await,
            _ => session.close().await,
        }
        outcome
    }

    /// Launch and handshake a new session.
    async fn open(&self, entry: &RegistryEntry) -> Result<BackendSession, McpError> {
        let mut session =
            BackendSession::open(self.launcher.as_ref(), entry, self.exchange_timeout).await?;
        if let Err(e) = session.handshake().await {
            session.close().await;
            return Err(e);
        }
        Ok(session)
    }

    /// Pop the most recently parked session whose backend is still running.
    /// Sessions found dead on the way are closed.
    async fn take_idle(&self, backend: &str) -> Option<BackendSession> {
        let mut dead = Vec::new();
        let found = {
            let mut idle = self.idle.lock().await;
            let parked = idle.get_mut(backend)?;
            let mut found = None;
            while let Some(p) = parked.pop() {
                let mut session = p.session;
                if session.is_alive() {
                    found = Some(session);
                    break;
                }
                dead.push(session);
            }
            found
        };

        for session in dead {
            debug!(backend = %session.backend(), "Discarding pooled session whose backend exited");
            session.close().await;
        }
        found
    }

    async fn park(&self, session: BackendSession) {
        let backend = session.backend().to_string();
        let mut idle = self.idle.lock().await;
        idle.entry(backend).or_default().push(IdleSession {
            session,
            parked_at: Instant::now(),
        });
    }

    /// Number of parked sessions.
    pub async fn idle_count(&self) -> usize {
        self.idle.lock().await.values().map(Vec::len).sum()
    }

    /// Close parked sessions idle for at least the idle timeout.
    /// Returns how many were closed.
    pub async fn evict_idle(&self) -> usize {
        let expired: Vec<BackendSession> = {
            let mut idle = self.idle.lock().await;
            let mut expired = Vec::new();
            for parked in idle.values_mut() {
                let (stale, fresh): (Vec<_>, Vec<_>) = std::mem::take(parked)
                    .into_iter()
                    .partition(|p| p.parked_at.elapsed() >= self.idle_timeout);
                *parked = fresh;
                expired.extend(stale.into_iter().map(|p| p.session));
            }
            idle.retain(|_, parked| !parked.is_empty());
            expired
        };

        let count = expired.len();
        for session in expired {
            debug!(backend = %session.backend(), "Evicting idle session");
            session.close().await;
        }
        if count > 0 {
            info!(evicted = count, "Closed idle backend sessions");
        }
        count
    }

    /// Close every parked session.
    pub async fn shutdown(&self) {
        let parked: Vec<IdleSession> = {
            let mut idle = self.idle.lock().await;
            idle.drain().flat_map(|(_, sessions)| sessions).collect()
        };
        if !parked.is_empty() {
            info!(sessions = parked.len(), "Closing pooled backend sessions");
        }
        for p in parked {
            p.session.close().await;
        }
    }
}
