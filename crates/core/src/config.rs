use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidSetting {
            key: key.to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

pub const DEFAULT_REGISTRY_PATH: &str = "mcp-config-minimal.json";
pub const DEFAULT_EXCHANGE_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 5;
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;
pub const DEFAULT_POOL_IDLE_SECS: u64 = 60;

// ── Session policy ────────────────────────────────────────────

/// How backend processes are reused between operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionPolicy {
    /// Launch a fresh process for every discovery and every call.
    #[default]
    PerCall,
    /// Keep handshaken processes per backend and reuse them until they
    /// have been idle for `idle_timeout`.
    Pooled,
}

impl FromStr for SessionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "per-call" | "per_call" | "percall" => Ok(Self::PerCall),
            "pooled" | "pool" => Ok(Self::Pooled),
            other => Err(format!("unknown session policy '{other}' (expected per-call or pooled)")),
        }
    }
}

// ── Settings ──────────────────────────────────────────────────

/// Runtime knobs for the aggregator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Path of the `mcpServers` registry file.
    pub registry_path: PathBuf,
    /// Deadline for each handshake and each request/response exchange.
    pub exchange_timeout: Duration,
    /// How long a closing backend may take to exit before it is killed.
    pub shutdown_grace: Duration,
    /// Upper bound on backends queried at the same time during discovery.
    pub max_concurrency: usize,
    pub session_policy: SessionPolicy,
    /// Idle time after which a pooled session is closed.
    pub pool_idle_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            registry_path: PathBuf::from(DEFAULT_REGISTRY_PATH),
            exchange_timeout: Duration::from_secs(DEFAULT_EXCHANGE_TIMEOUT_SECS),
            shutdown_grace: Duration::from_secs(DEFAULT_SHUTDOWN_GRACE_SECS),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            session_policy: SessionPolicy::PerCall,
            pool_idle_timeout: Duration::from_secs(DEFAULT_POOL_IDLE_SECS),
        }
    }
}

impl Settings {
    /// Build settings from `OVERFLOW_*` environment variables
    /// (call `load_dotenv()` first).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_opt)
    }

    /// Build settings from an arbitrary key lookup. Missing keys keep
    /// their defaults; present but unparseable keys are an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let max_concurrency = parse_or(&lookup, "OVERFLOW_MAX_CONCURRENCY", defaults.max_concurrency)?;
        if max_concurrency == 0 {
            return Err(ConfigError::InvalidSetting {
                key: "OVERFLOW_MAX_CONCURRENCY".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            registry_path: lookup("OVERFLOW_REGISTRY")
                .map(PathBuf::from)
                .unwrap_or(defaults.registry_path),
            exchange_timeout: Duration::from_secs(parse_or(
                &lookup,
                "OVERFLOW_EXCHANGE_TIMEOUT_SECS",
                DEFAULT_EXCHANGE_TIMEOUT_SECS,
            )?),
            shutdown_grace: Duration::from_secs(parse_or(
                &lookup,
                "OVERFLOW_SHUTDOWN_GRACE_SECS",
                DEFAULT_SHUTDOWN_GRACE_SECS,
            )?),
            max_concurrency,
            session_policy: parse_or(&lookup, "OVERFLOW_SESSION_POLICY", defaults.session_policy)?,
            pool_idle_timeout: Duration::from_secs(parse_or(
                &lookup,
                "OVERFLOW_POOL_IDLE_SECS",
                DEFAULT_POOL_IDLE_SECS,
            )?),
        })
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Settings loaded:");
        tracing::info!("  registry:     {}", self.registry_path.display());
        tracing::info!("  timeout:      {}s per exchange", self.exchange_timeout.as_secs());
        tracing::info!("  concurrency:  {}", self.max_concurrency);
        tracing::info!(
            "  sessions:     {:?} (idle {}s)",
            self.session_policy,
            self.pool_idle_timeout.as_secs()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let settings = Settings::from_lookup(|_| None).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.registry_path, PathBuf::from("mcp-config-minimal.json"));
        assert_eq!(settings.session_policy, SessionPolicy::PerCall);
    }

    #[test]
    fn test_overrides() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("OVERFLOW_REGISTRY", "/etc/mcp.json"),
            ("OVERFLOW_EXCHANGE_TIMEOUT_SECS", "7"),
            ("OVERFLOW_MAX_CONCURRENCY", "16"),
            ("OVERFLOW_SESSION_POLICY", "pooled"),
            ("OVERFLOW_POOL_IDLE_SECS", "120"),
        ]))
        .unwrap();
        assert_eq!(settings.registry_path, PathBuf::from("/etc/mcp.json"));
        assert_eq!(settings.exchange_timeout, Duration::from_secs(7));
        assert_eq!(settings.max_concurrency, 16);
        assert_eq!(settings.session_policy, SessionPolicy::Pooled);
        assert_eq!(settings.pool_idle_timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_invalid_number() {
        let err = Settings::from_lookup(lookup_from(&[("OVERFLOW_EXCHANGE_TIMEOUT_SECS", "soon")]))
            .unwrap_err();
        match err {
            ConfigError::InvalidSetting { key, value, .. } => {
                assert_eq!(key, "OVERFLOW_EXCHANGE_TIMEOUT_SECS");
                assert_eq!(value, "soon");
            }
            other => panic!("expected InvalidSetting, got {other:?}"),
        }
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let err = Settings::from_lookup(lookup_from(&[("OVERFLOW_MAX_CONCURRENCY", "0")]));
        assert!(err.is_err());
    }

    #[test]
    fn test_session_policy_parse() {
        assert_eq!("per-call".parse::<SessionPolicy>().unwrap(), SessionPolicy::PerCall);
        assert_eq!("Pooled".parse::<SessionPolicy>().unwrap(), SessionPolicy::Pooled);
        assert!("sometimes".parse::<SessionPolicy>().is_err());
    }
}
