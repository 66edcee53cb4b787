use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

use overflow_core::{ExclusionSet, SessionPolicy, Settings};

/// CLI configuration loaded from TOML file.
///
/// Every field is optional; anything left out falls back to the
/// environment, then to the built-in default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CliConfig {
    /// Backend registry file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<PathBuf>,

    /// Tools the upstream client already reaches directly. Replaces the
    /// built-in list when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direct_tools: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchange_timeout_secs: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shutdown_grace_secs: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_policy: Option<SessionPolicy>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_idle_secs: Option<u64>,
}

impl CliConfig {
    /// Return the default config directory path: ~/.config/mcp-overflow/
    pub fn default_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("could not determine user config directory")?
            .join("mcp-overflow");
        Ok(config_dir)
    }

    /// Return the default config file path.
    pub fn default_config_path() -> Result<PathBuf> {
        Ok(Self::default_config_dir()?.join("config.toml"))
    }

    /// Load config from the given path, or the default path.
    /// Returns default config if the file does not exist.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let config_path = match path {
            Some(p) => PathBuf::from(p),
            None => Self::default_config_path()?,
        };

        if config_path.exists() {
            debug!(?config_path, "Loading config");
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("failed to read config: {}", config_path.display()))?;
            Self::parse(&content)
                .with_context(|| format!("failed to parse config: {}", config_path.display()))
        } else {
            debug!(?config_path, "Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Layer this file's values over `settings`.
    pub fn apply(&self, settings: &mut Settings) -> Result<()> {
        if let Some(ref registry) = self.registry {
            settings.registry_path = registry.clone();
        }
        if let Some(secs) = self.exchange_timeout_secs {
            settings.exchange_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.shutdown_grace_secs {
            settings.shutdown_grace = Duration::from_secs(secs);
        }
        if let Some(n) = self.max_concurrency {
            if n == 0 {
                bail!("max_concurrency must be at least 1");
            }
            settings.max_concurrency = n;
        }
        if let Some(policy) = self.session_policy {
            settings.session_policy = policy;
        }
        if let Some(secs) = self.pool_idle_secs {
            settings.pool_idle_timeout = Duration::from_secs(secs);
        }
        Ok(())
    }

    /// The exclusion set: `direct_tools` if given, the built-in list otherwise.
    pub fn exclusions(&self) -> ExclusionSet {
        match self.direct_tools {
            Some(ref names) => ExclusionSet::new(names.iter().cloned()),
            None => ExclusionSet::direct_defaults(),
        }
    }
}
