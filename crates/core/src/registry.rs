//! Backend registry loaded from the `mcpServers` JSON file.
//!
//! The registry is read once at startup and never mutated. Entry order
//! follows the order of keys in the file, which is the order discovery
//! results are reported in.

use std::collections::HashMap;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ConfigError;

/// Separator between a backend name and a raw tool name.
pub const NAMESPACE_SEPARATOR: char = '_';

/// How to launch one backend process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    /// Unique backend name (the key in `mcpServers`).
    #[serde(skip)]
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Overrides layered on top of the ambient environment.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl RegistryEntry {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            env: HashMap::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    #[serde(default, rename = "mcpServers")]
    mcp_servers: IndexMap<String, RegistryEntry>,
}

/// Ordered, read-only table of backends keyed by name.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: IndexMap<String, RegistryEntry>,
}

impl Registry {
    /// Build a registry from entries, keeping their order.
    /// A later entry with a duplicate name replaces the earlier one in place.
    pub fn from_entries(entries: impl IntoIterator<Item = RegistryEntry>) -> Self {
        let mut map = IndexMap::new();
        for entry in entries {
            map.insert(entry.name.clone(), entry);
        }
        let registry = Self { entries: map };
        registry.warn_unroutable();
        registry
    }

    /// Load the registry from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        debug!(path = %path.display(), "Loading registry");
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse registry JSON text.
    pub fn parse(content: &str) -> Result<Self, serde_json::Error> {
        let file: RegistryFile = serde_json::from_str(content)?;
        let entries = file.mcp_servers.into_iter().map(|(name, mut entry)| {
            entry.name = name;
            entry
        });
        Ok(Self::from_entries(entries))
    }

    pub fn get(&self, name: &str) -> Option<&RegistryEntry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Entries in registry order.
    pub fn entries(&self) -> impl Iterator<Item = &RegistryEntry> {
        self.entries.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // Names are split at the first separator when routing, so a backend
    // whose own name contains one can list tools but never receive calls.
    fn warn_unroutable(&self) {
        for name in self.entries.keys() {
            if name.contains(NAMESPACE_SEPARATOR) {
                warn!(
                    backend = %name,
                    "backend name contains '{}'; its tools cannot be routed",
                    NAMESPACE_SEPARATOR
                );
            }
        }
    }
}
