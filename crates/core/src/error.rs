use std::path::PathBuf;

use thiserror::Error;

/// Failures while loading configuration. Always fatal, raised before any
/// backend is contacted.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("MCP config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid setting {key}={value}: {reason}")]
    InvalidSetting {
        key: String,
        value: String,
        reason: String,
    },
}
