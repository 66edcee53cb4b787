pub mod config;
pub mod error;
pub mod exclusions;
pub mod registry;

pub use config::{load_dotenv, SessionPolicy, Settings};
pub use error::ConfigError;
pub use exclusions::ExclusionSet;
pub use registry::{Registry, RegistryEntry, NAMESPACE_SEPARATOR};
