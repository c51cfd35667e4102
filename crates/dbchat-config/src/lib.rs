//! Configuration schema, provider catalog, and config loading.
//!
//! This crate owns the dbchat config schema, the static provider/model
//! catalog, and the file + environment loader used by embedders.

mod catalog;
mod error;
mod loader;
mod model;

/// Public error type returned by config loading APIs.
pub use error::ConfigError;
/// File + environment config loading.
pub use loader::{load_config, load_config_with_env};
/// Configuration schema models.
pub use model::*;
/// Static provider/model catalog.
pub use catalog::{ModelDescriptor, ProviderConfig, ProviderKind, catalog, provider_config};
