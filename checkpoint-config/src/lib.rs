//! Configuration for the checkpoint client.
//!
//! Settings come from one TOML or JSON document, picked by [`ConfigLoader`]
//! from an explicit path, `$CHECKPOINT_CONFIG_PATH`, `$CHECKPOINT_CONFIG_JSON`
//! or a default file, with a few scalar environment overrides on top.
#![allow(missing_docs)]

pub mod loader;
pub mod models;
pub mod validation;

pub use loader::{ConfigLoad, ConfigLoadError, ConfigLoader, ConfigSource, EnvOverrides};
pub use models::{
    CheckpointConfig, DecoderCommandConfig, HistoryConfig, RegistryConfig, ScannerSettings,
    StorageConfig, TierOverride, ValidationConfig,
};
pub use validation::{ConfigWarning, ConfigWarnings};
