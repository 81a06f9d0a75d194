//! Configuration — TOML settings plus platform path resolution.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{AppConfig, AudioConfig, StorageConfig, UiConfig};
