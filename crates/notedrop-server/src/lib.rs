//! Server runtime configuration for notedrop.

pub mod config;

pub use config::{ConfigLoadError, ServerConfig};
