//! Configuration Module
//!
//! Environment-driven configuration for the replay server.

mod settings;

pub use settings::{ConfigError, ServerSettings, ServiceConfig};
