//! Terminal dashboard for the HVAC zone reconciliation engine.
//!
//! The binary starts an [`hvac_core::Engine`] against the configured API
//! server and prints snapshots, notifications and activity as text or JSON.
//! This library half holds the pieces worth testing on their own: the TOML
//! configuration and the text renderer.

pub mod config;
pub mod render;

pub use config::{
    ApiConfig, Config, ConfigError, ReconnectConfig, RefreshConfig, ValidationError,
    default_config_path,
};
pub use render::{DEFAULT_ACTIVITY_ROWS, format_notification, render_snapshot};
