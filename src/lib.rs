// Article Converter - desktop front-end for batch conversion of saved articles
//
// This is the library crate containing the control surface, the progress
// channel and the local job runner. The binary crate (main.rs) provides the
// GUI entry point.

pub mod backend;
pub mod config;
pub mod control;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;
pub mod ui;

// Re-export commonly used types for convenience
pub use backend::{BridgeError, ConversionBackend, LocalBackend, ProgressHandler};
pub use config::ConfigManager;
pub use control::{ControlError, ConversionController, ProgressChannel};
pub use metrics::Metrics;
pub use models::{AppState, ProgressEvent, RunState, UserConfig};
pub use state::{StateChange, StateManager};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
