//! Data models for the converter front-end.
//!
//! - [`AppState`]: selection, formats, [`RunState`], progress bars and the status log
//! - [`ProgressEvent`] and the command payloads exchanged with the backend
//! - [`UserConfig`]: user preferences loaded from `Converter Settings.yaml`
//!
//! # Architecture Note
//!
//! [`AppState`] is never shared directly. [`StateManager`](crate::state::StateManager)
//! owns it behind a lock and turns every mutation into change events.

pub mod app_state;
pub mod config;
pub mod events;

pub use app_state::{AppState, ControlStates, ProgressBar, RunState, StatusLine};
pub use config::{ConverterSettings, UserConfig};
pub use events::{
    FileRef, OutputFormat, OutputFormats, ProgressEvent, StartAck, StartRequest, StatusLevel,
};
