//! Backend API consumed by the control surface.
//!
//! The control surface never learns a job's outcome from a command call. Every
//! command returns an immediate acknowledgment, and progress, status lines and
//! completion arrive later through the [`ProgressHandler`] registered with
//! [`ConversionBackend::set_progress_handler`].
//!
//! - [`LocalBackend`]: in-process job runner that delegates the actual document
//!   work to a [`DocumentConverter`](crate::services::DocumentConverter)
//! - [`report`]: the JSON/YAML report written at the end of every job

pub mod local;
pub mod report;

use crate::models::{ProgressEvent, StartAck, StartRequest};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

pub use local::{BackendSettings, LocalBackend};
pub use report::{ConversionReport, FileResult, FormatStatus};

/// Typed progress callback registered with a backend.
///
/// Invoked once per event, in the order the job produced them.
pub type ProgressHandler = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Failures of the command call itself, as opposed to a rejected request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("Host bridge is not ready")]
    NotReady,

    #[error("Bridge call failed: {0}")]
    Call(String),
}

/// RPC-style API of the conversion engine.
#[async_trait]
pub trait ConversionBackend: Send + Sync {
    /// Ask the backend to start a job. The ack only says accepted or rejected.
    async fn start_conversion(&self, request: StartRequest) -> Result<StartAck, BridgeError>;

    /// Tell the backend the desired pause state.
    async fn toggle_pause(&self, paused: bool) -> Result<(), BridgeError>;

    /// Request cooperative cancellation of the running job.
    async fn stop_conversion(&self) -> Result<(), BridgeError>;

    /// Register (or replace) the handler that receives progress events.
    async fn set_progress_handler(&self, handler: ProgressHandler) -> Result<(), BridgeError>;
}
