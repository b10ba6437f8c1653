//! Selection & control surface.
//!
//! [`ConversionController`] is the single writer of [`AppState`](crate::models::AppState).
//! It owns the run-state machine:
//!
//! ```text
//! Idle --start(valid)--> Running
//! Running --pause--> Paused
//! Paused --pause--> Running
//! Running/Paused --stop(confirmed)--> Idle
//! Running/Paused --complete--> Idle
//! Running --start ack failure--> Idle
//! ```
//!
//! Commands return as soon as the backend acknowledges them. Everything else
//! the job has to say arrives through [`ConversionController::handle_job_event`],
//! normally fed by a [`ProgressChannel`].
//!
//! Every start and every confirmed stop opens a new run generation. The
//! progress channel stamps events with the generation current when they were
//! produced, so output of a stopped job can never land in the run after it.

pub mod progress;

use crate::backend::{ConversionBackend, ProgressHandler};
use crate::metrics::Metrics;
use crate::models::{FileRef, OutputFormats, ProgressEvent, RunState, StartRequest, StatusLevel};
use crate::state::StateManager;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

pub use crate::backend::local::ABORTED_MESSAGE;
pub use progress::ProgressChannel;

/// Question shown before a running conversion is stopped
pub const STOP_PROMPT: &str = "Are you sure you want to stop the conversion?";

/// Outcomes of control-surface commands that did not go through
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    #[error("Please select at least one file to convert")]
    NoFiles,

    #[error("Please select at least one output format")]
    NoFormat,

    #[error("A conversion is already in progress")]
    AlreadyRunning,

    #[error("The previous conversion is still stopping")]
    StopPending,

    #[error("Conversion failed to start: {0}")]
    Rejected(String),

    #[error("Error: {0}")]
    Bridge(String),

    #[error("No conversion is running")]
    NotRunning,
}

/// Yes/no confirmation shown to the operator
pub trait ConfirmPrompt {
    fn confirm(&self, message: &str) -> bool;
}

impl<F> ConfirmPrompt for F
where
    F: Fn(&str) -> bool,
{
    fn confirm(&self, message: &str) -> bool {
        self(message)
    }
}

/// Controller behind the buttons, checkboxes and file list
///
/// # Example
/// ```ignore
/// let controller = Arc::new(ConversionController::new(state, backend, metrics));
/// let channel = ProgressChannel::spawn(Arc::clone(&controller), runtime.handle());
/// controller.connect(channel.handler()).await;
///
/// controller.select(files);
/// controller.start().await?;
/// ```
pub struct ConversionController {
    state: Arc<StateManager>,
    backend: Arc<dyn ConversionBackend>,
    metrics: Arc<Metrics>,
    generation: AtomicU64,
}

impl ConversionController {
    pub fn new(
        state: Arc<StateManager>,
        backend: Arc<dyn ConversionBackend>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            state,
            backend,
            metrics,
            generation: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> &Arc<StateManager> {
        &self.state
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn run_state(&self) -> RunState {
        self.state.read(|s| s.run_state)
    }

    /// Run generation that freshly produced events belong to
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Register the progress handler with the backend.
    ///
    /// Call again whenever the backend connection is (re)established.
    pub async fn connect(&self, handler: ProgressHandler) -> bool {
        match self.backend.set_progress_handler(handler).await {
            Ok(()) => {
                tracing::info!("Progress handler registered with backend");
                true
            }
            Err(e) => {
                tracing::error!("Failed to register progress handler: {}", e);
                self.append_status(format!("Error: {}", e), StatusLevel::Error);
                false
            }
        }
    }

    // ===== Selection =====

    /// Append files to the selection
    pub fn select(&self, files: Vec<FileRef>) {
        if files.is_empty() {
            tracing::debug!("File picker returned no files");
            return;
        }

        tracing::info!("Selected {} file(s)", files.len());
        self.state.select_files(files);
    }

    /// Remove the entry at `index`; out-of-bounds is a no-op
    pub fn remove(&self, index: usize) -> Option<FileRef> {
        let (removed, _) = self.state.remove_file(index);
        match &removed {
            Some(file) => tracing::info!("Removed {} from selection", file.name),
            None => tracing::debug!("Remove ignored: index {} out of bounds", index),
        }
        removed
    }

    pub fn clear_selection(&self) {
        self.state.clear_selection();
    }

    pub fn set_formats(&self, formats: OutputFormats) {
        tracing::debug!("Formats: pdf={}, md={}", formats.convert_pdf, formats.convert_md);
        self.state.set_formats(formats);
    }

    // ===== Commands =====

    /// Validate, move to Running and ask the backend to start.
    ///
    /// Validation failures append an error line and leave the run state alone.
    /// A refused or failed start request reverts to Idle.
    pub async fn start(&self) -> Result<(), ControlError> {
        let (checked, _) = self.state.update_with(|state| {
            if state.run_state != RunState::Idle {
                return Err(ControlError::AlreadyRunning);
            }
            if state.stop_pending {
                return Err(ControlError::StopPending);
            }
            if state.selected_files.is_empty() {
                return Err(ControlError::NoFiles);
            }
            if !state.formats.any() {
                return Err(ControlError::NoFormat);
            }

            state.run_state = RunState::Running;
            state.reset_progress();
            self.generation.fetch_add(1, Ordering::SeqCst);
            Ok(StartRequest::new(state.selected_files.clone(), state.formats))
        });

        let request = match checked {
            Ok(request) => request,
            Err(e @ (ControlError::AlreadyRunning | ControlError::StopPending)) => {
                tracing::debug!("Start ignored: {}", e);
                return Err(e);
            }
            Err(e) => {
                tracing::warn!("Start refused: {}", e);
                self.metrics.record_job_rejected();
                self.append_status(e.to_string(), StatusLevel::Error);
                return Err(e);
            }
        };

        tracing::info!(
            "Starting conversion of {} file(s) (pdf={}, md={})",
            request.files.len(),
            request.convert_pdf,
            request.convert_md
        );

        match self.backend.start_conversion(request).await {
            Ok(ack) if ack.success => {
                self.metrics.record_job_started();
                Ok(())
            }
            Ok(ack) => {
                let reason = ack.error.unwrap_or_else(|| "unknown error".to_string());
                self.fail_start(ControlError::Rejected(reason))
            }
            Err(e) => self.fail_start(ControlError::Bridge(e.to_string())),
        }
    }

    fn fail_start(&self, error: ControlError) -> Result<(), ControlError> {
        tracing::error!("{}", error);
        self.metrics.record_job_rejected();
        self.append_status(error.to_string(), StatusLevel::Error);
        self.state.update(|state| {
            if state.run_state.is_active() {
                state.run_state = RunState::Idle;
            }
        });
        Err(error)
    }

    /// Flip between Running and Paused and tell the backend
    ///
    /// # Returns
    /// The new run state
    pub async fn toggle_pause(&self) -> Result<RunState, ControlError> {
        let (next, _) = self.state.update_with(|state| {
            let next = match state.run_state {
                RunState::Running => RunState::Paused,
                RunState::Paused => RunState::Running,
                RunState::Idle => return None,
            };
            state.run_state = next;
            Some(next)
        });

        let Some(next) = next else {
            tracing::debug!("Pause ignored: no conversion is running");
            return Err(ControlError::NotRunning);
        };

        let paused = next == RunState::Paused;
        if let Err(e) = self.backend.toggle_pause(paused).await {
            tracing::warn!("Backend did not accept pause toggle: {}", e);
            self.append_status(format!("Error: {}", e), StatusLevel::Warning);
        }

        let message = if paused {
            "Conversion paused"
        } else {
            "Conversion resumed"
        };
        self.append_status(message, StatusLevel::Info);

        Ok(next)
    }

    /// Ask the operator whether to stop. Always `false` when nothing runs.
    pub fn confirm_stop(&self, prompt: &dyn ConfirmPrompt) -> bool {
        if !self.run_state().is_active() {
            tracing::debug!("Stop ignored: no conversion is running");
            return false;
        }
        prompt.confirm(STOP_PROMPT)
    }

    /// Stop after the operator said yes.
    ///
    /// The surface goes Idle before the backend is told; events the job still
    /// emits afterwards are ignored. Start stays disabled until the backend
    /// has answered the stop.
    pub async fn stop_confirmed(&self) -> Result<(), ControlError> {
        let (was_active, _) = self.state.update_with(|state| {
            let active = state.run_state.is_active();
            if active {
                state.run_state = RunState::Idle;
                state.stop_pending = true;
                self.generation.fetch_add(1, Ordering::SeqCst);
            }
            active
        });

        if !was_active {
            return Err(ControlError::NotRunning);
        }

        tracing::warn!("Conversion stopped by user");
        self.metrics.record_job_stopped();
        self.append_status(ABORTED_MESSAGE, StatusLevel::Error);

        if let Err(e) = self.backend.stop_conversion().await {
            tracing::warn!("Backend did not acknowledge stop: {}", e);
            self.append_status(format!("Error: {}", e), StatusLevel::Warning);
        }

        self.state.update(|state| state.stop_pending = false);
        Ok(())
    }

    /// Confirm, then stop
    ///
    /// # Returns
    /// `true` if the conversion was stopped
    pub async fn stop(&self, prompt: &dyn ConfirmPrompt) -> Result<bool, ControlError> {
        if !self.confirm_stop(prompt) {
            return Ok(false);
        }
        self.stop_confirmed().await?;
        Ok(true)
    }

    // ===== Progress =====

    /// Apply an event stamped with the run generation it was produced in.
    ///
    /// Events from an earlier generation are dropped and counted as late.
    pub fn handle_job_event(&self, generation: u64, event: ProgressEvent) {
        let current = self.generation();
        if generation != current {
            tracing::debug!(
                "Ignoring event from run {} (current run {}): {:?}",
                generation,
                current,
                event
            );
            self.metrics.record_late_event();
            return;
        }

        self.handle_event(event);
    }

    /// Apply one progress event of the current run. Must be called in production order.
    pub fn handle_event(&self, event: ProgressEvent) {
        if !self.run_state().is_active() {
            tracing::debug!("Ignoring progress event while idle: {:?}", event);
            self.metrics.record_late_event();
            return;
        }

        self.metrics.record_event_dispatched();

        match event {
            ProgressEvent::Overall { current, total } => {
                self.state.set_overall(current, total);
            }
            ProgressEvent::Current {
                current,
                total,
                filename,
            } => {
                self.state.set_current(current, total);
                if let Some(filename) = filename {
                    self.append_status(format!("Processing file: {}", filename), StatusLevel::Info);
                }
            }
            ProgressEvent::Status { message, level } => {
                self.append_status(message, level);
            }
            ProgressEvent::Complete { report_path } => {
                tracing::info!("Conversion complete, report: {:?}", report_path);
                self.metrics.record_job_completed();
                self.append_status("Conversion complete!", StatusLevel::Success);
                if !report_path.is_empty() {
                    self.append_status(
                        format!("Report saved to: {}", report_path),
                        StatusLevel::Info,
                    );
                    self.state.set_report(report_path);
                }
                self.state.set_run_state(RunState::Idle);
            }
        }
    }

    fn append_status(&self, message: impl Into<String>, level: StatusLevel) {
        self.metrics.record_status_line();
        self.state.append_status(message, level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BridgeError;
    use crate::models::{StartAck, StatusLine};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Backend that records calls and answers start with a fixed ack
    #[derive(Default)]
    struct RecordingBackend {
        calls: Mutex<Vec<String>>,
        reject_with: Option<String>,
    }

    #[async_trait]
    impl ConversionBackend for RecordingBackend {
        async fn start_conversion(&self, request: StartRequest) -> Result<StartAck, BridgeError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("start:{}", request.files.len()));
            Ok(match &self.reject_with {
                Some(reason) => StartAck::rejected(reason.clone()),
                None => StartAck::accepted(),
            })
        }

        async fn toggle_pause(&self, paused: bool) -> Result<(), BridgeError> {
            self.calls.lock().unwrap().push(format!("pause:{}", paused));
            Ok(())
        }

        async fn stop_conversion(&self) -> Result<(), BridgeError> {
            self.calls.lock().unwrap().push("stop".to_string());
            Ok(())
        }

        async fn set_progress_handler(&self, _handler: ProgressHandler) -> Result<(), BridgeError> {
            self.calls.lock().unwrap().push("handler".to_string());
            Ok(())
        }
    }

    fn controller_with(backend: Arc<RecordingBackend>) -> ConversionController {
        ConversionController::new(
            Arc::new(StateManager::new()),
            backend,
            Arc::new(Metrics::new()),
        )
    }

    fn last_line(controller: &ConversionController) -> Option<StatusLine> {
        controller.state().read(|s| s.status_log.last().cloned())
    }

    #[tokio::test]
    async fn test_start_without_format_is_local_error() {
        let backend = Arc::new(RecordingBackend::default());
        let controller = controller_with(Arc::clone(&backend));
        controller.select(vec![FileRef::new("a.html", None)]);

        let result = controller.start().await;

        assert_eq!(result, Err(ControlError::NoFormat));
        assert_eq!(controller.run_state(), RunState::Idle);
        assert!(backend.calls.lock().unwrap().is_empty());
        assert_eq!(last_line(&controller).unwrap().level, StatusLevel::Error);
    }

    #[tokio::test]
    async fn test_rejected_ack_reverts_to_idle() {
        let backend = Arc::new(RecordingBackend {
            reject_with: Some("Conversion already in progress".to_string()),
            ..Default::default()
        });
        let controller = controller_with(Arc::clone(&backend));
        controller.select(vec![FileRef::new("a.html", None)]);
        controller.set_formats(OutputFormats::new(true, false));

        let result = controller.start().await;

        assert!(matches!(result, Err(ControlError::Rejected(_))));
        assert_eq!(controller.run_state(), RunState::Idle);
        let line = last_line(&controller).unwrap();
        assert!(line.message.contains("Conversion already in progress"));
    }

    #[tokio::test]
    async fn test_toggle_pause_while_idle_does_nothing() {
        let backend = Arc::new(RecordingBackend::default());
        let controller = controller_with(Arc::clone(&backend));

        assert_eq!(controller.toggle_pause().await, Err(ControlError::NotRunning));
        assert!(backend.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_declined_stop_keeps_running() {
        let backend = Arc::new(RecordingBackend::default());
        let controller = controller_with(Arc::clone(&backend));
        controller.select(vec![FileRef::new("a.html", None)]);
        controller.set_formats(OutputFormats::new(false, true));
        controller.start().await.unwrap();

        let stopped = controller.stop(&|_: &str| false).await.unwrap();

        assert!(!stopped);
        assert_eq!(controller.run_state(), RunState::Running);
        assert!(!backend.calls.lock().unwrap().contains(&"stop".to_string()));
    }

    #[test]
    fn test_remove_out_of_bounds_is_noop() {
        let controller = controller_with(Arc::new(RecordingBackend::default()));
        controller.select(vec![FileRef::new("a.html", None)]);

        assert!(controller.remove(3).is_none());
        assert_eq!(controller.state().read(|s| s.selected_files.len()), 1);
    }

    #[tokio::test]
    async fn test_start_waits_for_pending_stop() {
        let backend = Arc::new(RecordingBackend::default());
        let controller = controller_with(Arc::clone(&backend));
        controller.select(vec![FileRef::new("a.html", None)]);
        controller.set_formats(OutputFormats::new(true, false));
        controller.state().update(|s| s.stop_pending = true);

        assert_eq!(controller.start().await, Err(ControlError::StopPending));
        assert!(backend.calls.lock().unwrap().is_empty());
        assert!(controller.state().read(|s| s.status_log.is_empty()));
    }

    #[tokio::test]
    async fn test_stop_clears_pending_flag_and_opens_generation() {
        let backend = Arc::new(RecordingBackend::default());
        let controller = controller_with(Arc::clone(&backend));
        controller.select(vec![FileRef::new("a.html", None)]);
        controller.set_formats(OutputFormats::new(true, false));

        controller.start().await.unwrap();
        let started = controller.generation();
        controller.stop_confirmed().await.unwrap();

        assert!(controller.generation() > started);
        assert!(!controller.state().read(|s| s.stop_pending));
        assert!(controller.state().read(|s| s.can_start()));
    }

    #[tokio::test]
    async fn test_events_from_previous_run_are_dropped() {
        let controller = controller_with(Arc::new(RecordingBackend::default()));
        controller.select(vec![FileRef::new("a.html", None)]);
        controller.set_formats(OutputFormats::new(true, false));

        controller.start().await.unwrap();
        let first_run = controller.generation();
        controller.stop_confirmed().await.unwrap();
        controller.start().await.unwrap();

        controller.handle_job_event(
            first_run,
            ProgressEvent::Complete {
                report_path: "/out/old.yaml".to_string(),
            },
        );

        assert_eq!(controller.run_state(), RunState::Running);
        assert!(controller.state().read(|s| s.last_report.is_none()));
        assert_eq!(controller.metrics().late_events_ignored.load(Ordering::Relaxed), 1);

        controller.handle_job_event(
            controller.generation(),
            ProgressEvent::Overall { current: 1, total: 4 },
        );
        assert_eq!(controller.state().read(|s| s.overall.current), 1);
    }

    #[test]
    fn test_complete_without_report_path_skips_report_line() {
        let controller = controller_with(Arc::new(RecordingBackend::default()));
        controller.state().set_run_state(RunState::Running);

        controller.handle_event(ProgressEvent::Complete {
            report_path: String::new(),
        });

        let state = controller.state().snapshot();
        assert_eq!(state.run_state, RunState::Idle);
        assert_eq!(state.status_log.len(), 1);
        assert!(state.last_report.is_none());
    }
}
