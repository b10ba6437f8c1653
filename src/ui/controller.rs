// GUI Controller - Bridges the Slint window with the conversion controller
//
// This module contains the GuiController which coordinates between:
// - Slint UI (MainWindow)
// - ConversionController (commands and progress handling)
// - StateManager (change events drive every redraw)
// - EventLoopBridge (async/GUI coordination)
//
// It handles:
// - Setting up UI callbacks → controller commands on tokio
// - Subscribing to state changes → UI updates
// - Native file picker and yes/no confirmations via `rfd`

use crate::control::{ConfirmPrompt, ConversionController};
use crate::models::{AppState, FileRef, OutputFormats, StatusLine};
use crate::state::StateChange;
use crate::ui::bridge::{EventLoopBridge, EventLoopBridgeHandle};
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use rfd::{FileDialog, MessageButtons, MessageDialog, MessageDialogResult, MessageLevel};
use slint::{ComponentHandle, Model, ModelRc, SharedString, VecModel};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

// Include the generated Slint code
slint::include_modules!();

/// Question shown when the window is closed during a conversion
pub const CLOSE_PROMPT: &str = "A conversion is still running. Stop it and exit?";

/// Native yes/no dialog
pub struct DialogPrompt {
    title: &'static str,
}

impl DialogPrompt {
    pub fn new(title: &'static str) -> Self {
        Self { title }
    }
}

impl ConfirmPrompt for DialogPrompt {
    fn confirm(&self, message: &str) -> bool {
        let answer = MessageDialog::new()
            .set_level(MessageLevel::Warning)
            .set_title(self.title)
            .set_description(message)
            .set_buttons(MessageButtons::YesNo)
            .show();
        answer == MessageDialogResult::Yes
    }
}

/// GUI Controller that wires up the Slint UI with the conversion controller
///
/// # Example
/// ```ignore
/// let gui = GuiController::new(controller, runtime.handle().clone(), input_dir)?;
/// gui.run()?;  // Blocks until window is closed
/// ```
pub struct GuiController {
    /// The Slint UI window
    ui: MainWindow,

    /// Event loop bridge for coordinating between tokio and Slint
    _bridge: EventLoopBridge<MainWindow>,
}

impl GuiController {
    /// Create a new GUI controller
    ///
    /// # Arguments
    /// * `controller` - The control surface every callback goes through
    /// * `tokio_handle` - Handle to the tokio runtime for spawning async tasks
    /// * `input_dir` - Initial directory of the file picker
    pub fn new(
        controller: Arc<ConversionController>,
        tokio_handle: tokio::runtime::Handle,
        input_dir: Utf8PathBuf,
    ) -> Result<Self> {
        let ui = MainWindow::new().context("Failed to create Slint UI")?;

        let bridge = EventLoopBridge::new(&ui, tokio_handle, Arc::clone(controller.metrics()));

        Self::sync_ui_with_state(&ui, &controller.state().snapshot());
        Self::setup_callbacks(&ui, &bridge, &controller, input_dir);
        Self::setup_state_subscription(&bridge, &controller);

        tracing::info!("GUI controller initialized");

        Ok(Self {
            ui,
            _bridge: bridge,
        })
    }

    /// Run the GUI (blocks until window is closed)
    pub fn run(self) -> Result<(), slint::PlatformError> {
        tracing::info!("Starting GUI event loop");
        self.ui.run()
    }

    /// Push the whole state into the window.
    ///
    /// Called once at startup and again whenever the subscription lagged.
    fn sync_ui_with_state(ui: &MainWindow, state: &AppState) {
        ui.set_convert_pdf(state.formats.convert_pdf);
        ui.set_convert_md(state.formats.convert_md);
        apply_files(ui, &state.selected_files);
        apply_controls(ui, state);
        apply_progress(ui, state);
        ui.set_status_log(ModelRc::new(VecModel::from(
            state.status_log.iter().map(log_line).collect::<Vec<_>>(),
        )));
        ui.set_report_path(state.last_report.clone().unwrap_or_default().into());

        tracing::debug!("UI synchronized with state");
    }

    /// Set up Slint UI callbacks
    fn setup_callbacks(
        ui: &MainWindow,
        bridge: &EventLoopBridge<MainWindow>,
        controller: &Arc<ConversionController>,
        input_dir: Utf8PathBuf,
    ) {
        // File picker runs on the UI thread; selection is a plain state edit
        let ctrl = Arc::clone(controller);
        ui.on_select_files(move || {
            tracing::debug!("Select files clicked");
            let files = Self::show_file_picker(&input_dir);
            ctrl.select(files);
        });

        let ctrl = Arc::clone(controller);
        ui.on_remove_file(move |index| match usize::try_from(index) {
            Ok(index) => {
                ctrl.remove(index);
            }
            Err(_) => tracing::debug!("Remove ignored: negative index {}", index),
        });

        let ctrl = Arc::clone(controller);
        ui.on_formats_changed(move |convert_pdf, convert_md| {
            ctrl.set_formats(OutputFormats::new(convert_pdf, convert_md));
        });

        let handle = bridge.clone_handle();
        let ctrl = Arc::clone(controller);
        ui.on_start_conversion(move || {
            tracing::info!("Start conversion clicked");
            let ctrl = Arc::clone(&ctrl);
            handle.spawn_async(move || async move {
                // Failures are already on the status log
                if let Err(e) = ctrl.start().await {
                    tracing::debug!("Start did not go through: {}", e);
                }
            });
        });

        let handle = bridge.clone_handle();
        let ctrl = Arc::clone(controller);
        ui.on_toggle_pause(move || {
            let ctrl = Arc::clone(&ctrl);
            handle.spawn_async(move || async move {
                if let Err(e) = ctrl.toggle_pause().await {
                    tracing::debug!("Pause toggle did not go through: {}", e);
                }
            });
        });

        // The confirmation blocks the UI thread; the stop itself runs on tokio
        let handle = bridge.clone_handle();
        let ctrl = Arc::clone(controller);
        ui.on_stop_conversion(move || {
            tracing::info!("Stop clicked");
            if !ctrl.confirm_stop(&DialogPrompt::new("Stop Conversion")) {
                tracing::debug!("Stop cancelled by user");
                return;
            }
            Self::spawn_stop(&handle, &ctrl);
        });

        // Window close event handler
        let handle = bridge.clone_handle();
        let ctrl = Arc::clone(controller);
        ui.window().on_close_requested(move || {
            if !ctrl.run_state().is_active() {
                tracing::info!("Close requested - allowing window to close");
                return slint::CloseRequestResponse::HideWindow;
            }

            tracing::info!("Close requested during conversion - asking for confirmation");
            if DialogPrompt::new("Exit").confirm(CLOSE_PROMPT) {
                Self::spawn_stop(&handle, &ctrl);
                slint::CloseRequestResponse::HideWindow
            } else {
                slint::CloseRequestResponse::KeepWindowShown
            }
        });

        tracing::debug!("UI callbacks configured");
    }

    fn spawn_stop(handle: &EventLoopBridgeHandle<MainWindow>, ctrl: &Arc<ConversionController>) {
        let ctrl = Arc::clone(ctrl);
        handle.spawn_async(move || async move {
            if let Err(e) = ctrl.stop_confirmed().await {
                tracing::debug!("Stop did not go through: {}", e);
            }
        });
    }

    /// Subscribe to state changes and update UI accordingly
    ///
    /// This spawns a background thread that listens for state change events
    /// and updates the Slint UI via the EventLoopBridge.
    fn setup_state_subscription(
        bridge: &EventLoopBridge<MainWindow>,
        controller: &Arc<ConversionController>,
    ) {
        let bridge_handle = bridge.clone_handle();
        let state = Arc::clone(controller.state());
        let mut rx = state.subscribe();

        std::thread::spawn(move || {
            tracing::debug!("State subscription thread started");

            loop {
                match rx.blocking_recv() {
                    Ok(change) => {
                        tracing::trace!("State change received: {:?}", change);

                        match change {
                            StateChange::SelectionChanged { .. }
                            | StateChange::RunStateChanged { .. }
                            | StateChange::StopPending { .. } => {
                                let snapshot = state.read(|s| ControlSnapshot::from(s));
                                bridge_handle.update_ui(move |ui| {
                                    apply_files(ui, &snapshot.files);
                                    apply_control_states(ui, &snapshot);
                                });
                            }
                            StateChange::FormatsChanged {
                                convert_pdf,
                                convert_md,
                            } => {
                                bridge_handle.update_ui(move |ui| {
                                    ui.set_convert_pdf(convert_pdf);
                                    ui.set_convert_md(convert_md);
                                });
                            }
                            StateChange::OverallProgress { .. }
                            | StateChange::CurrentProgress { .. } => {
                                let (overall, current) = state.read(|s| (s.overall, s.current));
                                bridge_handle.update_ui(move |ui| {
                                    ui.set_overall_fraction(overall.fraction());
                                    ui.set_overall_label(overall.label("files").into());
                                    ui.set_current_fraction(current.fraction());
                                    ui.set_current_label(current.label("images").into());
                                });
                            }
                            StateChange::StatusAppended { line } => {
                                let limit = state.read(|s| s.status_log_limit);
                                bridge_handle.update_ui(move |ui| {
                                    append_log_line(ui, log_line(&line), limit);
                                });
                            }
                            StateChange::StatusCleared => {
                                bridge_handle.update_ui(|ui| {
                                    ui.set_status_log(ModelRc::new(VecModel::<LogLine>::default()));
                                });
                            }
                            StateChange::ReportReady { path } => {
                                bridge_handle.update_ui(move |ui| {
                                    ui.set_report_path(path.into());
                                });
                            }
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("State subscription lagged by {} events - resyncing", skipped);
                        let snapshot = state.snapshot();
                        bridge_handle.update_ui(move |ui| Self::sync_ui_with_state(ui, &snapshot));
                    }
                    Err(RecvError::Closed) => break,
                }
            }

            tracing::debug!("State subscription thread terminated gracefully");
        });
    }

    /// Show a native multi-file picker for saved articles
    ///
    /// Paths that are not valid UTF-8 are skipped with a warning.
    fn show_file_picker(input_dir: &Utf8Path) -> Vec<FileRef> {
        let mut dialog = FileDialog::new()
            .set_title("Select Articles")
            .add_filter("HTML", &["html", "htm"])
            .add_filter("All files", &["*"]);

        if input_dir.is_dir() {
            dialog = dialog.set_directory(input_dir);
        }

        dialog
            .pick_files()
            .unwrap_or_default()
            .into_iter()
            .filter_map(|path| match Utf8PathBuf::try_from(path) {
                Ok(path) => Some(FileRef::from_path(&path)),
                Err(e) => {
                    tracing::warn!("Skipping non UTF-8 path: {}", e);
                    None
                }
            })
            .collect()
    }
}

/// What the file list and the buttons need, captured in one read
struct ControlSnapshot {
    files: Vec<FileRef>,
    start_enabled: bool,
    pause_enabled: bool,
    stop_enabled: bool,
    pause_label: &'static str,
}

impl From<&AppState> for ControlSnapshot {
    fn from(state: &AppState) -> Self {
        let controls = state.controls();
        Self {
            files: state.selected_files.clone(),
            start_enabled: controls.start_enabled,
            pause_enabled: controls.pause_enabled,
            stop_enabled: controls.stop_enabled,
            pause_label: controls.pause_label,
        }
    }
}

fn apply_files(ui: &MainWindow, files: &[FileRef]) {
    ui.set_files(ModelRc::new(VecModel::from(file_rows(files))));
}

fn apply_controls(ui: &MainWindow, state: &AppState) {
    apply_control_states(ui, &ControlSnapshot::from(state));
}

fn apply_control_states(ui: &MainWindow, snapshot: &ControlSnapshot) {
    ui.set_start_enabled(snapshot.start_enabled);
    ui.set_pause_enabled(snapshot.pause_enabled);
    ui.set_stop_enabled(snapshot.stop_enabled);
    ui.set_pause_label(snapshot.pause_label.into());
}

fn apply_progress(ui: &MainWindow, state: &AppState) {
    ui.set_overall_fraction(state.overall.fraction());
    ui.set_overall_label(state.overall_label().into());
    ui.set_current_fraction(state.current.fraction());
    ui.set_current_label(state.current_label().into());
}

/// Append to the log model in place, trimming the oldest rows past `limit`
fn append_log_line(ui: &MainWindow, row: LogLine, limit: usize) {
    let model = ui.get_status_log();
    match model.as_any().downcast_ref::<VecModel<LogLine>>() {
        Some(lines) => {
            lines.push(row);
            while limit > 0 && lines.row_count() > limit {
                lines.remove(0);
            }
        }
        None => ui.set_status_log(ModelRc::new(VecModel::from(vec![row]))),
    }
}

fn file_rows(files: &[FileRef]) -> Vec<FileRow> {
    files
        .iter()
        .map(|file| FileRow {
            name: SharedString::from(file.name.as_str()),
            path: SharedString::from(file.path.as_str()),
        })
        .collect()
}

fn log_line(line: &StatusLine) -> LogLine {
    LogLine {
        text: line.render().into(),
        level: line.level.as_str().into(),
    }
}
