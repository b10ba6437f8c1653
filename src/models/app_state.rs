use crate::models::events::{FileRef, OutputFormats, StatusLevel};
use time::OffsetDateTime;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

const STATUS_TIME_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[hour]:[minute]:[second]");

/// Client-local belief about the conversion job.
///
/// There is no separate stopped or failed state: stop confirmations, start
/// rejections and completion events all return the surface to [`RunState::Idle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Paused,
}

impl RunState {
    /// Running or Paused; a job is believed to exist.
    pub fn is_active(&self) -> bool {
        matches!(self, RunState::Running | RunState::Paused)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::Paused => "paused",
        }
    }
}

/// Latest value of one progress bar. Rendering overwrites, never accumulates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressBar {
    pub current: usize,
    pub total: usize,
}

impl ProgressBar {
    pub fn new(current: usize, total: usize) -> Self {
        Self { current, total }
    }

    /// Fraction in `0.0..=1.0`; an empty total renders as zero.
    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            return 0.0;
        }
        (self.current as f32 / self.total as f32).clamp(0.0, 1.0)
    }

    pub fn percent(&self) -> f32 {
        self.fraction() * 100.0
    }

    /// `"3 / 10 files"`
    pub fn label(&self, unit: &str) -> String {
        format!("{} / {} {}", self.current, self.total, unit)
    }
}

/// One rendered line of the status log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub timestamp: String,
    pub message: String,
    pub level: StatusLevel,
}

impl StatusLine {
    /// Stamp a line with the local wall-clock time (UTC when the offset is unknown).
    pub fn now(message: impl Into<String>, level: StatusLevel) -> Self {
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        Self {
            timestamp: now.format(STATUS_TIME_FORMAT).unwrap_or_default(),
            message: message.into(),
            level,
        }
    }

    /// `"[14:02:11] message"`
    pub fn render(&self) -> String {
        format!("[{}] {}", self.timestamp, self.message)
    }
}

/// Enablement and labels of the command buttons, derived from state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlStates {
    pub start_enabled: bool,
    pub pause_enabled: bool,
    pub stop_enabled: bool,
    pub pause_label: &'static str,
}

/// Single source of truth for the control surface.
///
/// Wrapped by [`crate::state::StateManager`]; mutate only through it so change
/// events reach the renderers.
#[derive(Clone, Debug, Default)]
pub struct AppState {
    // Selection
    pub selected_files: Vec<FileRef>,
    pub formats: OutputFormats,

    // Run state
    pub run_state: RunState,

    // A confirmed stop is still waiting for the backend; start stays disabled
    pub stop_pending: bool,

    // Progress bars
    pub overall: ProgressBar,
    pub current: ProgressBar,

    // Status log (append-only; capped when `status_log_limit` is non-zero)
    pub status_log: Vec<StatusLine>,
    pub status_log_limit: usize,

    // Location of the last report announced by a `complete` event
    pub last_report: Option<String>,
}

impl AppState {
    /// Start is enabled only while Idle, with no stop outstanding and a non-empty selection.
    pub fn can_start(&self) -> bool {
        self.run_state == RunState::Idle && !self.stop_pending && !self.selected_files.is_empty()
    }

    pub fn controls(&self) -> ControlStates {
        ControlStates {
            start_enabled: self.can_start(),
            pause_enabled: self.run_state.is_active(),
            stop_enabled: self.run_state.is_active(),
            pause_label: self.pause_label(),
        }
    }

    pub fn pause_label(&self) -> &'static str {
        if self.run_state == RunState::Paused {
            "Resume"
        } else {
            "Pause"
        }
    }

    pub fn overall_label(&self) -> String {
        self.overall.label("files")
    }

    pub fn current_label(&self) -> String {
        self.current.label("images")
    }

    /// Remove the file at `index`, preserving the order of the rest.
    ///
    /// Returns `None` without touching the list when `index` is out of bounds.
    pub fn remove_file(&mut self, index: usize) -> Option<FileRef> {
        if index < self.selected_files.len() {
            Some(self.selected_files.remove(index))
        } else {
            None
        }
    }

    /// Append a line, dropping the oldest lines once the cap is exceeded.
    pub fn push_status(&mut self, line: StatusLine) {
        self.status_log.push(line);
        if self.status_log_limit > 0 && self.status_log.len() > self.status_log_limit {
            let excess = self.status_log.len() - self.status_log_limit;
            self.status_log.drain(..excess);
        }
    }

    /// Reset progress bars and the status log for a fresh run.
    pub fn reset_progress(&mut self) {
        self.overall = ProgressBar::default();
        self.current = ProgressBar::default();
        self.status_log.clear();
        self.last_report = None;
    }
}
