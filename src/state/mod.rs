// State management module
//
// This module provides the StateManager which wraps AppState with thread-safe access
// using Arc<RwLock<T>> and emits change events for the renderers.

use crate::models::{AppState, FileRef, OutputFormats, ProgressBar, RunState, StatusLevel, StatusLine};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

/// Change events emitted when state is modified
///
/// Renderers subscribe to these instead of polling the state.
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    /// The file selection was edited
    SelectionChanged { count: usize },

    /// A format checkbox changed
    FormatsChanged { convert_pdf: bool, convert_md: bool },

    /// The run state moved along one edge of the state machine
    RunStateChanged { from: RunState, to: RunState },

    /// Overall (file count) progress changed
    OverallProgress { current: usize, total: usize },

    /// Current-file sub-progress changed
    CurrentProgress { current: usize, total: usize },

    /// A line was appended to the status log
    StatusAppended { line: StatusLine },

    /// The status log was emptied for a new run
    StatusCleared,

    /// A completion event announced a report location
    ReportReady { path: String },

    /// A confirmed stop started or finished waiting on the backend
    StopPending { pending: bool },
}

/// Thread-safe state manager with event emission
///
/// - Provides thread-safe access to [`AppState`] via `Arc<RwLock<T>>`
/// - Detects state changes and emits [`StateChange`] events
/// - Supports subscribing to state changes via tokio broadcast channels
///
/// # Related Types
///
/// - [`crate::control::ConversionController`]: the only writer in the application
/// - [`crate::ui::GuiController`]: primary consumer of state events
pub struct StateManager {
    state: Arc<RwLock<AppState>>,

    /// Broadcast channel for emitting state change events
    state_tx: broadcast::Sender<StateChange>,
}

impl StateManager {
    /// Create a new StateManager with default state
    ///
    /// The broadcast channel buffers 256 events; status-heavy jobs emit bursts.
    pub fn new() -> Self {
        let (state_tx, _) = broadcast::channel(256);
        Self {
            state: Arc::new(RwLock::new(AppState::default())),
            state_tx,
        }
    }

    /// Create a StateManager whose status log keeps at most `limit` lines (0 = unbounded)
    pub fn with_status_log_limit(limit: usize) -> Self {
        let manager = Self::new();
        manager.update(|state| state.status_log_limit = limit);
        manager
    }

    /// Get a read-only snapshot of the current state
    pub fn snapshot(&self) -> AppState {
        self.read(|state| state.clone())
    }

    /// Execute a function with read access to the state
    ///
    /// # Example
    /// ```ignore
    /// let can_start = state_manager.read(|state| state.can_start());
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&AppState) -> R,
    {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    /// Update the state and emit change events
    ///
    /// # Returns
    /// A vector of StateChange events that were emitted
    pub fn update<F>(&self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut AppState),
    {
        self.update_with(update_fn).1
    }

    /// Update the state under a single write lock and return the closure's result
    ///
    /// Check-then-act sequences (such as the start precondition) go through here
    /// so two callers can never both observe Idle and both start a run.
    pub fn update_with<F, R>(&self, update_fn: F) -> (R, Vec<StateChange>)
    where
        F: FnOnce(&mut AppState) -> R,
    {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let old_state = state.clone();

        let result = update_fn(&mut state);

        let changes = self.detect_changes(&old_state, &state);
        for change in &changes {
            // Ignore send errors - it's OK if no one is listening
            let _ = self.state_tx.send(change.clone());
        }

        (result, changes)
    }

    /// Subscribe to state change events
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    /// Detect what changed between two states and generate events
    fn detect_changes(&self, old: &AppState, new: &AppState) -> Vec<StateChange> {
        let mut changes = Vec::new();

        if old.selected_files != new.selected_files {
            changes.push(StateChange::SelectionChanged {
                count: new.selected_files.len(),
            });
        }

        if old.formats != new.formats {
            changes.push(StateChange::FormatsChanged {
                convert_pdf: new.formats.convert_pdf,
                convert_md: new.formats.convert_md,
            });
        }

        if old.run_state != new.run_state {
            changes.push(StateChange::RunStateChanged {
                from: old.run_state,
                to: new.run_state,
            });
        }

        if old.stop_pending != new.stop_pending {
            changes.push(StateChange::StopPending {
                pending: new.stop_pending,
            });
        }

        if old.overall != new.overall {
            changes.push(StateChange::OverallProgress {
                current: new.overall.current,
                total: new.overall.total,
            });
        }

        if old.current != new.current {
            changes.push(StateChange::CurrentProgress {
                current: new.current.current,
                total: new.current.total,
            });
        }

        if !old.status_log.is_empty() && new.status_log.is_empty() {
            changes.push(StateChange::StatusCleared);
        }

        if old.last_report != new.last_report {
            if let Some(path) = &new.last_report {
                changes.push(StateChange::ReportReady { path: path.clone() });
            }
        }

        changes
    }

    // Convenience methods for common state updates

    /// Append files to the selection (duplicates are kept)
    pub fn select_files(&self, files: Vec<FileRef>) -> Vec<StateChange> {
        self.update(|state| state.selected_files.extend(files))
    }

    /// Remove one file by index; out-of-bounds indices change nothing
    pub fn remove_file(&self, index: usize) -> (Option<FileRef>, Vec<StateChange>) {
        self.update_with(|state| state.remove_file(index))
    }

    pub fn clear_selection(&self) -> Vec<StateChange> {
        self.update(|state| state.selected_files.clear())
    }

    pub fn set_formats(&self, formats: OutputFormats) -> Vec<StateChange> {
        self.update(|state| state.formats = formats)
    }

    pub fn set_run_state(&self, run_state: RunState) -> Vec<StateChange> {
        self.update(|state| state.run_state = run_state)
    }

    pub fn set_overall(&self, current: usize, total: usize) -> Vec<StateChange> {
        self.update(|state| state.overall = ProgressBar::new(current, total))
    }

    pub fn set_current(&self, current: usize, total: usize) -> Vec<StateChange> {
        self.update(|state| state.current = ProgressBar::new(current, total))
    }

    /// Append a timestamped line to the status log
    ///
    /// The log is not deduplicated: the same message twice yields two lines.
    pub fn append_status(&self, message: impl Into<String>, level: StatusLevel) -> Vec<StateChange> {
        let line = StatusLine::now(message, level);
        let mut changes = self.update(|state| state.push_status(line.clone()));

        let appended = StateChange::StatusAppended { line };
        let _ = self.state_tx.send(appended.clone());
        changes.push(appended);

        changes
    }

    /// Record the report location from a completion event
    pub fn set_report(&self, path: String) -> Vec<StateChange> {
        self.update(|state| state.last_report = Some(path))
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

// Make StateManager cloneable for sharing across threads
impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            state_tx: self.state_tx.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(names: &[&str]) -> Vec<FileRef> {
        names.iter().map(|n| FileRef::new(*n, None)).collect()
    }

    #[test]
    fn test_new_state_manager() {
        let manager = StateManager::new();
        let state = manager.snapshot();

        assert_eq!(state.run_state, RunState::Idle);
        assert!(state.selected_files.is_empty());
        assert!(state.status_log.is_empty());
    }

    #[test]
    fn test_select_files_appends() {
        let manager = StateManager::new();
        manager.select_files(files(&["a.html"]));
        let changes = manager.select_files(files(&["a.html", "b.html"]));

        assert_eq!(changes, vec![StateChange::SelectionChanged { count: 3 }]);
        let names: Vec<_> = manager.read(|s| s.selected_files.iter().map(|f| f.name.clone()).collect());
        assert_eq!(names, vec!["a.html", "a.html", "b.html"]);
    }

    #[test]
    fn test_remove_out_of_bounds_emits_nothing() {
        let manager = StateManager::new();
        manager.select_files(files(&["a.html"]));

        let (removed, changes) = manager.remove_file(5);
        assert!(removed.is_none());
        assert!(changes.is_empty());
        assert_eq!(manager.read(|s| s.selected_files.len()), 1);
    }

    #[test]
    fn test_run_state_change_detection() {
        let manager = StateManager::new();

        let changes = manager.set_run_state(RunState::Running);
        assert_eq!(
            changes,
            vec![StateChange::RunStateChanged {
                from: RunState::Idle,
                to: RunState::Running
            }]
        );

        // Same value again is not a change
        assert!(manager.set_run_state(RunState::Running).is_empty());
    }

    #[test]
    fn test_progress_change_detection() {
        let manager = StateManager::new();

        let changes = manager.set_overall(1, 4);
        assert_eq!(changes, vec![StateChange::OverallProgress { current: 1, total: 4 }]);

        let changes = manager.set_current(2, 8);
        assert_eq!(changes, vec![StateChange::CurrentProgress { current: 2, total: 8 }]);
    }

    #[test]
    fn test_append_status_is_not_deduplicated() {
        let manager = StateManager::new();
        manager.append_status("same", StatusLevel::Info);
        let changes = manager.append_status("same", StatusLevel::Info);

        assert!(matches!(changes.last(), Some(StateChange::StatusAppended { .. })));
        assert_eq!(manager.read(|s| s.status_log.len()), 2);
    }

    #[test]
    fn test_status_cleared_detection() {
        let manager = StateManager::new();
        manager.append_status("old line", StatusLevel::Warning);

        let changes = manager.update(|s| s.reset_progress());
        assert!(changes.contains(&StateChange::StatusCleared));
    }

    #[test]
    fn test_update_with_returns_closure_result() {
        let manager = StateManager::new();
        let (was_idle, changes) = manager.update_with(|s| {
            let idle = s.run_state == RunState::Idle;
            s.run_state = RunState::Running;
            idle
        });

        assert!(was_idle);
        assert_eq!(changes.len(), 1);
    }

    #[test]
    fn test_report_ready() {
        let manager = StateManager::new();
        let changes = manager.set_report("/out/report.yaml".to_string());
        assert_eq!(
            changes,
            vec![StateChange::ReportReady {
                path: "/out/report.yaml".to_string()
            }]
        );
    }

    #[test]
    fn test_subscribe_to_changes() {
        let manager = StateManager::new();
        let mut rx = manager.subscribe();

        manager.set_formats(OutputFormats::new(false, true));

        let event = rx.try_recv();
        assert!(matches!(
            event,
            Ok(StateChange::FormatsChanged {
                convert_pdf: false,
                convert_md: true
            })
        ));
    }

    #[test]
    fn test_clone_state_manager() {
        let manager1 = StateManager::new();
        let manager2 = manager1.clone();

        manager1.set_overall(3, 10);

        let state = manager2.snapshot();
        assert_eq!(state.overall, ProgressBar::new(3, 10));
    }
}
