// Runtime metrics module
//
// Lightweight counters for the progress channel and the UI bridge

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Application metrics
///
/// Uses atomic operations so the progress dispatcher, the controller and the
/// UI bridge can all record without locks. Logged once on shutdown.
#[derive(Debug)]
pub struct Metrics {
    /// Progress events applied to state
    pub events_dispatched: AtomicU64,

    /// Progress events dropped because no job was believed active
    pub late_events_ignored: AtomicU64,

    /// Lines appended to the status log
    pub status_lines: AtomicU64,

    /// Start requests the backend accepted
    pub jobs_started: AtomicU64,

    /// Start requests refused locally or by the backend
    pub jobs_rejected: AtomicU64,

    /// Jobs that reached a completion event
    pub jobs_completed: AtomicU64,

    /// Jobs ended by a confirmed stop
    pub jobs_stopped: AtomicU64,

    /// Number of UI updates sent
    pub ui_updates: AtomicU64,

    /// UI updates dropped because the event loop was busy or gone
    pub ui_update_channel_full: AtomicU64,

    /// Application start time
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            events_dispatched: AtomicU64::new(0),
            late_events_ignored: AtomicU64::new(0),
            status_lines: AtomicU64::new(0),
            jobs_started: AtomicU64::new(0),
            jobs_rejected: AtomicU64::new(0),
            jobs_completed: AtomicU64::new(0),
            jobs_stopped: AtomicU64::new(0),
            ui_updates: AtomicU64::new(0),
            ui_update_channel_full: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_event_dispatched(&self) {
        self.events_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_late_event(&self) {
        self.late_events_ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_status_line(&self) {
        self.status_lines.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_job_started(&self) {
        self.jobs_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_job_rejected(&self) {
        self.jobs_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_job_completed(&self) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_job_stopped(&self) {
        self.jobs_stopped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a UI update
    pub fn record_ui_update(&self) {
        self.ui_updates.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a UI update that could not be delivered
    pub fn record_ui_channel_full(&self) {
        self.ui_update_channel_full.fetch_add(1, Ordering::Relaxed);
    }

    /// Get total uptime
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        let uptime = self.uptime();
        tracing::info!("=== Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", uptime.as_secs_f64());
        tracing::info!(
            "Jobs: {} started, {} rejected, {} completed, {} stopped",
            self.jobs_started.load(Ordering::Relaxed),
            self.jobs_rejected.load(Ordering::Relaxed),
            self.jobs_completed.load(Ordering::Relaxed),
            self.jobs_stopped.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Progress events: {} dispatched, {} ignored while idle, {} status lines",
            self.events_dispatched.load(Ordering::Relaxed),
            self.late_events_ignored.load(Ordering::Relaxed),
            self.status_lines.load(Ordering::Relaxed)
        );
        tracing::info!(
            "UI updates: {}, dropped: {}",
            self.ui_updates.load(Ordering::Relaxed),
            self.ui_update_channel_full.load(Ordering::Relaxed)
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
