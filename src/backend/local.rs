// LocalBackend - in-process implementation of the conversion backend API
//
// One job at a time. The job runs on a tokio task and talks back exclusively
// through the registered progress handler. Pause and stop are watch channels the
// task checks between files; stop also interrupts the document step in flight.

use crate::backend::report::{ConversionReport, FileResult, FormatStatus};
use crate::backend::{BridgeError, ConversionBackend, ProgressHandler};
use crate::models::{
    ConverterSettings, FileRef, OutputFormats, ProgressEvent, StartAck, StartRequest, StatusLevel,
};
use crate::services::DocumentConverter;
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// Status line the job emits when it honours a stop request
pub const ABORTED_MESSAGE: &str = "Conversion aborted";

/// Directories and timeouts used by the job runner
#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub output_dir: Utf8PathBuf,
    pub report_dir: Utf8PathBuf,

    /// Relative selections resolve against this directory
    pub input_dir: Utf8PathBuf,

    /// How long `stop_conversion` waits for the job before aborting it
    pub stop_timeout: Duration,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self::from_settings(&ConverterSettings::default())
    }
}

impl BackendSettings {
    pub fn from_settings(settings: &ConverterSettings) -> Self {
        Self {
            output_dir: Utf8PathBuf::from(&settings.output_dir),
            report_dir: Utf8PathBuf::from(&settings.report_dir),
            input_dir: Utf8PathBuf::from(&settings.input_dir),
            stop_timeout: Duration::from_secs(settings.stop_timeout as u64),
        }
    }
}

/// Shared slot for the registered progress handler
#[derive(Clone, Default)]
struct Emitter {
    handler: Arc<RwLock<Option<ProgressHandler>>>,
}

impl Emitter {
    fn replace(&self, handler: ProgressHandler) {
        let mut slot = self.handler.write().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(handler);
    }

    fn emit(&self, event: ProgressEvent) {
        // Clone the handler out so the lock is not held while it runs
        let handler = self
            .handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        match handler {
            Some(handler) => handler(event),
            None => tracing::debug!("No progress handler registered, dropping {:?}", event),
        }
    }

    fn status(&self, message: impl Into<String>, level: StatusLevel) {
        self.emit(ProgressEvent::status(message, level));
    }
}

struct JobHandle {
    task: JoinHandle<()>,
    pause_tx: watch::Sender<bool>,
    stop_tx: watch::Sender<bool>,
}

/// In-process conversion backend
///
/// # Example
/// ```ignore
/// let backend = LocalBackend::new(ExternalToolConverter::from_settings(&settings),
///                                 BackendSettings::from_settings(&settings));
/// backend.set_progress_handler(handler).await?;
/// let ack = backend.start_conversion(request).await?;
/// ```
pub struct LocalBackend<C: DocumentConverter + 'static> {
    converter: Arc<C>,
    settings: BackendSettings,
    emitter: Emitter,
    job: Mutex<Option<JobHandle>>,
}

impl<C: DocumentConverter + 'static> LocalBackend<C> {
    pub fn new(converter: C, settings: BackendSettings) -> Self {
        Self::with_shared_converter(Arc::new(converter), settings)
    }

    pub fn with_shared_converter(converter: Arc<C>, settings: BackendSettings) -> Self {
        Self {
            converter,
            settings,
            emitter: Emitter::default(),
            job: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &BackendSettings {
        &self.settings
    }

    /// Whether a job task is still alive
    pub async fn is_running(&self) -> bool {
        self.job
            .lock()
            .await
            .as_ref()
            .is_some_and(|job| !job.task.is_finished())
    }
}

#[async_trait]
impl<C: DocumentConverter + 'static> ConversionBackend for LocalBackend<C> {
    async fn start_conversion(&self, request: StartRequest) -> Result<StartAck, BridgeError> {
        let mut job = self.job.lock().await;

        if job.as_ref().is_some_and(|current| !current.task.is_finished()) {
            tracing::warn!("Start requested while a conversion is running - rejecting");
            return Ok(StartAck::rejected("Conversion already in progress"));
        }

        if request.files.is_empty() {
            return Ok(StartAck::rejected("No files to convert"));
        }

        let formats = request.formats();
        if !formats.any() {
            return Ok(StartAck::rejected("No output format selected"));
        }

        let (pause_tx, pause_rx) = watch::channel(false);
        let (stop_tx, stop_rx) = watch::channel(false);

        let job_spec = Job {
            converter: Arc::clone(&self.converter),
            settings: self.settings.clone(),
            emitter: self.emitter.clone(),
            files: request.files,
            formats,
            pause_rx,
            stop_rx,
        };

        let task = tokio::spawn(run_job(job_spec));
        *job = Some(JobHandle {
            task,
            pause_tx,
            stop_tx,
        });

        Ok(StartAck::accepted())
    }

    async fn toggle_pause(&self, paused: bool) -> Result<(), BridgeError> {
        let job = self.job.lock().await;
        match job.as_ref() {
            Some(handle) => {
                handle.pause_tx.send_replace(paused);
                tracing::info!("Job {}", if paused { "paused" } else { "resumed" });
            }
            None => tracing::debug!("Pause toggled with no job - ignoring"),
        }
        Ok(())
    }

    async fn stop_conversion(&self) -> Result<(), BridgeError> {
        let mut job = self.job.lock().await;
        let Some(mut handle) = job.take() else {
            tracing::debug!("Stop requested with no job - ignoring");
            return Ok(());
        };

        handle.stop_tx.send_replace(true);

        match timeout(self.settings.stop_timeout, &mut handle.task).await {
            Ok(Ok(())) => tracing::info!("Job stopped"),
            Ok(Err(e)) => tracing::warn!("Job task ended abnormally: {}", e),
            Err(_) => {
                tracing::warn!(
                    "Job did not stop within {:?} - aborting task",
                    self.settings.stop_timeout
                );
                handle.task.abort();
            }
        }

        Ok(())
    }

    async fn set_progress_handler(&self, handler: ProgressHandler) -> Result<(), BridgeError> {
        self.emitter.replace(handler);
        tracing::info!("Progress handler registered");
        Ok(())
    }
}

struct Job<C: DocumentConverter + 'static> {
    converter: Arc<C>,
    settings: BackendSettings,
    emitter: Emitter,
    files: Vec<FileRef>,
    formats: OutputFormats,
    pause_rx: watch::Receiver<bool>,
    stop_rx: watch::Receiver<bool>,
}

enum Step<T> {
    Done(T),
    Stopped,
}

async fn run_job<C: DocumentConverter + 'static>(job: Job<C>) {
    let Job {
        converter,
        settings,
        emitter,
        files,
        formats,
        mut pause_rx,
        mut stop_rx,
    } = job;

    let total = files.len();
    let mut results = Vec::with_capacity(total);
    let mut aborted = false;

    tracing::info!(
        "Conversion job started: {} files, formats {:?}",
        total,
        formats.requested()
    );

    for (index, file) in files.iter().enumerate() {
        if wait_while_paused(&mut pause_rx, &mut stop_rx).await {
            aborted = true;
            break;
        }

        emitter.emit(ProgressEvent::Overall {
            current: index,
            total,
        });
        emitter.status(format!("Starting: {}", file.name), StatusLevel::Info);

        let source = resolve_source(file, &settings.input_dir);
        if !source.exists() {
            let message = format!("File not found: {}", source);
            emitter.status(&message, StatusLevel::Error);
            results.push(FileResult::failed(&file.name, message));
            continue;
        }

        match convert_file(&*converter, &settings, &emitter, &mut stop_rx, file, &source, formats)
            .await
        {
            Step::Done(result) => results.push(result),
            Step::Stopped => {
                aborted = true;
                break;
            }
        }
    }

    if aborted {
        tracing::warn!("Conversion job stopped after {} of {} files", results.len(), total);
        emitter.status(ABORTED_MESSAGE, StatusLevel::Error);
    } else {
        emitter.emit(ProgressEvent::Overall {
            current: total,
            total,
        });
    }

    let report = ConversionReport::from_results(results);
    let report_path = match report.write(&settings.report_dir) {
        Ok(path) => path.to_string(),
        Err(e) => {
            tracing::error!("Failed to write conversion report: {:#}", e);
            emitter.status(format!("Failed to write report: {}", e), StatusLevel::Error);
            String::new()
        }
    };

    emitter.emit(ProgressEvent::Complete { report_path });
    tracing::info!("Conversion job finished");
}

/// Convert one existing source into every requested format
async fn convert_file<C: DocumentConverter>(
    converter: &C,
    settings: &BackendSettings,
    emitter: &Emitter,
    stop_rx: &mut watch::Receiver<bool>,
    file: &FileRef,
    source: &Utf8Path,
    formats: OutputFormats,
) -> Step<FileResult> {
    let name = file.name.as_str();

    // Only the first sub-progress event of a file names it
    let first_progress = AtomicBool::new(true);
    let report_progress = |done: usize, total: usize| {
        let filename = first_progress
            .swap(false, Ordering::Relaxed)
            .then(|| name.to_string());
        emitter.emit(ProgressEvent::Current {
            current: done,
            total,
            filename,
        });
    };

    let document = match until_stopped(stop_rx, converter.prepare(source, &report_progress)).await {
        Step::Stopped => return Step::Stopped,
        Step::Done(Ok(document)) => document,
        Step::Done(Err(e)) => {
            emitter.status(format!("{} conversion failed: {}", name, e), StatusLevel::Error);
            return Step::Done(FileResult::failed(name, e.to_string()));
        }
    };

    let mut result = FileResult::new(name);
    result.total_images = document.total_assets;
    result.downloaded_images = document.fetched_assets;

    let requested = formats.requested();
    for format in &requested {
        let label = format.label();
        emitter.status(format!("Converting {} to {}", name, label), StatusLevel::Info);

        let rendered = converter.render(&document, *format, &settings.output_dir);
        match until_stopped(stop_rx, rendered).await {
            Step::Stopped => return Step::Stopped,
            Step::Done(Ok(path)) => {
                tracing::info!("{} written to {}", label, path);
                result.set_status(*format, FormatStatus::Success);
                emitter.status(
                    format!("{} conversion succeeded: {}", label, name),
                    StatusLevel::Success,
                );
            }
            Step::Done(Err(e)) => {
                tracing::warn!("{} conversion of {} failed: {}", label, name, e);
                result.set_status(*format, FormatStatus::Failed);
                result.errors.push(format!("{} conversion error: {}", label, e));
                emitter.status(
                    format!("{} conversion failed: {} - {}", label, name, e),
                    StatusLevel::Error,
                );
            }
        }
    }

    let labels_with = |status: FormatStatus| {
        requested
            .iter()
            .filter(|f| result.status(**f) == status)
            .map(|f| f.label())
            .collect::<Vec<_>>()
            .join(", ")
    };
    let succeeded = labels_with(FormatStatus::Success);
    let failed = labels_with(FormatStatus::Failed);

    if result.errors.is_empty() {
        emitter.status(
            format!("{}: all conversions succeeded ({})", name, succeeded),
            StatusLevel::Success,
        );
    } else if !succeeded.is_empty() {
        emitter.status(
            format!("{}: partially succeeded ({} succeeded, {} failed)", name, succeeded, failed),
            StatusLevel::Warning,
        );
    } else {
        emitter.status(
            format!("{}: conversion failed ({})", name, failed),
            StatusLevel::Error,
        );
    }

    Step::Done(result)
}

/// Block while paused. Returns `true` when a stop was requested.
async fn wait_while_paused(
    pause_rx: &mut watch::Receiver<bool>,
    stop_rx: &mut watch::Receiver<bool>,
) -> bool {
    loop {
        if *stop_rx.borrow_and_update() {
            return true;
        }
        if !*pause_rx.borrow_and_update() {
            return false;
        }

        tracing::debug!("Job paused - waiting for resume or stop");
        tokio::select! {
            changed = pause_rx.changed() => {
                if changed.is_err() {
                    return false;
                }
            }
            changed = stop_rx.changed() => {
                if changed.is_err() {
                    return false;
                }
            }
        }
    }
}

/// Race `work` against a stop request
async fn until_stopped<F: Future>(stop_rx: &mut watch::Receiver<bool>, work: F) -> Step<F::Output> {
    if *stop_rx.borrow_and_update() {
        return Step::Stopped;
    }

    tokio::select! {
        output = work => Step::Done(output),
        _ = stop_requested(stop_rx) => Step::Stopped,
    }
}

async fn stop_requested(stop_rx: &mut watch::Receiver<bool>) {
    if stop_rx.wait_for(|stop| *stop).await.is_err() {
        // Sender gone without a stop: never resolves
        std::future::pending::<()>().await;
    }
}

/// Absolute paths are used as-is; anything else resolves inside the input directory
fn resolve_source(file: &FileRef, input_dir: &Utf8Path) -> Utf8PathBuf {
    let path = Utf8PathBuf::from(&file.path);
    if path.is_absolute() || path.starts_with(input_dir) {
        path
    } else {
        input_dir.join(&file.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_source() {
        let input_dir = Utf8Path::new("article_html");

        let absolute = FileRef::new("a.html", Some("/data/a.html".to_string()));
        assert_eq!(resolve_source(&absolute, input_dir), Utf8PathBuf::from("/data/a.html"));

        let bare = FileRef::new("a.html", None);
        assert_eq!(resolve_source(&bare, input_dir), Utf8PathBuf::from("article_html/a.html"));

        let inside = FileRef::new("a.html", Some("article_html/sub/a.html".to_string()));
        assert_eq!(
            resolve_source(&inside, input_dir),
            Utf8PathBuf::from("article_html/sub/a.html")
        );
    }

    #[test]
    fn test_backend_settings_from_config() {
        let mut config = ConverterSettings::default();
        config.stop_timeout = 2;
        config.output_dir = "converted".to_string();

        let settings = BackendSettings::from_settings(&config);
        assert_eq!(settings.stop_timeout, Duration::from_secs(2));
        assert_eq!(settings.output_dir, Utf8PathBuf::from("converted"));
        assert_eq!(settings.report_dir, Utf8PathBuf::from("output/report"));
    }

    #[tokio::test]
    async fn test_wait_while_paused_returns_on_resume() {
        let (pause_tx, mut pause_rx) = watch::channel(true);
        let (_stop_tx, mut stop_rx) = watch::channel(false);

        let resume = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            pause_tx.send_replace(false);
            pause_tx
        });

        assert!(!wait_while_paused(&mut pause_rx, &mut stop_rx).await);
        let _ = resume.await;
    }

    #[tokio::test]
    async fn test_wait_while_paused_returns_on_stop() {
        let (_pause_tx, mut pause_rx) = watch::channel(true);
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let stop = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            stop_tx.send_replace(true);
            stop_tx
        });

        assert!(wait_while_paused(&mut pause_rx, &mut stop_rx).await);
        let _ = stop.await;
    }

    #[tokio::test]
    async fn test_until_stopped_interrupts_pending_work() {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        stop_tx.send_replace(true);

        let step = until_stopped(&mut stop_rx, std::future::pending::<()>()).await;
        assert!(matches!(step, Step::Stopped));
    }

    #[test]
    fn test_emit_without_handler_is_dropped() {
        let emitter = Emitter::default();
        // Must not panic
        emitter.status("nobody listening", StatusLevel::Info);
    }
}
