//! Article Converter - batch conversion of saved articles to PDF and Markdown
//!
//! Main entry point for the GUI application.
//!
//! # Overview
//!
//! This binary crate provides the Slint GUI frontend. It initializes:
//! - Configuration loading ([`ConfigManager`])
//! - Logging infrastructure (daily file rotation + console output)
//! - Tokio async runtime (job runner, converter subprocesses, progress dispatch)
//! - State management ([`StateManager`]) and the [`ConversionController`]
//! - The in-process [`LocalBackend`] and the [`ProgressChannel`] feeding it back
//! - GUI controller ([`GuiController`])
//!
//! The application uses a hybrid threading model:
//! - **Main thread**: Runs the Slint event loop (blocking, synchronous)
//! - **Tokio workers**: Job runner, converter subprocesses, progress dispatcher
//! - **State listener**: Background std::thread for reactive UI updates
//!
//! # Configuration Files
//!
//! Expected in `Converter Data/`:
//! - `Converter Settings.yaml`: directories, formats, converter commands, timeouts
//!
//! A default file is written on first start.

use anyhow::Result;
use article_converter::backend::BackendSettings;
use article_converter::logging::{LogOptions, setup_logging};
use article_converter::models::OutputFormats;
use article_converter::services::ExternalToolConverter;
use article_converter::ui::GuiController;
use article_converter::{
    APP_NAME, ConfigManager, ConversionBackend, ConversionController, LocalBackend, Metrics,
    ProgressChannel, StateManager, VERSION,
};
use camino::{Utf8Path, Utf8PathBuf};
use std::sync::Arc;
use std::time::Duration;

const WORKER_THREADS: usize = 4;

fn main() -> Result<()> {
    // Configuration comes first so it can pick the log level
    let config_manager = ConfigManager::new("Converter Data")?;
    config_manager.ensure_user_config()?;
    let user_config = config_manager.load_user_config()?;
    let settings = user_config.converter_settings;

    let _log_guard = setup_logging(&LogOptions {
        log_dir: Utf8Path::new("logs"),
        log_prefix: "article-converter",
        debug_mode: settings.debug_mode,
        json: settings.json_logs,
        console: true,
    })?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(WORKER_THREADS)
        .thread_name("converter-worker")
        .build()?;

    tracing::info!("Tokio runtime initialized with {} worker threads", WORKER_THREADS);

    let state_manager = Arc::new(StateManager::with_status_log_limit(settings.status_log_limit));
    state_manager.set_formats(OutputFormats::new(settings.convert_pdf, settings.convert_md));
    let metrics = Arc::new(Metrics::new());

    let backend = Arc::new(LocalBackend::new(
        ExternalToolConverter::from_settings(&settings),
        BackendSettings::from_settings(&settings),
    ));
    let controller = Arc::new(ConversionController::new(
        Arc::clone(&state_manager),
        Arc::clone(&backend) as Arc<dyn ConversionBackend>,
        Arc::clone(&metrics),
    ));

    let progress = ProgressChannel::spawn(Arc::clone(&controller), runtime.handle());
    if !runtime.block_on(controller.connect(progress.handler())) {
        tracing::warn!("Running without a progress handler; job output will not be shown");
    }

    let gui = GuiController::new(
        Arc::clone(&controller),
        runtime.handle().clone(),
        Utf8PathBuf::from(&settings.input_dir),
    )?;

    tracing::info!("GUI controller initialized, launching window");

    let result = gui.run();

    tracing::info!("GUI closed, shutting down");

    if controller.run_state().is_active() {
        tracing::warn!("Window closed during conversion - stopping");
        if let Err(e) = runtime.block_on(controller.stop_confirmed()) {
            tracing::warn!("Stop during shutdown failed: {}", e);
        }
    }

    // A confirmed stop may still be waiting on the job task
    if let Err(e) = runtime.block_on(backend.stop_conversion()) {
        tracing::warn!("Backend stop during shutdown failed: {}", e);
    }

    progress.close();
    metrics.log_summary();

    runtime.shutdown_timeout(Duration::from_secs(5));

    tracing::info!("Application shutdown complete");

    result.map_err(|e| {
        tracing::error!("GUI error: {}", e);
        anyhow::anyhow!("GUI error: {}", e)
    })
}
