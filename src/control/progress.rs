// Progress channel - ordered, non-blocking delivery of backend events
//
// The backend calls the handler from its own task. The handler only enqueues;
// a single dispatcher task applies events to the controller one at a time, so
// production order is preserved and the job never waits on UI state.
//
// Each event is stamped with the controller's run generation when it is
// enqueued. Events stamped before a stop or a new start are dropped by the
// controller even if the dispatcher only reaches them later.

use crate::backend::ProgressHandler;
use crate::control::ConversionController;
use crate::models::ProgressEvent;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

enum Message {
    Event { generation: u64, event: ProgressEvent },
    Flush(oneshot::Sender<()>),
}

/// Single-consumer dispatcher between a backend and a [`ConversionController`]
pub struct ProgressChannel {
    tx: mpsc::UnboundedSender<Message>,
    controller: Arc<ConversionController>,
    task: JoinHandle<()>,
}

impl ProgressChannel {
    /// Spawn the dispatcher task on `handle`
    pub fn spawn(controller: Arc<ConversionController>, handle: &Handle) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

        let dispatcher = Arc::clone(&controller);
        let task = handle.spawn(async move {
            tracing::debug!("Progress dispatcher started");

            while let Some(message) = rx.recv().await {
                match message {
                    Message::Event { generation, event } => {
                        dispatcher.handle_job_event(generation, event)
                    }
                    Message::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }

            tracing::debug!("Progress dispatcher terminated");
        });

        Self { tx, controller, task }
    }

    /// Handler to register with the backend
    pub fn handler(&self) -> ProgressHandler {
        let tx = self.tx.clone();
        let controller = Arc::clone(&self.controller);
        Arc::new(move |event: ProgressEvent| {
            let generation = controller.generation();
            if tx.send(Message::Event { generation, event }).is_err() {
                tracing::debug!("Progress dispatcher has stopped - event dropped");
            }
        })
    }

    /// Wait until every event enqueued before this call has been applied
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Message::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    /// Stop the dispatcher. Events still queued are discarded.
    pub fn close(self) {
        self.task.abort();
    }
}
