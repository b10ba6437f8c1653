// EventLoopBridge - marshals work between the tokio runtime and the Slint event loop
//
// Slint owns the main thread; the job runner, the progress dispatcher and
// command futures live on tokio. Slint callbacks hand futures to tokio through
// `spawn_async`, and anything that touches the window comes back through
// `update_ui`, which queues it onto the event loop.

use crate::metrics::Metrics;
use slint::{ComponentHandle, Weak};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;

type UiUpdate<T> = Box<dyn FnOnce(&T) + Send>;

/// Queued UI updates before new ones are dropped
pub const UI_UPDATE_CAPACITY: usize = 256;

/// Sending half of the window update queue
///
/// Never blocks: when the queue is full or the forwarding thread is gone the
/// update is dropped and counted. Renderers rebuild from a state snapshot, so
/// a later update repairs anything lost.
struct UpdateQueue<T> {
    tx: mpsc::Sender<UiUpdate<T>>,
    metrics: Arc<Metrics>,
}

impl<T> Clone for UpdateQueue<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

impl<T> UpdateQueue<T> {
    fn bounded(capacity: usize, metrics: Arc<Metrics>) -> (Self, mpsc::Receiver<UiUpdate<T>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx, metrics }, rx)
    }

    /// Returns `false` when the update was dropped
    fn push(&self, update: UiUpdate<T>) -> bool {
        match self.tx.try_send(update) {
            Ok(()) => {
                self.metrics.record_ui_update();
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.metrics.record_ui_channel_full();
                tracing::warn!("UI update queue full - dropping update");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.metrics.record_ui_channel_full();
                tracing::warn!("Window is gone - dropping UI update");
                false
            }
        }
    }
}

/// Owns the forwarding thread that feeds the Slint event loop
///
/// # Example
/// ```ignore
/// let bridge = EventLoopBridge::new(&ui, runtime.handle().clone(), metrics);
/// let handle = bridge.clone_handle();
///
/// ui.on_start_conversion(move || {
///     let ui_handle = handle.clone();
///     handle.spawn_async(move || async move {
///         let _ = controller.start().await;
///         ui_handle.update_ui(|ui| ui.set_start_enabled(false));
///     });
/// });
/// ```
pub struct EventLoopBridge<T: ComponentHandle> {
    handle: EventLoopBridgeHandle<T>,
}

impl<T: ComponentHandle + 'static> EventLoopBridge<T> {
    /// Create the bridge and its forwarding thread.
    ///
    /// The thread drains the bounded update queue into
    /// `upgrade_in_event_loop` and exits once the event loop is gone.
    pub fn new(ui: &T, tokio_handle: tokio::runtime::Handle, metrics: Arc<Metrics>) -> Self {
        let ui_weak = ui.as_weak();
        let (updates, mut pending) = UpdateQueue::bounded(UI_UPDATE_CAPACITY, metrics);

        let window = ui_weak.clone();
        let forwarder = std::thread::Builder::new()
            .name("ui-forwarder".to_string())
            .spawn(move || {
                tracing::debug!("UI forwarder started");

                while let Some(apply) = pending.blocking_recv() {
                    if let Err(e) = window.upgrade_in_event_loop(move |ui| apply(&ui)) {
                        tracing::warn!("Event loop rejected UI update: {:?}", e);
                        break;
                    }
                }

                tracing::debug!("UI forwarder stopped");
            });
        if let Err(e) = forwarder {
            tracing::error!("Failed to start UI forwarder, window updates will be dropped: {}", e);
        }

        Self {
            handle: EventLoopBridgeHandle {
                ui_weak,
                tokio_handle,
                updates,
            },
        }
    }

    pub fn update_ui<F>(&self, update: F)
    where
        F: FnOnce(&T) + Send + 'static,
    {
        self.handle.update_ui(update);
    }

    pub fn spawn_async<F, Fut>(&self, future_factory: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn_async(future_factory);
    }

    /// Cloneable handle for capture in Slint callbacks and worker threads
    pub fn clone_handle(&self) -> EventLoopBridgeHandle<T> {
        self.handle.clone()
    }
}

/// Cheap cloneable side of the bridge
pub struct EventLoopBridgeHandle<T: ComponentHandle> {
    ui_weak: Weak<T>,
    tokio_handle: tokio::runtime::Handle,
    updates: UpdateQueue<T>,
}

// Weak<T> is Clone for any component; derive would demand T: Clone
impl<T: ComponentHandle> Clone for EventLoopBridgeHandle<T> {
    fn clone(&self) -> Self {
        Self {
            ui_weak: self.ui_weak.clone(),
            tokio_handle: self.tokio_handle.clone(),
            updates: self.updates.clone(),
        }
    }
}

impl<T: ComponentHandle + 'static> EventLoopBridgeHandle<T> {
    /// Queue a window mutation from any thread
    pub fn update_ui<F>(&self, update: F)
    where
        F: FnOnce(&T) + Send + 'static,
    {
        self.updates.push(Box::new(update));
    }

    /// Run a command future on tokio, off the event loop
    pub fn spawn_async<F, Fut>(&self, future_factory: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.tokio_handle.spawn(async move { future_factory().await });
    }

    pub fn ui_weak(&self) -> &Weak<T> {
        &self.ui_weak
    }

    pub fn tokio_handle(&self) -> &tokio::runtime::Handle {
        &self.tokio_handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    // A real component needs a windowing system; a plain value stands in for the window here.

    #[test]
    fn test_queued_updates_are_counted() {
        let metrics = Arc::new(Metrics::new());
        let (queue, mut pending) = UpdateQueue::<u32>::bounded(4, Arc::clone(&metrics));

        assert!(queue.push(Box::new(|_: &u32| {})));
        assert!(queue.push(Box::new(|_: &u32| {})));

        assert_eq!(metrics.ui_updates.load(Ordering::Relaxed), 2);
        assert!(pending.try_recv().is_ok());
    }

    #[test]
    fn test_full_queue_drops_instead_of_blocking() {
        let metrics = Arc::new(Metrics::new());
        let (queue, _pending) = UpdateQueue::<u32>::bounded(1, Arc::clone(&metrics));

        assert!(queue.push(Box::new(|_: &u32| {})));
        assert!(!queue.push(Box::new(|_: &u32| {})));

        assert_eq!(metrics.ui_updates.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.ui_update_channel_full.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_closed_queue_drops_update() {
        let metrics = Arc::new(Metrics::new());
        let (queue, pending) = UpdateQueue::<u32>::bounded(4, Arc::clone(&metrics));
        drop(pending);

        assert!(!queue.push(Box::new(|_: &u32| {})));
        assert_eq!(metrics.ui_update_channel_full.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_updates_apply_in_order() {
        let metrics = Arc::new(Metrics::new());
        let (queue, mut pending) = UpdateQueue::<std::sync::Mutex<Vec<u32>>>::bounded(8, metrics);

        for i in 0..3 {
            queue.push(Box::new(move |log: &std::sync::Mutex<Vec<u32>>| {
                log.lock().unwrap().push(i)
            }));
        }
        drop(queue);

        let log = std::sync::Mutex::new(Vec::new());
        while let Ok(apply) = pending.try_recv() {
            apply(&log);
        }
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
    }
}
