//! Background loop plumbing shared by the telemetry monitor and keep-alive

use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Handle to one running loop task
struct Worker {
    stop: watch::Sender<bool>,
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// At most one instance of a named loop. Starting while running is a no-op;
/// a loop that ended on its own may be started again.
pub(crate) struct LoopSlot {
    name: &'static str,
    worker: Mutex<Option<Worker>>,
}

impl LoopSlot {
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            name,
            worker: Mutex::new(None),
        }
    }

    /// Spawn `body` unless the loop is already running. The body gets a stop
    /// receiver that flips to `true` when a stop is requested.
    pub(crate) fn start<F, Fut>(&self, body: F) -> bool
    where
        F: FnOnce(watch::Receiver<bool>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut slot = self.worker.lock();
        if slot.as_ref().is_some_and(|w| w.running.load(Ordering::Acquire)) {
            debug!("{} already running", self.name);
            return false;
        }

        let (stop, stop_rx) = watch::channel(false);
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let name = self.name;
        let future = body(stop_rx);
        let handle = tokio::spawn(async move {
            future.await;
            flag.store(false, Ordering::Release);
            debug!("{} stopped", name);
        });

        *slot = Some(Worker {
            stop,
            running,
            handle,
        });
        true
    }

    pub(crate) fn is_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|w| w.running.load(Ordering::Acquire))
    }

    /// Request a stop and wait for the task to finish
    pub(crate) async fn stop(&self) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        worker.stop.send_replace(true);
        if let Err(e) = worker.handle.await {
            warn!("{} task ended abnormally: {}", self.name, e);
        }
    }
}

/// Resolve once `signal` reads true, or once its sender is gone
pub(crate) async fn raised(signal: &mut watch::Receiver<bool>) {
    let _ = signal.wait_for(|raised| *raised).await;
}
