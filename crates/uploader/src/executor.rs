//! Executors host the single active engine.
//!
//! The scheduler only talks to an executor through [`SyncRequest`]
//! snapshots in and [`ExecutorEvent`] messages out, so the background and
//! inline flavours are interchangeable.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::UploaderConfig;
use crate::engine::ReportFn;
use crate::error::UploadError;
use crate::transport::Transport;
use crate::types::{ErrorReport, ExecutorEvent, SyncRequest};
use crate::worker::UploadWorker;

/// Receives every message an executor emits.
pub type MessageHandler = Arc<dyn Fn(ExecutorEvent) + Send + Sync>;

/// Snapshots waiting for the background worker. Older ones are dropped
/// when the worker falls behind; the next tick resends the queue anyway.
const REQUEST_QUEUE_DEPTH: usize = 4;

/// Message-passing boundary between the scheduler and the transfer slot.
pub trait Executor: Send + Sync {
    /// Posts a queue snapshot.
    fn send(&self, request: SyncRequest) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;

    /// Registers the handler for progress and error messages.
    fn on_message(&self, handler: MessageHandler);

    /// Stops the active engine and releases the executor.
    fn shutdown(&self) {}
}

fn current_handler(slot: &RwLock<Option<MessageHandler>>) -> Option<MessageHandler> {
    slot.read().unwrap_or_else(PoisonError::into_inner).clone()
}

// ---------------------------------------------------------------------------
// Background
// ---------------------------------------------------------------------------

/// Executor running its worker and engines on tokio tasks.
///
/// `send` never waits for the transfer: snapshots go over a bounded
/// channel and events come back through a dispatcher task.
pub struct BackgroundExecutor {
    requests: mpsc::Sender<SyncRequest>,
    handler: Arc<RwLock<Option<MessageHandler>>>,
    cancel: CancellationToken,
}

impl BackgroundExecutor {
    /// Spawns the worker and dispatcher tasks. Must be called inside a
    /// tokio runtime.
    pub fn spawn(transport: Arc<dyn Transport>, config: Arc<UploaderConfig>) -> Self {
        let (requests, request_rx) = mpsc::channel(REQUEST_QUEUE_DEPTH);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let handler = Arc::new(RwLock::new(None));
        let cancel = CancellationToken::new();

        tokio::spawn(dispatch_events(events_rx, handler.clone()));
        tokio::spawn(run_worker(
            UploadWorker::new(transport, config),
            request_rx,
            events_tx,
            cancel.clone(),
        ));

        Self {
            requests,
            handler,
            cancel,
        }
    }
}

impl Executor for BackgroundExecutor {
    fn send(&self, request: SyncRequest) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            match self.requests.try_send(request) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    debug!("executor busy, dropping stale snapshot");
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("executor stopped, snapshot ignored");
                }
            }
        })
    }

    fn on_message(&self, handler: MessageHandler) {
        *self.handler.write().unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }

    fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for BackgroundExecutor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn dispatch_events(
    mut events: mpsc::UnboundedReceiver<ExecutorEvent>,
    handler: Arc<RwLock<Option<MessageHandler>>>,
) {
    while let Some(event) = events.recv().await {
        match current_handler(&handler) {
            Some(handler) => handler(event),
            None => debug!(?event, "no message handler registered, event dropped"),
        }
    }
}

async fn run_worker(
    mut worker: UploadWorker,
    mut requests: mpsc::Receiver<SyncRequest>,
    events: mpsc::UnboundedSender<ExecutorEvent>,
    cancel: CancellationToken,
) {
    loop {
        let request = tokio::select! {
            _ = cancel.cancelled() => break,
            request = requests.recv() => match request {
                Some(request) => request,
                None => break,
            },
        };

        let progress_tx = events.clone();
        let report: ReportFn = Arc::new(move |r| {
            let _ = progress_tx.send(ExecutorEvent::Progress(r));
        });

        let Some(mut engine) = worker.sync(&request, report) else {
            continue;
        };

        let path = engine.file_path().to_string();
        let panicked = worker.claim(&engine);
        let engine_task = tokio::spawn(async move {
            engine.run().await;
        });

        let error_tx = events.clone();
        let supervisor = tokio::spawn(async move {
            if let Err(e) = engine_task.await {
                panicked.store(true, Ordering::SeqCst);
                error!(path = %path, error = %e, "upload task failed");
                let err = UploadError::Executor(e.to_string()).to_string();
                let _ = error_tx.send(ExecutorEvent::Error(ErrorReport { err }));
            }
        });

        worker.attach(supervisor);
    }

    if let Some(path) = worker.active_path() {
        info!(path = %path, "stopping active upload");
    }
    worker.stop_active();
    info!("upload executor stopped");
}

// ---------------------------------------------------------------------------
// Inline
// ---------------------------------------------------------------------------

/// Executor that runs each started engine to completion on the caller's
/// task before `send` returns.
///
/// Messages reach the handler synchronously, which makes scheduler tests
/// deterministic. The running engine holds the worker slot, so a snapshot
/// sent while it runs (from another task, or from a tick spawned by the
/// status callback) can stop it like a background engine.
pub struct InlineExecutor {
    worker: Mutex<UploadWorker>,
    handler: RwLock<Option<MessageHandler>>,
}

impl InlineExecutor {
    pub fn new(transport: Arc<dyn Transport>, config: Arc<UploaderConfig>) -> Self {
        Self {
            worker: Mutex::new(UploadWorker::new(transport, config)),
            handler: RwLock::new(None),
        }
    }

    fn worker(&self) -> MutexGuard<'_, UploadWorker> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Executor for InlineExecutor {
    fn send(&self, request: SyncRequest) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            let handler = current_handler(&self.handler);
            let report: ReportFn = Arc::new(move |r| {
                if let Some(handler) = &handler {
                    handler(ExecutorEvent::Progress(r));
                }
            });

            let engine = {
                let mut worker = self.worker();
                worker.sync(&request, report).inspect(|engine| {
                    worker.claim(engine);
                })
            };

            if let Some(mut engine) = engine {
                engine.run().await;
                self.worker().release(engine.file_path());
            }
        })
    }

    fn on_message(&self, handler: MessageHandler) {
        *self.handler.write().unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }
}
