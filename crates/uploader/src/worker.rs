//! Active-upload slot shared by both executors.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chunkup_transfer::FileHandle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::UploaderConfig;
use crate::engine::{ChunkedUpload, ReportFn};
use crate::transport::Transport;
use crate::types::SyncRequest;

struct ActiveUpload {
    file_path: String,
    file: FileHandle,
    cancel: CancellationToken,
    /// Background task driving the engine. `None` while the engine runs on
    /// the caller's task.
    task: Option<JoinHandle<()>>,
    /// Raised by the supervisor when the engine task panicked.
    panicked: Arc<AtomicBool>,
}

impl ActiveUpload {
    fn is_finished(&self) -> bool {
        self.task.as_ref().is_some_and(JoinHandle::is_finished)
    }
}

/// Upload whose engine task panicked. It is not started again until the
/// caller re-adds the file or another entry comes first.
struct FailedUpload {
    file_path: String,
    file: FileHandle,
}

/// Decides, per snapshot, which engine holds the single transfer slot.
pub(crate) struct UploadWorker {
    transport: Arc<dyn Transport>,
    config: Arc<UploaderConfig>,
    active: Option<ActiveUpload>,
    failed: Option<FailedUpload>,
    /// Reports emitted by every engine this worker started.
    emitted: Arc<AtomicU64>,
}

impl UploadWorker {
    pub(crate) fn new(transport: Arc<dyn Transport>, config: Arc<UploaderConfig>) -> Self {
        Self {
            transport,
            config,
            active: None,
            failed: None,
            emitted: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Applies one snapshot. Returns a new engine when the slot is free and
    /// an entry is eligible; the caller [`claim`]s the slot for it before
    /// running it.
    ///
    /// A cancelled engine keeps the slot until it ends, so two engines never
    /// transfer at once. Nothing starts from a snapshot taken before all
    /// reports of earlier engines were applied.
    ///
    /// [`claim`]: UploadWorker::claim
    pub(crate) fn sync(&mut self, request: &SyncRequest, report: ReportFn) -> Option<ChunkedUpload> {
        if let Some(done) = self.active.take_if(|a| a.is_finished()) {
            if done.panicked.load(Ordering::SeqCst) {
                warn!(path = %done.file_path, "upload task panicked, not restarting it");
                self.failed = Some(FailedUpload {
                    file_path: done.file_path,
                    file: done.file,
                });
            }
        }

        let next = request.entries.iter().find(|e| e.is_eligible());

        if let Some(active) = &self.active {
            if active.cancel.is_cancelled() {
                debug!(path = %active.file_path, "waiting for stopped upload to drain");
                return None;
            }

            let still_wanted = request
                .entries
                .iter()
                .any(|e| e.file_path == active.file_path && e.runnable);

            match next {
                Some(entry) if entry.file_path == active.file_path => {}
                Some(entry) => {
                    debug!(
                        active = %active.file_path,
                        next = %entry.file_path,
                        "earlier entry became eligible, stopping active upload"
                    );
                    active.cancel.cancel();
                }
                None if still_wanted => {}
                None => {
                    debug!(path = %active.file_path, "active upload paused or deleted");
                    active.cancel.cancel();
                }
            }
            return None;
        }

        let entry = next?;
        let file = entry.file.clone()?;

        if let Some(failed) = &self.failed {
            if failed.file_path == entry.file_path && Arc::ptr_eq(&failed.file, &file) {
                debug!(path = %entry.file_path, "upload task panicked earlier, waiting for re-add");
                return None;
            }
            self.failed = None;
        }

        let emitted = self.emitted.load(Ordering::SeqCst);
        if request.reports_seen < emitted {
            debug!(seen = request.reports_seen, emitted, "stale snapshot, not starting");
            return None;
        }

        let counter = self.emitted.clone();
        let report: ReportFn = Arc::new(move |r| {
            counter.fetch_add(1, Ordering::SeqCst);
            report(r);
        });
        debug!(path = %entry.file_path, uploaded = entry.uploaded, "starting upload");
        Some(ChunkedUpload::new(
            self.transport.clone(),
            self.config.clone(),
            file,
            entry.file_path.clone(),
            entry.uploaded,
            report,
        ))
    }

    /// Makes `engine` the slot holder. Returns the flag its supervisor
    /// raises if the engine task panics.
    pub(crate) fn claim(&mut self, engine: &ChunkedUpload) -> Arc<AtomicBool> {
        let panicked = Arc::new(AtomicBool::new(false));
        self.active = Some(ActiveUpload {
            file_path: engine.file_path().to_string(),
            file: engine.file().clone(),
            cancel: engine.cancel_token(),
            task: None,
            panicked: panicked.clone(),
        });
        panicked
    }

    /// Records the background task driving the claimed engine.
    pub(crate) fn attach(&mut self, task: JoinHandle<()>) {
        if let Some(active) = &mut self.active {
            active.task = Some(task);
        }
    }

    /// Frees the slot once an engine run on the caller's task returned.
    pub(crate) fn release(&mut self, file_path: &str) {
        if self
            .active
            .as_ref()
            .is_some_and(|a| a.task.is_none() && a.file_path == file_path)
        {
            self.active = None;
        }
    }

    /// Path of the engine holding the slot, if it is still running.
    pub(crate) fn active_path(&self) -> Option<&str> {
        self.active
            .as_ref()
            .filter(|a| !a.is_finished())
            .map(|a| a.file_path.as_str())
    }

    pub(crate) fn stop_active(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancel.cancel();
        }
    }
}
