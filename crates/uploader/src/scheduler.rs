//! Upload queue and periodic scheduling.
//!
//! The scheduler owns every [`UploadEntry`]. On each tick it posts a
//! snapshot of the queue to the executor and folds the executor's progress
//! reports back into the queue.
//!
//! Scheduling is first-eligible by insertion order: a file queued earlier
//! holds the transfer slot until it finishes, fails, or is paused, and
//! later files wait behind it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chunkup_protocol::UploadInfo;
use chunkup_transfer::{FileHandle, validate_remote_path};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::UploaderConfig;
use crate::error::UploadError;
use crate::executor::Executor;
use crate::types::{ExecutorEvent, ProgressReport, SyncRequest, UploadEntry};

/// Observer invoked with the queue after every reconciled report.
pub type StatusCallback = Arc<dyn Fn(Vec<UploadEntry>) + Send + Sync>;

/// Cloneable handle to the upload queue.
#[derive(Clone)]
pub struct UploadScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    executor: Arc<dyn Executor>,
    config: Arc<UploaderConfig>,
    queue: Mutex<Queue>,
    callback: RwLock<Option<StatusCallback>>,
    ticker: Mutex<Option<CancellationToken>>,
}

#[derive(Default)]
struct Queue {
    entries: Vec<UploadEntry>,
    /// Progress reports applied so far, sent along with every snapshot.
    reports_seen: u64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl UploadScheduler {
    /// Builds the queue and registers it as the executor's message handler,
    /// so reports are reconciled whether ticks come from [`init`] or from
    /// manual [`tick`] calls.
    ///
    /// [`init`]: UploadScheduler::init
    /// [`tick`]: UploadScheduler::tick
    pub fn new(
        executor: Arc<dyn Executor>,
        config: Arc<UploaderConfig>,
    ) -> Result<Self, UploadError> {
        config.validate()?;

        let inner = Arc::new(SchedulerInner {
            executor,
            config,
            queue: Mutex::new(Queue::default()),
            callback: RwLock::new(None),
            ticker: Mutex::new(None),
        });

        let weak = Arc::downgrade(&inner);
        inner.executor.on_message(Arc::new(move |event| {
            if let Some(inner) = weak.upgrade() {
                UploadScheduler { inner }.handle_event(event);
            }
        }));

        Ok(Self { inner })
    }

    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.inner.executor
    }

    /// Starts the tick task. The first tick fires one interval from now.
    /// Calling it again is a no-op.
    pub fn init(&self) {
        let mut ticker = lock(&self.inner.ticker);
        if ticker.is_some() {
            debug!("scheduler already initialised");
            return;
        }

        let cancel = CancellationToken::new();
        *ticker = Some(cancel.clone());

        let weak = Arc::downgrade(&self.inner);
        let period = self.inner.config.tick_interval();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        let Some(inner) = weak.upgrade() else { break };
                        UploadScheduler { inner }.tick().await;
                    }
                }
            }
            debug!("scheduler ticker stopped");
        });

        info!(interval_ms = period.as_millis() as u64, "upload scheduler started");
    }

    /// Stops the tick task. Queued entries are kept.
    pub fn destroy(&self) {
        if let Some(cancel) = lock(&self.inner.ticker).take() {
            cancel.cancel();
            info!("upload scheduler stopped");
        }
    }

    /// Queues `file` for upload to `file_path`, or resumes the existing
    /// entry for that path.
    pub fn add(&self, file: FileHandle, file_path: &str) -> Result<(), UploadError> {
        validate_remote_path(file_path).map_err(|e| UploadError::Validation(e.to_string()))?;

        let size = file.size();
        if size == 0 {
            return Err(UploadError::Validation(format!(
                "empty file cannot be uploaded: {file_path}"
            )));
        }

        let mut guard = lock(&self.inner.queue);
        let queue = &mut guard.entries;
        if let Some(entry) = queue.iter_mut().find(|e| e.file_path == file_path) {
            if entry.size != size {
                return Err(UploadError::Validation(format!(
                    "{file_path} is queued with {} bytes, got {size}; delete it first",
                    entry.size
                )));
            }
            entry.file = Some(file);
            entry.runnable = true;
            entry.err.clear();
            info!(path = %file_path, uploaded = entry.uploaded, "upload resumed");
            return Ok(());
        }

        if queue.len() >= self.inner.config.max_queued {
            return Err(UploadError::Validation(format!(
                "upload queue is full ({} entries)",
                queue.len()
            )));
        }

        queue.push(UploadEntry::new(file, file_path));
        info!(path = %file_path, size, "upload queued");
        Ok(())
    }

    /// Pauses an entry. The executor stops it on the next tick.
    pub fn stop(&self, file_path: &str) -> Result<(), UploadError> {
        let mut guard = lock(&self.inner.queue);
        let queue = &mut guard.entries;
        let Some(entry) = queue.iter_mut().find(|e| e.file_path == file_path) else {
            error!(path = %file_path, "stop: no such upload");
            return Err(UploadError::NotFound(file_path.to_string()));
        };
        entry.runnable = false;
        info!(path = %file_path, "upload paused");
        Ok(())
    }

    /// Removes an entry, stopping it first if it is active.
    pub fn delete(&self, file_path: &str) -> Result<(), UploadError> {
        let mut guard = lock(&self.inner.queue);
        let queue = &mut guard.entries;
        let Some(idx) = queue.iter().position(|e| e.file_path == file_path) else {
            error!(path = %file_path, "delete: no such upload");
            return Err(UploadError::NotFound(file_path.to_string()));
        };
        queue.remove(idx);
        info!(path = %file_path, "upload deleted");
        Ok(())
    }

    /// Snapshot of the queue in insertion order.
    pub fn list(&self) -> Vec<UploadEntry> {
        lock(&self.inner.queue).entries.clone()
    }

    pub fn set_status_callback(&self, callback: StatusCallback) {
        *self
            .inner
            .callback
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }

    /// Inserts paused entries for partial uploads the endpoint still holds.
    /// Paths already queued are left alone. Returns how many were added.
    pub fn restore(&self, infos: &[UploadInfo]) -> usize {
        let mut guard = lock(&self.inner.queue);
        let queue = &mut guard.entries;
        let mut restored = 0;

        for info in infos {
            if queue.iter().any(|e| e.file_path == info.real_file_path) {
                continue;
            }
            if info.size == 0 || info.is_complete() {
                debug!(path = %info.real_file_path, "skipping finished upload");
                continue;
            }
            if let Err(e) = validate_remote_path(&info.real_file_path) {
                warn!(path = %info.real_file_path, error = %e, "skipping invalid upload path");
                continue;
            }
            if queue.len() >= self.inner.config.max_queued {
                warn!(restored, "upload queue full, restore truncated");
                break;
            }

            queue.push(UploadEntry::restored(info));
            restored += 1;
        }

        if restored > 0 {
            info!(count = restored, "restored partial uploads");
        }
        restored
    }

    /// Posts the current queue to the executor.
    pub async fn tick(&self) {
        let request = {
            let queue = lock(&self.inner.queue);
            SyncRequest {
                entries: queue.entries.clone(),
                reports_seen: queue.reports_seen,
            }
        };
        self.inner.executor.send(request).await;
    }

    /// Folds one progress report into the queue and notifies the observer.
    pub fn reconcile(&self, report: ProgressReport) {
        let snapshot = {
            let mut guard = lock(&self.inner.queue);
            guard.reports_seen += 1;
            let queue = &mut guard.entries;
            let Some(idx) = queue.iter().position(|e| e.file_path == report.file_path) else {
                debug!(path = %report.file_path, "report for unknown upload ignored");
                return;
            };

            let entry = &mut queue[idx];
            if report.uploaded >= entry.size {
                queue.remove(idx);
                info!(path = %report.file_path, "upload complete, removed from queue");
            } else {
                entry.uploaded = report.uploaded;
                // Only `add` resumes a paused entry.
                entry.runnable = entry.runnable && report.runnable;
                entry.err = report.err;
            }
            queue.clone()
        };

        let callback = self
            .inner
            .callback
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(callback) = callback {
            callback(snapshot);
        }
    }

    fn handle_event(&self, event: ExecutorEvent) {
        match event {
            ExecutorEvent::Progress(report) => self.reconcile(report),
            ExecutorEvent::Error(report) => {
                error!(error = %report.err, "upload executor error");
            }
        }
    }
}
