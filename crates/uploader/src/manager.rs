//! Upload manager: scheduler plus server-side cleanup.

use std::sync::Arc;

use chunkup_protocol::STATUS_OK;
use chunkup_transfer::FileHandle;
use tracing::{info, warn};

use crate::config::UploaderConfig;
use crate::error::UploadError;
use crate::executor::{BackgroundExecutor, Executor};
use crate::scheduler::{StatusCallback, UploadScheduler};
use crate::transport::Transport;
use crate::types::UploadEntry;

/// Entry point for applications: queues files, pairs `delete` with the
/// endpoint's cleanup call and rehydrates the queue at startup.
pub struct UploadManager {
    scheduler: UploadScheduler,
    transport: Arc<dyn Transport>,
}

impl UploadManager {
    pub fn new(scheduler: UploadScheduler, transport: Arc<dyn Transport>) -> Self {
        Self {
            scheduler,
            transport,
        }
    }

    /// Builds a manager around a [`BackgroundExecutor`]. Must be called
    /// inside a tokio runtime.
    pub fn with_background(
        transport: Arc<dyn Transport>,
        config: UploaderConfig,
    ) -> Result<Self, UploadError> {
        config.validate()?;
        let config = Arc::new(config);
        let executor: Arc<dyn Executor> =
            Arc::new(BackgroundExecutor::spawn(transport.clone(), config.clone()));
        Ok(Self::new(UploadScheduler::new(executor, config)?, transport))
    }

    pub fn scheduler(&self) -> &UploadScheduler {
        &self.scheduler
    }

    pub fn start(&self) {
        self.scheduler.init();
    }

    /// Stops ticking and the active transfer. The queue is kept.
    pub fn shutdown(&self) {
        self.scheduler.destroy();
        self.scheduler.executor().shutdown();
    }

    pub fn add(&self, file: FileHandle, file_path: &str) -> Result<(), UploadError> {
        self.scheduler.add(file, file_path)
    }

    pub fn stop(&self, file_path: &str) -> Result<(), UploadError> {
        self.scheduler.stop(file_path)
    }

    pub fn list(&self) -> Vec<UploadEntry> {
        self.scheduler.list()
    }

    pub fn set_status_callback(&self, callback: StatusCallback) {
        self.scheduler.set_status_callback(callback);
    }

    /// Removes the entry locally, then releases the endpoint's partial
    /// upload.
    pub async fn delete(&self, file_path: &str) -> Result<(), UploadError> {
        self.scheduler.delete(file_path)?;

        let resp = self.transport.delete_uploading(file_path).await?;
        if resp.status != STATUS_OK {
            warn!(path = %file_path, status = resp.status, "endpoint refused to delete upload");
            return Err(UploadError::Rejected {
                status: resp.status,
                message: format!("delete {file_path}"),
            });
        }
        info!(path = %file_path, "partial upload released");
        Ok(())
    }

    /// Queues paused entries for every partial upload the endpoint reports.
    /// Returns how many were added.
    pub async fn restore(&self) -> Result<usize, UploadError> {
        let resp = self.transport.list_uploadings().await?;
        if resp.status != STATUS_OK {
            return Err(UploadError::Rejected {
                status: resp.status,
                message: "list uploadings".into(),
            });
        }
        let infos = resp.body.unwrap_or_default().upload_infos;
        Ok(self.scheduler.restore(&infos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chunkup_transfer::MemoryFile;

    use crate::executor::InlineExecutor;
    use crate::memory::{EndpointCall, MemoryEndpoint};

    fn manager(endpoint: Arc<MemoryEndpoint>) -> UploadManager {
        let config = Arc::new(UploaderConfig {
            tick_interval_ms: 3_600_000,
            backoff_max_ms: 0,
            ..UploaderConfig::default()
        });
        let executor = Arc::new(InlineExecutor::new(endpoint.clone(), config.clone()));
        UploadManager::new(UploadScheduler::new(executor, config).unwrap(), endpoint)
    }

    #[tokio::test]
    async fn restore_rehydrates_paused_entries() {
        let endpoint = Arc::new(MemoryEndpoint::new());
        endpoint.seed_partial("movies/a.mkv", 100, &[0; 40]);
        endpoint.seed_partial("movies/b.mkv", 10, b"");
        let mgr = manager(endpoint);

        assert_eq!(mgr.restore().await.unwrap(), 2);
        let list = mgr.list();
        assert_eq!(list[0].file_path, "movies/a.mkv");
        assert_eq!(list[0].uploaded, 40);
        assert!(list.iter().all(|e| !e.runnable));

        // A second restore adds nothing.
        assert_eq!(mgr.restore().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_releases_server_state() {
        let endpoint = Arc::new(MemoryEndpoint::new());
        endpoint.seed_partial("a.bin", 4, b"ab");
        let mgr = manager(endpoint.clone());
        mgr.restore().await.unwrap();

        mgr.delete("a.bin").await.unwrap();
        assert!(mgr.list().is_empty());
        assert!(endpoint.pending_len("a.bin").is_none());
        assert!(endpoint.calls().contains(&EndpointCall::DeleteUploading {
            path: "a.bin".into()
        }));
    }

    #[tokio::test]
    async fn delete_surfaces_endpoint_refusal() {
        let endpoint = Arc::new(MemoryEndpoint::new());
        let mgr = manager(endpoint);
        mgr.add(MemoryFile::handle(b"ab".to_vec()), "a.bin").unwrap();

        // Nothing was ever created server-side, so the endpoint answers 404.
        let err = mgr.delete("a.bin").await.unwrap_err();
        assert!(matches!(err, UploadError::Rejected { status: 404, .. }));
        assert!(mgr.list().is_empty());
    }

    #[tokio::test]
    async fn delete_unknown_skips_endpoint() {
        let endpoint = Arc::new(MemoryEndpoint::new());
        let mgr = manager(endpoint.clone());

        assert!(matches!(
            mgr.delete("ghost.bin").await,
            Err(UploadError::NotFound(_))
        ));
        assert!(endpoint.calls().is_empty());
    }

    #[tokio::test]
    async fn background_manager_uploads() {
        let endpoint = Arc::new(MemoryEndpoint::new());
        let mgr = UploadManager::with_background(
            endpoint.clone(),
            UploaderConfig {
                tick_interval_ms: 5,
                backoff_max_ms: 0,
                ..UploaderConfig::default()
            },
        )
        .unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        mgr.set_status_callback(Arc::new(move |queue| {
            let _ = tx.send(queue);
        }));
        mgr.start();
        mgr.add(MemoryFile::handle(b"hello".to_vec()), "greeting.txt")
            .unwrap();

        let queue = rx.recv().await.unwrap();
        assert!(queue.is_empty());
        assert_eq!(endpoint.completed("greeting.txt").unwrap(), b"hello");
        mgr.shutdown();
    }
}
