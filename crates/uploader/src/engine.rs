//! Per-file chunked transfer engine.
//!
//! A [`ChunkedUpload`] owns one file from `create` to completion. The chunk
//! length grows after every accepted chunk and shrinks after every
//! ambiguous failure; the offset only ever comes from the endpoint.

use std::sync::Arc;
use std::time::Duration;

use chunkup_transfer::{FileHandle, chunk_boundary, encode_chunk};
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::UploaderConfig;
use crate::error::UploadError;
use crate::status::{StatusClass, StatusPolicy};
use crate::transport::Transport;
use crate::types::ProgressReport;

/// Sink for the engine's progress reports.
pub type ReportFn = Arc<dyn Fn(ProgressReport) + Send + Sync>;

/// Lifecycle of one engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Created,
    Uploading,
    BackingOff,
    Finished,
    Stopped,
    Error,
}

impl EngineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Stopped | Self::Error)
    }
}

/// Drives one file through create → chunk loop → finish.
pub struct ChunkedUpload {
    transport: Arc<dyn Transport>,
    config: Arc<UploaderConfig>,
    policy: StatusPolicy,
    file: FileHandle,
    file_path: String,
    size: u64,
    offset: u64,
    chunk_len: u64,
    state: EngineState,
    cancel: CancellationToken,
    report: ReportFn,
}

impl ChunkedUpload {
    /// Creates an engine seeded with the last confirmed offset.
    pub fn new(
        transport: Arc<dyn Transport>,
        config: Arc<UploaderConfig>,
        file: FileHandle,
        file_path: impl Into<String>,
        uploaded: u64,
        report: ReportFn,
    ) -> Self {
        let size = file.size();
        Self {
            policy: config.status_policy(),
            chunk_len: config.chunk_len.max(config.chunk_len_floor),
            transport,
            config,
            file,
            file_path: file_path.into(),
            size,
            offset: uploaded.min(size),
            state: EngineState::Idle,
            cancel: CancellationToken::new(),
            report,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Last offset confirmed by the endpoint.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn chunk_len(&self) -> u64 {
        self.chunk_len
    }

    pub fn file_path(&self) -> &str {
        &self.file_path
    }

    pub fn file(&self) -> &FileHandle {
        &self.file
    }

    /// Token that stops the engine before its next iteration.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs the engine to a terminal state and emits the final report.
    pub async fn run(&mut self) -> EngineState {
        let outcome = self.drive().await;
        let err = match outcome {
            Ok(()) => {
                self.state = EngineState::Finished;
                info!(path = %self.file_path, size = self.size, "upload finished");
                String::new()
            }
            Err(UploadError::Stopped) => {
                self.state = EngineState::Stopped;
                info!(path = %self.file_path, uploaded = self.offset, "upload stopped");
                UploadError::Stopped.to_string()
            }
            Err(e) => {
                self.state = EngineState::Error;
                warn!(path = %self.file_path, uploaded = self.offset, error = %e, "upload failed");
                e.to_string()
            }
        };
        self.emit(false, err);
        self.state
    }

    async fn drive(&mut self) -> Result<(), UploadError> {
        self.create().await?;

        self.state = EngineState::Uploading;
        while self.offset < self.size {
            if self.cancel.is_cancelled() {
                return Err(UploadError::Stopped);
            }

            let end = chunk_boundary(self.offset, self.chunk_len, self.size);
            let bytes = self.file.read_range(self.offset, end).await?;
            let content = encode_chunk(&bytes);

            let result = self
                .transport
                .upload_chunk(&self.file_path, content, self.offset)
                .await;

            match self.policy.classify(result) {
                StatusClass::Success(body) => {
                    self.adopt(body.uploaded);
                    self.chunk_len = scale(self.chunk_len, self.config.speed_up_ratio);
                    debug!(
                        path = %self.file_path,
                        uploaded = self.offset,
                        chunk_len = self.chunk_len,
                        "chunk accepted"
                    );
                    if self.offset < self.size {
                        self.emit(true, String::new());
                    }
                }
                StatusClass::Fatal(status) => {
                    return Err(UploadError::Rejected {
                        status,
                        message: "chunk rejected".into(),
                    });
                }
                StatusClass::Retryable(reason) => self.back_off(reason).await?,
            }
        }
        Ok(())
    }

    /// Opens the session, retrying ambiguous failures up to the limit.
    async fn create(&mut self) -> Result<(), UploadError> {
        let limit = self.config.create_retry_limit.max(1);
        let mut last_reason = String::new();

        for attempt in 1..=limit {
            let result = self.transport.create(&self.file_path, self.size).await;
            match self.policy.classify_create(result) {
                StatusClass::Success(_) => {
                    self.state = EngineState::Created;
                    debug!(path = %self.file_path, size = self.size, attempt, "upload created");
                    return Ok(());
                }
                StatusClass::Fatal(status) => {
                    return Err(UploadError::Rejected {
                        status,
                        message: "create rejected".into(),
                    });
                }
                StatusClass::Retryable(reason) => {
                    warn!(path = %self.file_path, attempt, reason = %reason, "create failed");
                    last_reason = reason;
                    if attempt < limit {
                        self.sleep_backoff().await;
                    }
                }
            }
        }

        Err(UploadError::CreateFailed {
            attempts: limit,
            reason: last_reason,
        })
    }

    /// Shrinks the chunk, waits, and resyncs the offset from the endpoint.
    async fn back_off(&mut self, reason: String) -> Result<(), UploadError> {
        if self.chunk_len <= self.config.chunk_len_floor {
            return Err(UploadError::Stalled);
        }
        self.chunk_len = scale(self.chunk_len, self.config.speed_down_ratio)
            .max(self.config.chunk_len_floor);
        self.state = EngineState::BackingOff;

        warn!(
            path = %self.file_path,
            uploaded = self.offset,
            chunk_len = self.chunk_len,
            reason = %reason,
            "chunk failed, backing off"
        );
        self.emit(true, reason);
        self.sleep_backoff().await;

        let result = self.transport.upload_status(&self.file_path).await;
        match self.policy.classify(result) {
            StatusClass::Success(body) => {
                debug!(path = %self.file_path, uploaded = body.uploaded, "offset resynced");
                self.adopt(body.uploaded);
            }
            StatusClass::Fatal(status) => {
                return Err(UploadError::Rejected {
                    status,
                    message: "status query rejected".into(),
                });
            }
            StatusClass::Retryable(reason) => {
                debug!(path = %self.file_path, reason = %reason, "resync failed, keeping offset");
            }
        }

        self.state = EngineState::Uploading;
        Ok(())
    }

    fn adopt(&mut self, uploaded: u64) {
        if uploaded > self.size {
            warn!(
                path = %self.file_path,
                uploaded,
                size = self.size,
                "endpoint reported offset past end of file"
            );
        }
        self.offset = uploaded.min(self.size);
    }

    async fn sleep_backoff(&self) {
        let max = self.config.backoff_max_ms;
        let delay = if max == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=max)
        };
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    fn emit(&self, runnable: bool, err: String) {
        (self.report)(ProgressReport {
            file_path: self.file_path.clone(),
            uploaded: self.offset,
            runnable,
            err,
        });
    }
}

/// `ceil(len * ratio)` in floating point, back to an integer length.
fn scale(len: u64, ratio: f64) -> u64 {
    (len as f64 * ratio).ceil() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use chunkup_transfer::{FileSource, MemoryFile, ReadFuture, TransferError};

    use crate::memory::{EndpointCall, MemoryEndpoint, Scripted};
    use crate::transport::TransportError;

    fn test_config() -> Arc<UploaderConfig> {
        Arc::new(UploaderConfig {
            chunk_len: 4,
            backoff_max_ms: 0,
            ..UploaderConfig::default()
        })
    }

    fn collector() -> (ReportFn, Arc<Mutex<Vec<ProgressReport>>>) {
        let reports = Arc::new(Mutex::new(Vec::new()));
        let sink = reports.clone();
        let report: ReportFn = Arc::new(move |r| sink.lock().unwrap().push(r));
        (report, reports)
    }

    fn engine(
        endpoint: &Arc<MemoryEndpoint>,
        data: &[u8],
        config: Arc<UploaderConfig>,
        report: ReportFn,
    ) -> ChunkedUpload {
        ChunkedUpload::new(
            endpoint.clone(),
            config,
            MemoryFile::handle(data.to_vec()),
            "dir/file.bin",
            0,
            report,
        )
    }

    #[test]
    fn scale_rounds_up() {
        assert_eq!(scale(4, 1.05), 5);
        assert_eq!(scale(5, 0.5), 3);
        assert_eq!(scale(1, 0.5), 1);
    }

    #[tokio::test]
    async fn uploads_whole_file_and_grows_chunks() {
        let endpoint = Arc::new(MemoryEndpoint::new());
        let (report, reports) = collector();
        let data = b"0123456789abcdef";
        let mut upload = engine(&endpoint, data, test_config(), report);

        assert_eq!(upload.run().await, EngineState::Finished);
        assert_eq!(endpoint.completed("dir/file.bin").unwrap(), data);

        // Chunk lengths 4, 5, 6, then 7 clamped to the one-byte tail.
        let offsets: Vec<u64> = endpoint.chunk_offsets().into_iter().map(|(_, o)| o).collect();
        assert_eq!(offsets, vec![0, 4, 9, 15]);

        let reports = reports.lock().unwrap();
        let last = reports.last().unwrap();
        assert_eq!(last.uploaded, 16);
        assert!(!last.runnable);
        assert!(last.err.is_empty());
        let uploaded: Vec<u64> = reports.iter().map(|r| r.uploaded).collect();
        assert_eq!(uploaded, vec![4, 9, 15, 16]);
    }

    #[tokio::test]
    async fn adopts_server_offset_not_local_sum() {
        let endpoint = Arc::new(MemoryEndpoint::new());
        endpoint.script_chunk(Scripted::Uploaded(2));
        let (report, reports) = collector();
        let mut upload = engine(&endpoint, b"abcdefgh", test_config(), report);

        assert_eq!(upload.run().await, EngineState::Finished);

        let offsets: Vec<u64> = endpoint.chunk_offsets().into_iter().map(|(_, o)| o).collect();
        assert_eq!(offsets[..2], [0, 2]);
        assert_eq!(reports.lock().unwrap()[0].uploaded, 2);
    }

    #[tokio::test]
    async fn single_chunk_file_reports_once() {
        let endpoint = Arc::new(MemoryEndpoint::new());
        let (report, reports) = collector();
        let mut upload = engine(&endpoint, b"abc", test_config(), report);

        assert_eq!(upload.run().await, EngineState::Finished);
        let reports = reports.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].uploaded, 3);
        assert!(!reports[0].runnable);
    }

    #[tokio::test]
    async fn fatal_create_aborts_without_retry() {
        let endpoint = Arc::new(MemoryEndpoint::new());
        endpoint.script_create(Scripted::Status(409));
        let (report, reports) = collector();
        let mut upload = engine(&endpoint, b"abc", test_config(), report);

        assert_eq!(upload.run().await, EngineState::Error);
        assert_eq!(upload.offset(), 0);

        let creates = endpoint
            .calls()
            .iter()
            .filter(|c| matches!(c, EndpointCall::Create { .. }))
            .count();
        assert_eq!(creates, 1);

        let reports = reports.lock().unwrap();
        assert!(reports[0].err.contains("409"));
        assert!(!reports[0].runnable);
    }

    #[tokio::test]
    async fn retryable_create_is_retried_up_to_limit() {
        let endpoint = Arc::new(MemoryEndpoint::new());
        endpoint.script_create(Scripted::Status(503));
        endpoint.script_create(Scripted::Fail(TransportError::Io("refused".into())));
        let (report, reports) = collector();
        let mut upload = engine(&endpoint, b"abc", test_config(), report);

        assert_eq!(upload.run().await, EngineState::Error);
        let err = &reports.lock().unwrap()[0].err;
        assert!(err.contains("2 attempts"), "{err}");
        assert!(err.contains("refused"), "{err}");
    }

    #[tokio::test]
    async fn retryable_create_then_success() {
        let endpoint = Arc::new(MemoryEndpoint::new());
        endpoint.script_create(Scripted::Status(502));
        let (report, _) = collector();
        let mut upload = engine(&endpoint, b"abc", test_config(), report);

        assert_eq!(upload.run().await, EngineState::Finished);
    }

    #[tokio::test]
    async fn retryable_chunk_resyncs_from_status() {
        let endpoint = Arc::new(MemoryEndpoint::new());
        endpoint.seed_partial("dir/file.bin", 6, b"a");
        endpoint.script_chunk(Scripted::Status(503));
        endpoint.script_status(Scripted::Uploaded(1));
        let (report, reports) = collector();
        let config = Arc::new(UploaderConfig {
            chunk_len: 2,
            backoff_max_ms: 0,
            ..UploaderConfig::default()
        });
        let mut upload = engine(&endpoint, b"abcdef", config, report);

        assert_eq!(upload.run().await, EngineState::Finished);

        let offsets: Vec<u64> = endpoint.chunk_offsets().into_iter().map(|(_, o)| o).collect();
        assert_eq!(offsets[0], 0);
        assert_eq!(offsets[1], 1);
        assert_eq!(endpoint.completed("dir/file.bin").unwrap(), b"abcdef");

        let reports = reports.lock().unwrap();
        assert!(reports[0].runnable);
        assert!(reports[0].err.contains("503"));
        assert_eq!(reports[0].uploaded, 0);
    }

    #[tokio::test]
    async fn failed_resync_keeps_offset() {
        let endpoint = Arc::new(MemoryEndpoint::new());
        endpoint.script_chunk(Scripted::Fail(TransportError::Io("timeout".into())));
        endpoint.script_status(Scripted::Status(500));
        let (report, _) = collector();
        let mut upload = engine(&endpoint, b"abcdef", test_config(), report);

        assert_eq!(upload.run().await, EngineState::Finished);
        let offsets: Vec<u64> = endpoint.chunk_offsets().into_iter().map(|(_, o)| o).collect();
        assert_eq!(offsets[..2], [0, 0]);
    }

    #[tokio::test]
    async fn fatal_resync_aborts() {
        let endpoint = Arc::new(MemoryEndpoint::new());
        endpoint.script_chunk(Scripted::Status(500));
        endpoint.script_status(Scripted::Status(404));
        let (report, _) = collector();
        let mut upload = engine(&endpoint, b"abcdef", test_config(), report);

        assert_eq!(upload.run().await, EngineState::Error);
    }

    #[tokio::test]
    async fn fatal_chunk_status_aborts() {
        let endpoint = Arc::new(MemoryEndpoint::new());
        endpoint.script_chunk(Scripted::Status(403));
        let (report, reports) = collector();
        let mut upload = engine(&endpoint, b"abcdef", test_config(), report);

        assert_eq!(upload.run().await, EngineState::Error);
        assert!(reports.lock().unwrap()[0].err.contains("403"));
        assert!(endpoint.calls().iter().all(|c| !matches!(c, EndpointCall::UploadStatus { .. })));
    }

    #[tokio::test]
    async fn repeated_failures_stall() {
        let endpoint = Arc::new(MemoryEndpoint::new());
        // 4 -> 2 -> 1 -> stall
        for _ in 0..3 {
            endpoint.script_chunk(Scripted::Status(503));
        }
        let (report, reports) = collector();
        let mut upload = engine(&endpoint, b"abcdef", test_config(), report);

        assert_eq!(upload.run().await, EngineState::Error);
        assert_eq!(upload.chunk_len(), 1);
        let reports = reports.lock().unwrap();
        assert_eq!(
            reports.last().unwrap().err,
            "poor network condition, retry later"
        );
    }

    #[tokio::test]
    async fn cancelled_engine_stops_before_next_chunk() {
        let endpoint = Arc::new(MemoryEndpoint::new());
        let (report, reports) = collector();
        let mut upload = engine(&endpoint, b"abcdefgh", test_config(), report);
        upload.cancel_token().cancel();

        assert_eq!(upload.run().await, EngineState::Stopped);
        assert!(endpoint.chunk_offsets().is_empty());

        let reports = reports.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert!(!reports[0].runnable);
        assert_eq!(reports[0].err, "uploading is stopped");
    }

    #[tokio::test]
    async fn resumes_from_seeded_offset() {
        let endpoint = Arc::new(MemoryEndpoint::new());
        endpoint.seed_partial("dir/file.bin", 8, b"abcd");
        let (report, _) = collector();
        let mut upload = ChunkedUpload::new(
            endpoint.clone(),
            test_config(),
            MemoryFile::handle(b"abcdefgh".to_vec()),
            "dir/file.bin",
            4,
            report,
        );

        assert_eq!(upload.run().await, EngineState::Finished);
        assert_eq!(endpoint.chunk_offsets(), vec![("dir/file.bin".to_string(), 4)]);
        assert_eq!(endpoint.completed("dir/file.bin").unwrap(), b"abcdefgh");
    }

    #[tokio::test]
    async fn offset_past_end_is_clamped() {
        let endpoint = Arc::new(MemoryEndpoint::new());
        endpoint.script_chunk(Scripted::Uploaded(99));
        let (report, reports) = collector();
        let mut upload = engine(&endpoint, b"abc", test_config(), report);

        assert_eq!(upload.run().await, EngineState::Finished);
        assert_eq!(upload.offset(), 3);
        assert_eq!(reports.lock().unwrap()[0].uploaded, 3);
    }

    struct Unreadable;

    impl FileSource for Unreadable {
        fn size(&self) -> u64 {
            8
        }

        fn read_range(&self, _start: u64, _end: u64) -> ReadFuture<'_> {
            Box::pin(async { Err(TransferError::Io(std::io::Error::other("disk gone"))) })
        }
    }

    #[tokio::test]
    async fn local_read_failure_ends_in_error() {
        let endpoint = Arc::new(MemoryEndpoint::new());
        let (report, reports) = collector();
        let mut upload = ChunkedUpload::new(
            endpoint.clone(),
            test_config(),
            Arc::new(Unreadable),
            "dir/file.bin",
            0,
            report,
        );

        assert_eq!(upload.run().await, EngineState::Error);
        assert!(endpoint.chunk_offsets().is_empty());

        let reports = reports.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].uploaded, 0);
        assert!(!reports[0].runnable);
        assert!(reports[0].err.contains("disk gone"), "{}", reports[0].err);
    }
}
