//! Upload error types.

use crate::transport::TransportError;

/// Errors produced while queueing or transferring uploads.
///
/// Per-file failures reach observers as the `Display` text of one of these
/// variants in [`UploadEntry::err`](crate::UploadEntry).
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("invalid upload: {0}")]
    Validation(String),

    #[error("upload not found: {0}")]
    NotFound(String),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("failed to read local file: {0}")]
    Read(#[from] chunkup_transfer::TransferError),

    #[error("failed to create upload after {attempts} attempts: {reason}")]
    CreateFailed { attempts: u32, reason: String },

    #[error("rejected by endpoint with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("poor network condition, retry later")]
    Stalled,

    #[error("uploading is stopped")]
    Stopped,

    #[error("executor error: {0}")]
    Executor(String),
}
