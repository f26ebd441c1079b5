//! Local side of a chunked upload: file handles, byte-range reads,
//! transport encoding and remote path validation.

mod chunked;
mod source;
mod validation;

pub use chunked::{chunk_boundary, decode_chunk, encode_chunk};
pub use source::{FileHandle, FileSource, LocalFile, MemoryFile, ReadFuture};
pub use validation::validate_remote_path;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("range {start}..{end} outside file of {size} bytes")]
    OutOfRange { start: u64, end: u64, size: u64 },

    #[error("read task failed: {0}")]
    Join(String),
}
