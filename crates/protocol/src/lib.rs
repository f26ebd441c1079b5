//! Wire payloads exchanged with the remote upload endpoint.
//!
//! The endpoint speaks JSON with camelCase keys. Paths are logical remote
//! destinations, sizes and offsets are byte counts.

pub mod constants;
pub mod messages;
pub mod types;

// Re-export primary types for convenience.
pub use constants::{STATUS_NOT_MODIFIED, STATUS_OK};
pub use messages::{
    CreateUploadRequest, CreateUploadResponse, ListUploadingsResponse, UploadChunkRequest,
    UploadStatusResponse,
};
pub use types::UploadInfo;
