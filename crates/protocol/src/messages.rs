use serde::{Deserialize, Serialize};

use crate::types::UploadInfo;

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

/// Opens (or reopens) an upload session for `path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUploadRequest {
    pub path: String,
    pub file_size: u64,
}

/// Appends a chunk at `offset`.
///
/// `content` is already transport-encoded (base64 text); the endpoint
/// decodes it before writing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadChunkRequest {
    pub path: String,
    pub content: String,
    pub offset: u64,
}

// ---------------------------------------------------------------------------
// Response payloads
// ---------------------------------------------------------------------------

/// Answer to `CREATE`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUploadResponse {
    pub path: String,
    pub file_size: u64,
}

/// Answer to `UPLOAD_CHUNK` and `UPLOAD_STATUS`.
///
/// `uploaded` is the authoritative cursor: clients must adopt it instead of
/// adding the chunk length to their own offset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadStatusResponse {
    pub path: String,
    pub uploaded: u64,
    pub file_size: u64,
}

/// Answer to `LIST_UPLOADINGS`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListUploadingsResponse {
    #[serde(default)]
    pub upload_infos: Vec<UploadInfo>,
}
