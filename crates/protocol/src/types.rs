use serde::{Deserialize, Serialize};

/// A partially uploaded file known to the endpoint.
///
/// Returned by `LIST_UPLOADINGS`; used to rehydrate the queue at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadInfo {
    pub real_file_path: String,
    pub size: u64,
    pub uploaded: u64,
}

impl UploadInfo {
    /// Returns `true` once every byte has been confirmed.
    pub fn is_complete(&self) -> bool {
        self.uploaded >= self.size
    }
}
