//! Queue entries and the messages crossing the scheduler/executor boundary.

use std::fmt;

use chunkup_protocol::UploadInfo;
use chunkup_transfer::FileHandle;

/// One queued file, keyed by its remote path.
#[derive(Clone)]
pub struct UploadEntry {
    /// Local bytes. `None` for entries rehydrated from the endpoint until
    /// the caller adds the file again.
    pub file: Option<FileHandle>,
    pub file_path: String,
    pub size: u64,
    /// Last offset confirmed by the endpoint.
    pub uploaded: u64,
    /// `false` means paused by the caller (or by a terminal report).
    pub runnable: bool,
    /// Last error message, empty when none.
    pub err: String,
}

impl UploadEntry {
    /// A fresh, runnable entry starting at offset 0.
    pub fn new(file: FileHandle, file_path: impl Into<String>) -> Self {
        Self {
            size: file.size(),
            file: Some(file),
            file_path: file_path.into(),
            uploaded: 0,
            runnable: true,
            err: String::new(),
        }
    }

    /// A paused entry rebuilt from the endpoint's partial-upload listing.
    pub fn restored(info: &UploadInfo) -> Self {
        Self {
            file: None,
            file_path: info.real_file_path.clone(),
            size: info.size,
            uploaded: info.uploaded.min(info.size),
            runnable: false,
            err: String::new(),
        }
    }

    /// Whether the executor may give this entry the transfer slot.
    pub fn is_eligible(&self) -> bool {
        self.runnable && self.uploaded < self.size && self.file.is_some()
    }
}

impl fmt::Debug for UploadEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadEntry")
            .field("file_path", &self.file_path)
            .field("size", &self.size)
            .field("uploaded", &self.uploaded)
            .field("runnable", &self.runnable)
            .field("err", &self.err)
            .field("has_file", &self.file.is_some())
            .finish()
    }
}

/// Scheduler → executor: the whole queue in insertion order.
#[derive(Debug, Clone, Default)]
pub struct SyncRequest {
    pub entries: Vec<UploadEntry>,
    /// Progress reports the scheduler had applied when it took the
    /// snapshot. Lets the executor recognise snapshots that predate the
    /// final report of an engine it just finished.
    pub reports_seen: u64,
}

/// Executor → scheduler: state of the active upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressReport {
    pub file_path: String,
    pub uploaded: u64,
    pub runnable: bool,
    pub err: String,
}

/// Executor → scheduler: failure of the executor itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    pub err: String,
}

/// Any message the executor emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutorEvent {
    Progress(ProgressReport),
    Error(ErrorReport),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chunkup_transfer::MemoryFile;

    #[test]
    fn new_entry_is_eligible() {
        let entry = UploadEntry::new(MemoryFile::handle(b"abc".to_vec()), "a.bin");
        assert_eq!(entry.size, 3);
        assert!(entry.is_eligible());
    }

    #[test]
    fn paused_or_complete_entry_is_not_eligible() {
        let mut entry = UploadEntry::new(MemoryFile::handle(b"abc".to_vec()), "a.bin");
        entry.runnable = false;
        assert!(!entry.is_eligible());

        entry.runnable = true;
        entry.uploaded = 3;
        assert!(!entry.is_eligible());
    }

    #[test]
    fn restored_entry_waits_for_file() {
        let entry = UploadEntry::restored(&UploadInfo {
            real_file_path: "big.iso".into(),
            size: 100,
            uploaded: 40,
        });
        assert!(!entry.runnable);
        assert!(entry.file.is_none());
        assert_eq!(entry.uploaded, 40);
        assert!(!entry.is_eligible());
    }

    #[test]
    fn restored_entry_clamps_offset() {
        let entry = UploadEntry::restored(&UploadInfo {
            real_file_path: "odd.bin".into(),
            size: 10,
            uploaded: 99,
        });
        assert_eq!(entry.uploaded, 10);
    }

    #[test]
    fn debug_hides_file_bytes() {
        let entry = UploadEntry::new(MemoryFile::handle(b"secret".to_vec()), "a.bin");
        let text = format!("{entry:?}");
        assert!(text.contains("has_file: true"));
        assert!(!text.contains("secret"));
    }
}
