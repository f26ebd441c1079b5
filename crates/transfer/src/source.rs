//! Byte sources an upload can read from.
//!
//! A queued upload holds a [`FileHandle`] (shared, never copied) and reads
//! one byte range per chunk.

use std::fs::File;
use std::future::Future;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use crate::TransferError;

/// Boxed future returned by [`FileSource::read_range`].
pub type ReadFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<u8>, TransferError>> + Send + 'a>>;

/// Random-access byte source for one file.
pub trait FileSource: Send + Sync {
    /// Total length in bytes, fixed when the source was opened.
    fn size(&self) -> u64;

    /// Reads `[start, end)`.
    fn read_range(&self, start: u64, end: u64) -> ReadFuture<'_>;
}

/// Shared handle to a file's bytes.
pub type FileHandle = Arc<dyn FileSource>;

fn check_range(start: u64, end: u64, size: u64) -> Result<(), TransferError> {
    if start > end || end > size {
        return Err(TransferError::OutOfRange { start, end, size });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// LocalFile
// ---------------------------------------------------------------------------

/// A file on the local filesystem.
///
/// The size is captured when the handle is opened. Each read reopens the
/// file on a blocking thread, so the handle itself holds no descriptor.
#[derive(Debug, Clone)]
pub struct LocalFile {
    path: PathBuf,
    size: u64,
}

impl LocalFile {
    /// Opens `path` and records its current length.
    pub fn open(path: &Path) -> Result<Self, TransferError> {
        let metadata = std::fs::metadata(path)?;
        if !metadata.is_file() {
            return Err(TransferError::InvalidPath(format!(
                "not a regular file: {}",
                path.display()
            )));
        }
        Ok(Self {
            path: path.to_path_buf(),
            size: metadata.len(),
        })
    }

    /// Opens `path` and wraps it in a shared [`FileHandle`].
    pub fn handle(path: &Path) -> Result<FileHandle, TransferError> {
        Ok(Arc::new(Self::open(path)?))
    }

    /// Local path this handle reads from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FileSource for LocalFile {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_range(&self, start: u64, end: u64) -> ReadFuture<'_> {
        let path = self.path.clone();
        let size = self.size;
        Box::pin(async move {
            check_range(start, end, size)?;
            tokio::task::spawn_blocking(move || -> Result<Vec<u8>, TransferError> {
                let mut file = File::open(&path)?;
                file.seek(SeekFrom::Start(start))?;
                let mut buf = vec![0u8; (end - start) as usize];
                file.read_exact(&mut buf)?;
                Ok(buf)
            })
            .await
            .map_err(|e| TransferError::Join(e.to_string()))?
        })
    }
}

// ---------------------------------------------------------------------------
// MemoryFile
// ---------------------------------------------------------------------------

/// An in-memory byte buffer.
#[derive(Debug, Clone)]
pub struct MemoryFile {
    data: Arc<[u8]>,
}

impl MemoryFile {
    pub fn new(data: impl Into<Arc<[u8]>>) -> Self {
        Self { data: data.into() }
    }

    /// Wraps `data` in a shared [`FileHandle`].
    pub fn handle(data: impl Into<Arc<[u8]>>) -> FileHandle {
        Arc::new(Self::new(data))
    }
}

impl FileSource for MemoryFile {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_range(&self, start: u64, end: u64) -> ReadFuture<'_> {
        Box::pin(async move {
            check_range(start, end, self.size())?;
            Ok(self.data[start as usize..end as usize].to_vec())
        })
    }
}
