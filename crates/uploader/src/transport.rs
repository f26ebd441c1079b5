//! Transport trait for the remote upload endpoint.
//!
//! The HTTP client (or any other binding) implements this trait. Keeping it
//! a trait object lets the engine run against in-memory endpoints in tests.

use std::future::Future;
use std::pin::Pin;

use chunkup_protocol::messages::{
    CreateUploadResponse, ListUploadingsResponse, UploadStatusResponse,
};
use chunkup_protocol::STATUS_OK;

/// Low-level failure reaching the endpoint.
///
/// Any answer the endpoint actually gave, including error statuses, is a
/// [`Response`] instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("undecodable response: {0}")]
    Decode(String),
}

/// Status code plus optional decoded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response<T> {
    pub status: u16,
    pub body: Option<T>,
}

impl<T> Response<T> {
    /// A 200 response carrying `body`.
    pub fn ok(body: T) -> Self {
        Self {
            status: STATUS_OK,
            body: Some(body),
        }
    }

    /// A response with only a status.
    pub fn status(status: u16) -> Self {
        Self { status, body: None }
    }
}

/// Boxed future returned by every [`Transport`] operation.
pub type TransportFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<Response<T>, TransportError>> + Send + 'a>>;

/// Abstract connection to the upload endpoint.
///
/// Implementations copy `path` before boxing the future; the returned
/// future only borrows `self`.
pub trait Transport: Send + Sync {
    /// Opens an upload session. 200 and 304 both mean "ready".
    fn create(&self, path: &str, size: u64) -> TransportFuture<'_, CreateUploadResponse>;

    /// Appends base64 `content` at `offset`.
    fn upload_chunk(
        &self,
        path: &str,
        content: String,
        offset: u64,
    ) -> TransportFuture<'_, UploadStatusResponse>;

    /// Returns the authoritative offset for `path`.
    fn upload_status(&self, path: &str) -> TransportFuture<'_, UploadStatusResponse>;

    /// Releases server-side state for a partial upload.
    fn delete_uploading(&self, path: &str) -> TransportFuture<'_, ()>;

    /// Lists partial uploads the endpoint still holds.
    fn list_uploadings(&self) -> TransportFuture<'_, ListUploadingsResponse>;
}
