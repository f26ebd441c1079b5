//! In-memory upload endpoint.
//!
//! Implements [`Transport`] against a process-local store with the same
//! offset rules as the remote endpoint. Responses can be scripted per
//! operation to simulate rejections, ambiguous failures and server-side
//! offset corrections.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chunkup_protocol::messages::{
    CreateUploadResponse, ListUploadingsResponse, UploadStatusResponse,
};
use chunkup_protocol::{STATUS_NOT_MODIFIED, UploadInfo};
use chunkup_transfer::decode_chunk;
use tracing::trace;

use crate::transport::{Response, Transport, TransportError, TransportFuture};

/// A canned answer consumed by the next call of one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scripted {
    /// Answer with this status and no payload. Nothing is stored.
    Status(u16),
    /// Fail below the HTTP layer.
    Fail(TransportError),
    /// Answer 200 with this `uploaded` value. Nothing is stored.
    Uploaded(u64),
}

/// A call observed by the endpoint, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointCall {
    Create { path: String, size: u64 },
    UploadChunk { path: String, offset: u64, len: usize },
    UploadStatus { path: String },
    DeleteUploading { path: String },
    ListUploadings,
}

struct PendingUpload {
    path: String,
    size: u64,
    data: Vec<u8>,
}

#[derive(Default)]
struct EndpointInner {
    pending: Vec<PendingUpload>,
    completed: HashMap<String, Vec<u8>>,
    create_script: VecDeque<Scripted>,
    chunk_script: VecDeque<Scripted>,
    status_script: VecDeque<Scripted>,
    calls: Vec<EndpointCall>,
}

/// Process-local upload endpoint.
#[derive(Default)]
pub struct MemoryEndpoint {
    inner: Mutex<EndpointInner>,
    chunk_delay: Duration,
}

impl MemoryEndpoint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every chunk answer, simulating a slow link.
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    pub fn script_create(&self, answer: Scripted) {
        self.lock().create_script.push_back(answer);
    }

    pub fn script_chunk(&self, answer: Scripted) {
        self.lock().chunk_script.push_back(answer);
    }

    pub fn script_status(&self, answer: Scripted) {
        self.lock().status_script.push_back(answer);
    }

    /// Preloads a partial upload, as if a previous process had sent `data`.
    pub fn seed_partial(&self, path: &str, size: u64, data: &[u8]) {
        self.lock().pending.push(PendingUpload {
            path: path.to_string(),
            size,
            data: data.to_vec(),
        });
    }

    /// All calls received so far.
    pub fn calls(&self) -> Vec<EndpointCall> {
        self.lock().calls.clone()
    }

    /// `(path, offset)` of every chunk call so far.
    pub fn chunk_offsets(&self) -> Vec<(String, u64)> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                EndpointCall::UploadChunk { path, offset, .. } => Some((path.clone(), *offset)),
                _ => None,
            })
            .collect()
    }

    /// Bytes of a fully uploaded file.
    pub fn completed(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().completed.get(path).cloned()
    }

    /// Stored length of a partial upload.
    pub fn pending_len(&self, path: &str) -> Option<u64> {
        self.lock()
            .pending
            .iter()
            .find(|p| p.path == path)
            .map(|p| p.data.len() as u64)
    }

    fn lock(&self) -> MutexGuard<'_, EndpointInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn status_of(inner: &EndpointInner, path: &str) -> Option<UploadStatusResponse> {
        if let Some(p) = inner.pending.iter().find(|p| p.path == path) {
            return Some(UploadStatusResponse {
                path: path.to_string(),
                uploaded: p.data.len() as u64,
                file_size: p.size,
            });
        }
        inner.completed.get(path).map(|data| UploadStatusResponse {
            path: path.to_string(),
            uploaded: data.len() as u64,
            file_size: data.len() as u64,
        })
    }

    fn append(
        inner: &mut EndpointInner,
        path: &str,
        content: &str,
        offset: u64,
    ) -> Result<Response<UploadStatusResponse>, TransportError> {
        let Some(idx) = inner.pending.iter().position(|p| p.path == path) else {
            return Ok(Response::status(404));
        };
        let Ok(bytes) = decode_chunk(content) else {
            return Ok(Response::status(400));
        };

        let upload = &mut inner.pending[idx];
        let stored = upload.data.len() as u64;
        if offset > stored {
            return Ok(Response::status(416));
        }

        // Bytes below the stored length are already on the server.
        let skip = (stored - offset) as usize;
        if skip < bytes.len() {
            let room = (upload.size - stored) as usize;
            let fresh = &bytes[skip..];
            upload.data.extend_from_slice(&fresh[..fresh.len().min(room)]);
        }

        let resp = UploadStatusResponse {
            path: path.to_string(),
            uploaded: upload.data.len() as u64,
            file_size: upload.size,
        };
        if resp.uploaded == upload.size {
            let done = inner.pending.remove(idx);
            inner.completed.insert(done.path, done.data);
        }
        Ok(Response::ok(resp))
    }
}

fn scripted<T>(answer: Scripted, body: impl FnOnce(u64) -> T) -> Result<Response<T>, TransportError> {
    match answer {
        Scripted::Status(status) => Ok(Response::status(status)),
        Scripted::Fail(e) => Err(e),
        Scripted::Uploaded(n) => Ok(Response::ok(body(n))),
    }
}

impl Transport for MemoryEndpoint {
    fn create(&self, path: &str, size: u64) -> TransportFuture<'_, CreateUploadResponse> {
        let path = path.to_string();
        Box::pin(async move {
            let mut inner = self.lock();
            inner.calls.push(EndpointCall::Create {
                path: path.clone(),
                size,
            });
            trace!(path = %path, size, "memory endpoint: create");

            let body = CreateUploadResponse {
                path: path.clone(),
                file_size: size,
            };
            if let Some(answer) = inner.create_script.pop_front() {
                return scripted(answer, |_| body);
            }

            if let Some(existing) = inner.pending.iter().find(|p| p.path == path) {
                if existing.size != size {
                    return Ok(Response::status(409));
                }
                return Ok(Response {
                    status: STATUS_NOT_MODIFIED,
                    body: Some(body),
                });
            }

            inner.completed.remove(&path);
            inner.pending.push(PendingUpload {
                path,
                size,
                data: Vec::new(),
            });
            Ok(Response::ok(body))
        })
    }

    fn upload_chunk(
        &self,
        path: &str,
        content: String,
        offset: u64,
    ) -> TransportFuture<'_, UploadStatusResponse> {
        let path = path.to_string();
        Box::pin(async move {
            let answer = {
                let mut inner = self.lock();
                inner.calls.push(EndpointCall::UploadChunk {
                    path: path.clone(),
                    offset,
                    len: content.len(),
                });
                inner.chunk_script.pop_front()
            };

            if !self.chunk_delay.is_zero() {
                tokio::time::sleep(self.chunk_delay).await;
            }

            let mut inner = self.lock();
            if let Some(answer) = answer {
                let file_size = Self::status_of(&inner, &path).map_or(0, |s| s.file_size);
                return scripted(answer, |uploaded| UploadStatusResponse {
                    path: path.clone(),
                    uploaded,
                    file_size,
                });
            }
            Self::append(&mut inner, &path, &content, offset)
        })
    }

    fn upload_status(&self, path: &str) -> TransportFuture<'_, UploadStatusResponse> {
        let path = path.to_string();
        Box::pin(async move {
            let mut inner = self.lock();
            inner.calls.push(EndpointCall::UploadStatus { path: path.clone() });

            let current = Self::status_of(&inner, &path);
            if let Some(answer) = inner.status_script.pop_front() {
                let file_size = current.map_or(0, |s| s.file_size);
                return scripted(answer, |uploaded| UploadStatusResponse {
                    path: path.clone(),
                    uploaded,
                    file_size,
                });
            }
            Ok(current.map_or_else(|| Response::status(404), Response::ok))
        })
    }

    fn delete_uploading(&self, path: &str) -> TransportFuture<'_, ()> {
        let path = path.to_string();
        Box::pin(async move {
            let mut inner = self.lock();
            inner
                .calls
                .push(EndpointCall::DeleteUploading { path: path.clone() });

            let before = inner.pending.len();
            inner.pending.retain(|p| p.path != path);
            if inner.pending.len() == before {
                return Ok(Response::status(404));
            }
            Ok(Response::ok(()))
        })
    }

    fn list_uploadings(&self) -> TransportFuture<'_, ListUploadingsResponse> {
        Box::pin(async move {
            let mut inner = self.lock();
            inner.calls.push(EndpointCall::ListUploadings);

            let upload_infos = inner
                .pending
                .iter()
                .map(|p| UploadInfo {
                    real_file_path: p.path.clone(),
                    size: p.size,
                    uploaded: p.data.len() as u64,
                })
                .collect();
            Ok(Response::ok(ListUploadingsResponse { upload_infos }))
        })
    }
}
