//! `reqwest` implementation of the upload transport.

use std::time::Duration;

use chunkup_protocol::constants::{
    QUERY_FILE_PATH, ROUTE_UPLOADING_DATA, ROUTE_UPLOADING_STATUS, ROUTE_UPLOADINGS,
    STATUS_NOT_MODIFIED, STATUS_OK,
};
use chunkup_protocol::messages::{
    CreateUploadRequest, CreateUploadResponse, ListUploadingsResponse, UploadChunkRequest,
    UploadStatusResponse,
};
use chunkup_uploader::{Response, Transport, TransportError, TransportFuture};
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use tracing::trace;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors from the HTTP transport.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid base URL: {0}")]
    InvalidUrl(String),
}

impl From<Error> for TransportError {
    fn from(e: Error) -> Self {
        match e {
            Error::Http(e) if e.is_timeout() || e.is_connect() => Self::Io(e.to_string()),
            Error::Http(e) => Self::Http(e.to_string()),
            Error::Json(e) => Self::Decode(e.to_string()),
            Error::InvalidUrl(url) => Self::Http(format!("invalid base URL: {url}")),
        }
    }
}

/// Upload transport speaking to the endpoint's HTTP routes.
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Creates a transport for `base_url` (e.g. `https://files.example.com`).
    pub fn new(base_url: &str) -> Result<Self, Error> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    /// Same as [`new`](Self::new) with a per-request timeout.
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, Error> {
        let base_url = base_url.trim_end_matches('/');
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(Error::InvalidUrl(base_url.to_string()));
        }

        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            base_url: base_url.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, route: &str) -> String {
        format!("{}{}", self.base_url, route)
    }

    /// Sends `req`; decodes a JSON payload on 200/304 when one is present.
    async fn call<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<Response<T>, Error> {
        let resp = req.send().await?;
        let status = resp.status().as_u16();
        let bytes = resp.bytes().await?;
        trace!(status, len = bytes.len(), "endpoint answered");

        let body = if (status == STATUS_OK || status == STATUS_NOT_MODIFIED) && !bytes.is_empty() {
            Some(serde_json::from_slice(&bytes)?)
        } else {
            None
        };
        Ok(Response { status, body })
    }

    /// Sends `req` and keeps only the status.
    async fn call_status(&self, req: RequestBuilder) -> Result<Response<()>, Error> {
        let resp = req.send().await?;
        let status = resp.status().as_u16();
        trace!(status, "endpoint answered");
        Ok(Response {
            status,
            body: (status == STATUS_OK).then_some(()),
        })
    }
}

impl Transport for HttpTransport {
    fn create(&self, path: &str, size: u64) -> TransportFuture<'_, CreateUploadResponse> {
        let req = self
            .http
            .post(self.url(ROUTE_UPLOADINGS))
            .json(&CreateUploadRequest {
                path: path.to_string(),
                file_size: size,
            });
        Box::pin(async move { self.call(req).await.map_err(Into::into) })
    }

    fn upload_chunk(
        &self,
        path: &str,
        content: String,
        offset: u64,
    ) -> TransportFuture<'_, UploadStatusResponse> {
        let req = self
            .http
            .patch(self.url(ROUTE_UPLOADING_DATA))
            .json(&UploadChunkRequest {
                path: path.to_string(),
                content,
                offset,
            });
        Box::pin(async move { self.call(req).await.map_err(Into::into) })
    }

    fn upload_status(&self, path: &str) -> TransportFuture<'_, UploadStatusResponse> {
        let req = self
            .http
            .get(self.url(ROUTE_UPLOADING_STATUS))
            .query(&[(QUERY_FILE_PATH, path)]);
        Box::pin(async move { self.call(req).await.map_err(Into::into) })
    }

    fn delete_uploading(&self, path: &str) -> TransportFuture<'_, ()> {
        let req = self
            .http
            .delete(self.url(ROUTE_UPLOADINGS))
            .query(&[(QUERY_FILE_PATH, path)]);
        Box::pin(async move { self.call_status(req).await.map_err(Into::into) })
    }

    fn list_uploadings(&self) -> TransportFuture<'_, ListUploadingsResponse> {
        let req = self.http.get(self.url(ROUTE_UPLOADINGS));
        Box::pin(async move { self.call(req).await.map_err(Into::into) })
    }
}
