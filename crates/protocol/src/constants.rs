/// Upload session collection: `POST` creates, `GET` lists, `DELETE` releases.
pub const ROUTE_UPLOADINGS: &str = "/v1/fs/uploadings";

/// Chunk append route (`PATCH`).
pub const ROUTE_UPLOADING_DATA: &str = "/v1/fs/uploadings/data";

/// Authoritative offset route (`GET`).
pub const ROUTE_UPLOADING_STATUS: &str = "/v1/fs/uploadings/status";

/// Query parameter carrying the remote file path.
pub const QUERY_FILE_PATH: &str = "fp";

/// Request accepted.
pub const STATUS_OK: u16 = 200;

/// Upload session already exists and may be resumed.
pub const STATUS_NOT_MODIFIED: u16 = 304;

/// Returns `true` if a `create` status means the session is ready for chunks.
pub fn is_create_success(status: u16) -> bool {
    status == STATUS_OK || status == STATUS_NOT_MODIFIED
}
