use crate::TransferError;

/// Validates a logical remote destination path.
///
/// Remote paths are `/`-separated and relative to the endpoint's root, so
/// this works on the string rather than on the host's `Path` rules.
///
/// Rejects:
/// - Empty paths
/// - Leading `/`
/// - Parent directory segments (`..`)
/// - NUL bytes
/// - A trailing `/` (the destination must name a file)
pub fn validate_remote_path(file_path: &str) -> Result<(), TransferError> {
    if file_path.is_empty() {
        return Err(TransferError::InvalidPath("empty path".into()));
    }

    if file_path.starts_with('/') {
        return Err(TransferError::InvalidPath(format!(
            "absolute path not allowed: {file_path}"
        )));
    }

    if file_path.ends_with('/') {
        return Err(TransferError::InvalidPath(format!(
            "path names a directory: {file_path}"
        )));
    }

    if file_path.contains('\0') {
        return Err(TransferError::InvalidPath(format!(
            "NUL byte in path: {file_path:?}"
        )));
    }

    if file_path.split('/').any(|segment| segment == "..") {
        return Err(TransferError::InvalidPath(format!(
            "parent directory traversal not allowed: {file_path}"
        )));
    }

    Ok(())
}
