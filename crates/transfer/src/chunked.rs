use base64::{Engine, engine::general_purpose::STANDARD};

/// Returns the exclusive end of the next chunk: `min(offset + chunk_len, size)`.
pub fn chunk_boundary(offset: u64, chunk_len: u64, size: u64) -> u64 {
    offset.saturating_add(chunk_len).min(size)
}

/// Encodes raw chunk bytes as base64 text for the `content` field.
pub fn encode_chunk(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decodes a base64 `content` field back to bytes.
pub fn decode_chunk(content: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(content)
}
