//! Base64 encoding and decoding utilities

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::error::{AppError, Result};

/// Encode binary data to base64 string
pub fn encode(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decode base64 string to binary data.
///
/// Everything up to and including the last comma is treated as a transport
/// header (e.g. `data:image/png;base64,`) and dropped.
pub fn decode(encoded: &str) -> Result<Vec<u8>> {
    let data = strip_header(encoded);

    STANDARD
        .decode(data.trim())
        .map_err(|e| AppError::Decode(format!("invalid base64 data: {}", e)))
}

/// Payload part of a possibly data-URL prefixed string
pub fn strip_header(encoded: &str) -> &str {
    match encoded.rfind(',') {
        Some(index) => &encoded[index + 1..],
        None => encoded,
    }
}

/// Create a data URL from binary image data
pub fn create_data_url(data: &[u8], format: &str) -> String {
    let encoded = encode(data);
    format!("data:image/{};base64,{}", format, encoded)
}
