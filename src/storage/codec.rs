//! Compression of stored content
//!
//! Comment pages are mostly repetitive HTML, so bodies are zlib-compressed
//! before they reach SQLite and inflated only when a caller asks for the text.

use crate::storage::{StorageError, StorageResult};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// Compresses text for storage; empty or absent text stores as NULL
pub fn compress(text: Option<&str>) -> StorageResult<Option<Vec<u8>>> {
    let text = match text {
        Some(text) if !text.is_empty() => text,
        _ => return Ok(None),
    };

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(text.as_bytes())?;
    Ok(Some(encoder.finish()?))
}

/// Inflates a stored blob back into text
pub fn decompress(bytes: &[u8]) -> StorageResult<String> {
    let mut decoder = ZlibDecoder::new(bytes);
    let mut text = String::new();
    decoder
        .read_to_string(&mut text)
        .map_err(|e| StorageError::Codec(e.to_string()))?;
    Ok(text)
}
