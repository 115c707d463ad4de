//! Gzip framing of stored objects.

use crate::StorageError;
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use std::io::{Read, Write};

/// The first two bytes of every gzip member.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Returns `true` if `data` starts with the gzip magic bytes.
///
/// JSON documents never do, so compressed and plain objects can be told apart on read.
pub(crate) fn is_gzip(data: &[u8]) -> bool {
    data.starts_with(&GZIP_MAGIC)
}

/// Compresses `data` with gzip at the default level.
pub(crate) fn gzip(data: &[u8]) -> Result<Vec<u8>, StorageError> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder.write_all(data).map_err(StorageError::Compression)?;
    encoder.finish().map_err(StorageError::Compression)
}

/// Inflates `data` if it is gzip framed, returns it unchanged otherwise.
pub(crate) fn maybe_gunzip(data: Vec<u8>) -> Result<Vec<u8>, StorageError> {
    if !is_gzip(&data) {
        return Ok(data)
    }
    let mut out = Vec::with_capacity(data.len() * 2);
    GzDecoder::new(data.as_slice()).read_to_end(&mut out).map_err(StorageError::Compression)?;
    Ok(out)
}
