//! Minimal SSZ support for the fixed-size containers the archiver handles.
//!
//! Every container here is built from fixed-size fields only, so its SSZ encoding is the plain
//! concatenation of the fields. There are no offsets to resolve.

use alloy_primitives::FixedBytes;

/// Errors raised while decoding or encoding fixed-size SSZ containers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SszError {
    /// The input does not have the exact size of the container.
    #[error("invalid ssz length: expected {expected} bytes, got {got}")]
    InvalidLength {
        /// Size of the container.
        expected: usize,
        /// Size of the input.
        got: usize,
    },
    /// The input ended in the middle of a field.
    #[error("unexpected end of ssz input at offset {offset}")]
    UnexpectedEof {
        /// Offset of the field that could not be read.
        offset: usize,
    },
    /// A blob field does not have the protocol defined length.
    #[error("invalid blob length: expected {expected} bytes, got {got}")]
    InvalidBlobLength {
        /// `BYTES_PER_BLOB`.
        expected: usize,
        /// Actual length of the blob.
        got: usize,
    },
}

/// Cursor over an SSZ buffer.
#[derive(Debug)]
pub(crate) struct SszReader<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> SszReader<'a> {
    pub(crate) const fn new(buf: &'a [u8]) -> Self {
        Self { buf, offset: 0 }
    }

    pub(crate) fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], SszError> {
        let end = self.offset + len;
        let bytes =
            self.buf.get(self.offset..end).ok_or(SszError::UnexpectedEof { offset: self.offset })?;
        self.offset = end;
        Ok(bytes)
    }

    pub(crate) fn read_u64(&mut self) -> Result<u64, SszError> {
        let bytes: [u8; 8] = self.read_fixed::<8>()?.0;
        Ok(u64::from_le_bytes(bytes))
    }

    pub(crate) fn read_fixed<const N: usize>(&mut self) -> Result<FixedBytes<N>, SszError> {
        self.read_bytes(N).map(FixedBytes::from_slice)
    }
}
