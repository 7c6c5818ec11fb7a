pub mod dat;

use std::ops::Range;

/// Entire content of a recorder dump. Never mutated once loaded.
#[derive(Debug, Clone)]
pub struct RawStream {
    bytes: Vec<u8>,
}

impl RawStream {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Byte view of a range, clamped to the stream end
    pub fn slice(&self, range: Range<usize>) -> &[u8] {
        let end = range.end.min(self.bytes.len());
        let start = range.start.min(end);
        &self.bytes[start..end]
    }
}
