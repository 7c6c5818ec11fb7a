use tracing::debug;

use crate::input::RawStream;
use crate::slicer::{RecordBlock, Region};

/// Low 12 bits of a cell: amplitude
pub const SIGNAL_MASK: u16 = 0x0FFF;
/// High 4 bits of a cell, after shifting: quality/contact code (undocumented)
pub const QUALITY_MASK: u16 = 0x0F;

/// One decoded 16-bit cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub index: usize,
    pub signal: u16,
    pub quality: u8,
    pub region: Region,
}

impl Sample {
    pub fn is_payload(&self) -> bool {
        self.region == Region::Payload
    }
}

/// Decoded samples of a whole dump, in stream order
#[derive(Debug, Clone)]
pub struct Recording {
    pub sample_rate: u32,
    pub samples: Vec<Sample>,
    /// Odd trailing bytes of regions that could not form a cell
    pub unpaired_bytes: usize,
}

impl Recording {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn time_of(&self, index: usize) -> f64 {
        index as f64 / self.sample_rate as f64
    }
}

/// Split a little-endian cell into (signal, quality)
pub fn decode_word(word: u16) -> (u16, u8) {
    let signal = word & SIGNAL_MASK;
    let quality = ((word >> 12) & QUALITY_MASK) as u8;
    (signal, quality)
}

/// Decode every region of every block, tagging samples with their region
/// Indices run contiguously across block boundaries
pub fn decode_blocks(raw: &RawStream, blocks: &[RecordBlock], sample_rate: u32) -> Recording {
    let capacity = raw.len() / 2;
    let mut samples = Vec::with_capacity(capacity);
    let mut unpaired_bytes = 0;

    for block in blocks {
        for (region, range) in block.regions() {
            let bytes = raw.slice(range);
            let cells = bytes.chunks_exact(2);
            unpaired_bytes += cells.remainder().len();

            for chunk in cells {
                let (signal, quality) = decode_word(u16::from_le_bytes([chunk[0], chunk[1]]));
                samples.push(Sample {
                    index: samples.len(),
                    signal,
                    quality,
                    region,
                });
            }
        }
    }

    if unpaired_bytes > 0 {
        debug!(unpaired_bytes, "regions with odd byte counts left bytes undecoded");
    }

    Recording {
        sample_rate,
        samples,
        unpaired_bytes,
    }
}
