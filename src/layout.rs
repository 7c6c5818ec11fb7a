use std::fmt;

use crate::error::{DecodeError, Result};

/// Seconds of signal in one device record
pub const RECORD_SECONDS: usize = 30;
/// Bytes per packed 16-bit sample cell
pub const BYTES_PER_SAMPLE: usize = 2;

pub const DEFAULT_HEADER_SIZE: usize = 512;
pub const DEFAULT_TRAILER_SIZE: usize = 512;
pub const DEFAULT_SAMPLE_RATE: u32 = 150;

/// Structural parameters of a dump: region sizes in bytes and readings per second
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutParameters {
    pub header_size: usize,
    pub trailer_size: usize,
    pub sample_rate: u32,
}

impl LayoutParameters {
    pub fn new(header_size: usize, trailer_size: usize, sample_rate: u32) -> Result<Self> {
        if sample_rate == 0 {
            return Err(zero_rate());
        }
        checked_record_size(header_size, trailer_size, sample_rate).ok_or_else(overflow)?;
        Ok(Self {
            header_size,
            trailer_size,
            sample_rate,
        })
    }

    pub fn payload_size(&self) -> usize {
        payload_size(self.sample_rate)
    }

    /// Saturates at `usize::MAX`, which no stream can fill
    pub fn record_size(&self) -> usize {
        checked_record_size(self.header_size, self.trailer_size, self.sample_rate)
            .unwrap_or(usize::MAX)
    }
}

impl Default for LayoutParameters {
    fn default() -> Self {
        Self {
            header_size: DEFAULT_HEADER_SIZE,
            trailer_size: DEFAULT_TRAILER_SIZE,
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }
}

impl fmt::Display for LayoutParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "header={}B trailer={}B rate={}Hz (record={}B)",
            self.header_size,
            self.trailer_size,
            self.sample_rate,
            self.record_size()
        )
    }
}

/// Payload bytes in one full record at the given rate
pub fn payload_size(sample_rate: u32) -> usize {
    (sample_rate as usize).saturating_mul(RECORD_SECONDS * BYTES_PER_SAMPLE)
}

fn checked_record_size(header_size: usize, trailer_size: usize, sample_rate: u32) -> Option<usize> {
    header_size
        .checked_add(payload_size(sample_rate))?
        .checked_add(trailer_size)
}

fn zero_rate() -> DecodeError {
    DecodeError::InvalidLayout {
        reason: "sample rate must be at least 1 Hz".to_string(),
    }
}

fn overflow() -> DecodeError {
    DecodeError::InvalidLayout {
        reason: "header, payload and trailer sizes overflow the record size".to_string(),
    }
}

/// Parameters the caller fixed up front; `None` means "infer it"
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LayoutHints {
    pub header_size: Option<usize>,
    pub trailer_size: Option<usize>,
    pub sample_rate: Option<u32>,
}

impl LayoutHints {
    /// Complete layout if every field is fixed
    pub fn to_params(&self) -> Result<Option<LayoutParameters>> {
        match (self.header_size, self.trailer_size, self.sample_rate) {
            (Some(h), Some(t), Some(r)) => LayoutParameters::new(h, t, r).map(Some),
            _ => Ok(None),
        }
    }

    /// Reject hints no record layout can satisfy
    /// Unset fields count at their smallest, so inference still has room to fill them
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == Some(0) {
            return Err(zero_rate());
        }
        checked_record_size(
            self.header_size.unwrap_or(0),
            self.trailer_size.unwrap_or(0),
            self.sample_rate.unwrap_or(1),
        )
        .ok_or_else(overflow)?;
        Ok(())
    }
}

#[cfg(test)]
impl From<LayoutParameters> for LayoutHints {
    fn from(params: LayoutParameters) -> Self {
        Self {
            header_size: Some(params.header_size),
            trailer_size: Some(params.trailer_size),
            sample_rate: Some(params.sample_rate),
        }
    }
}

/// Where a layout parameter came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Supplied,
    Inferred,
    Default,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Source::Supplied => "supplied",
            Source::Inferred => "inferred",
            Source::Default => "default",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Provenance {
    pub header_size: Source,
    pub trailer_size: Source,
    pub sample_rate: Source,
}

impl Provenance {
    pub fn supplied() -> Self {
        Self {
            header_size: Source::Supplied,
            trailer_size: Source::Supplied,
            sample_rate: Source::Supplied,
        }
    }
}
