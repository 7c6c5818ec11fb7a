//! Masking of header/trailer cells.
//!
//! Header and trailer bytes decode to arbitrary amplitudes. Plotted as signal they
//! show up as tall spikes every 30 s. Every such cell is flattened to a single
//! constant: 70% of the lowest genuine payload amplitude seen in the first 20 s.

use std::ops::Range;

use tracing::{debug, warn};

use crate::decoder::Recording;
use crate::slicer::Region;

/// Seconds of early recording used to find the baseline
pub const BASELINE_WINDOW_SECS: usize = 20;
/// Fraction of the baseline minimum written into masked cells
pub const BASELINE_FACTOR: f64 = 0.7;

/// Which samples the baseline minimum was taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaselineSource {
    /// Payload samples in the first 20 seconds
    EarlyWindow,
    /// No payload in the early window; every payload sample
    WholeRecording,
    /// No payload at all
    Default,
}

/// Outcome of one suppression pass
#[derive(Debug, Clone, PartialEq)]
pub struct SuppressionReport {
    pub source: BaselineSource,
    pub min_signal: Option<u16>,
    pub replacement: u16,
    /// Maximal runs of masked samples, as `[start, end)` indices
    pub intervals: Vec<Range<usize>>,
}

impl SuppressionReport {
    pub fn masked_samples(&self) -> usize {
        self.intervals.iter().map(|r| r.len()).sum()
    }
}

/// Minimum payload amplitude and where it came from
pub fn baseline_minimum(recording: &Recording) -> (Option<u16>, BaselineSource) {
    let window = recording.sample_rate as usize * BASELINE_WINDOW_SECS;

    let early = recording
        .samples
        .iter()
        .take_while(|s| s.index < window)
        .filter(|s| s.is_payload())
        .map(|s| s.signal)
        .min();
    if early.is_some() {
        return (early, BaselineSource::EarlyWindow);
    }

    let overall = recording
        .samples
        .iter()
        .filter(|s| s.is_payload())
        .map(|s| s.signal)
        .min();
    match overall {
        Some(_) => (overall, BaselineSource::WholeRecording),
        None => (None, BaselineSource::Default),
    }
}

pub fn replacement_value(min_signal: u16) -> u16 {
    (min_signal as f64 * BASELINE_FACTOR).round() as u16
}

/// Overwrite the signal of every header/trailer sample with the baseline replacement
/// Quality nibbles are left as decoded
pub fn suppress_artifacts(recording: &mut Recording) -> SuppressionReport {
    let (min_signal, source) = baseline_minimum(recording);
    let replacement = min_signal.map(replacement_value).unwrap_or(0);

    match source {
        BaselineSource::EarlyWindow => {}
        BaselineSource::WholeRecording => {
            debug!("no payload in the first {}s, using whole-recording minimum", BASELINE_WINDOW_SECS)
        }
        BaselineSource::Default => warn!("recording has no payload samples, masking with 0"),
    }

    let mut intervals: Vec<Range<usize>> = Vec::new();
    for sample in recording.samples.iter_mut() {
        if sample.region == Region::Payload {
            continue;
        }
        sample.signal = replacement;

        match intervals.last_mut() {
            Some(run) if run.end == sample.index => run.end += 1,
            _ => intervals.push(sample.index..sample.index + 1),
        }
    }

    SuppressionReport {
        source,
        min_signal,
        replacement,
        intervals,
    }
}
