use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::decoder::{decode_blocks, Recording};
use crate::detector::{infer_layout, LayoutInference};
use crate::error::{DecodeError, Result};
use crate::input::dat::read_dat;
use crate::input::RawStream;
use crate::layout::{LayoutHints, Source};
use crate::output::{
    create, default_prefix, plot_title, write_intervals_csv, write_samples_csv,
    write_waveform_png, write_waveform_wav, Artifact, OutputPaths,
};
use crate::slicer::slice_records;
use crate::suppressor::{suppress_artifacts, SuppressionReport};

/// What to write and where
#[derive(Debug, Clone)]
pub struct OutputOptions {
    pub prefix: Option<String>,
    pub include_quality: bool,
    pub write_wav: bool,
    pub write_png: bool,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            prefix: None,
            include_quality: true,
            write_wav: false,
            write_png: false,
        }
    }
}

/// Everything the pipeline derived from one dump
#[derive(Debug)]
pub struct Decoded {
    pub layout: LayoutInference,
    pub blocks: usize,
    pub partial_tail: bool,
    pub recording: Recording,
    pub suppression: SuppressionReport,
}

/// Infer, slice, decode and mask an in-memory dump
pub fn decode_stream(raw: &RawStream, hints: &LayoutHints) -> Result<Decoded> {
    hints.validate()?;

    if raw.is_empty() {
        warn!("input is empty");
    }

    let layout = infer_layout(raw.as_bytes(), hints);
    log_layout(&layout);

    let params = layout.params;
    let blocks = slice_records(raw.len(), &params);
    let partial_tail = match blocks.last() {
        Some(tail) if tail.partial => {
            debug!(
                record = tail.index,
                bytes = tail.len(),
                record_size = params.record_size(),
                "last record is truncated"
            );
            true
        }
        _ => false,
    };
    debug!(blocks = blocks.len(), "stream sliced");

    let mut recording = decode_blocks(raw, &blocks, params.sample_rate);
    let suppression = suppress_artifacts(&mut recording);
    debug!(
        min_signal = ?suppression.min_signal,
        replacement = suppression.replacement,
        masked = suppression.masked_samples(),
        source = ?suppression.source,
        "header/trailer cells masked"
    );

    Ok(Decoded {
        layout,
        blocks: blocks.len(),
        partial_tail,
        recording,
        suppression,
    })
}

fn log_layout(layout: &LayoutInference) {
    let p = &layout.provenance;
    info!(
        header = layout.params.header_size,
        header_from = %p.header_size,
        trailer = layout.params.trailer_size,
        trailer_from = %p.trailer_size,
        rate = layout.params.sample_rate,
        rate_from = %p.sample_rate,
        period = ?layout.evidence.period,
        "layout"
    );
    if [p.header_size, p.trailer_size, p.sample_rate].contains(&Source::Default) {
        warn!("could not infer the full layout from the data, using defaults");
    }
}

/// Decode a dump on disk and write the requested outputs
/// Returns each file written with its kind
pub fn process_file(
    input_path: &Path,
    hints: &LayoutHints,
    options: &OutputOptions,
) -> Result<Vec<(Artifact, PathBuf)>> {
    // read before creating anything, so a bad input leaves no output behind
    let raw = read_dat(input_path)?;
    info!(path = %input_path.display(), size = raw.len(), "loaded");

    let decoded = decode_stream(&raw, hints)?;
    let recording = &decoded.recording;

    info!(
        record_size = decoded.layout.params.record_size(),
        blocks = decoded.blocks,
        partial_tail = decoded.partial_tail,
        samples = recording.len(),
        unpaired_bytes = recording.unpaired_bytes,
        seconds = recording.duration_secs(),
        "decoded"
    );
    if recording.is_empty() {
        warn!("no samples decoded");
    }

    let prefix = options
        .prefix
        .clone()
        .unwrap_or_else(|| default_prefix(input_path));
    let paths = OutputPaths::from_prefix(&prefix);
    let mut written = Vec::new();

    let file = create(&paths.samples_csv)?;
    write_samples_csv(file, recording, options.include_quality)
        .map_err(|e| DecodeError::io(&paths.samples_csv, e))?;
    written.push((Artifact::ParsedCsv, paths.samples_csv.clone()));

    if decoded.suppression.intervals.is_empty() {
        info!("no header/trailer regions to mask");
    } else {
        let file = create(&paths.intervals_csv)?;
        write_intervals_csv(
            file,
            &decoded.suppression.intervals,
            recording.sample_rate,
            decoded.suppression.replacement,
        )
        .map_err(|e| DecodeError::io(&paths.intervals_csv, e))?;
        written.push((Artifact::IntervalsCsv, paths.intervals_csv.clone()));
    }

    if options.write_wav {
        write_waveform_wav(&paths.waveform_wav, recording)?;
        written.push((Artifact::WaveformWav, paths.waveform_wav.clone()));
    }

    if options.write_png {
        write_waveform_png(&paths.waveform_png, recording, &plot_title(&prefix, recording))?;
        written.push((Artifact::WaveformPng, paths.waveform_png.clone()));
    }

    Ok(written)
}
