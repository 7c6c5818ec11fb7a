use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use hound::{SampleFormat, WavSpec, WavWriter};
use plotters::prelude::*;
use plotters::style::{register_font, FontStyle};
use tracing::{debug, warn};

use crate::decoder::{Recording, Sample};
use crate::error::{DecodeError, Result};

/// Mid-scale of the 12-bit amplitude range
const AMPLITUDE_CENTER: i32 = 2048;

/// Plot size in pixels
const PLOT_SIZE: (u32, u32) = (1800, 600);

/// Sans-serif fonts tried for plot text, first readable one wins
const FONT_PATHS: [&str; 5] = [
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
];

/// Kinds of file the decoder writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    ParsedCsv,
    IntervalsCsv,
    WaveformWav,
    WaveformPng,
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Artifact::ParsedCsv => "parsed CSV",
            Artifact::IntervalsCsv => "intervals CSV",
            Artifact::WaveformWav => "waveform WAV",
            Artifact::WaveformPng => "waveform PNG",
        };
        f.write_str(s)
    }
}

/// Write one row per sample: `sample_index,time_s,amplitude_12bit[,quality_flag]`
pub fn write_samples_csv<W: Write>(
    out: W,
    recording: &Recording,
    include_quality: bool,
) -> std::io::Result<()> {
    let mut out = BufWriter::new(out);

    if include_quality {
        writeln!(out, "sample_index,time_s,amplitude_12bit,quality_flag")?;
    } else {
        writeln!(out, "sample_index,time_s,amplitude_12bit")?;
    }

    for Sample { index, signal, quality, .. } in &recording.samples {
        let time = recording.time_of(*index);
        if include_quality {
            writeln!(out, "{},{:.6},{},{}", index, time, signal, quality)?;
        } else {
            writeln!(out, "{},{:.6},{}", index, time, signal)?;
        }
    }

    out.flush()
}

/// Write the log of masked header/trailer intervals
pub fn write_intervals_csv<W: Write>(
    out: W,
    intervals: &[Range<usize>],
    sample_rate: u32,
    replacement: u16,
) -> std::io::Result<()> {
    let mut out = BufWriter::new(out);
    let rate = sample_rate as f64;

    writeln!(out, "start_sample,end_sample,start_s,end_s,duration_s,replacement_value")?;
    for interval in intervals {
        writeln!(
            out,
            "{},{},{:.6},{:.6},{:.6},{}",
            interval.start,
            interval.end,
            interval.start as f64 / rate,
            interval.end as f64 / rate,
            interval.len() as f64 / rate,
            replacement
        )?;
    }

    out.flush()
}

/// Write the decoded amplitudes as mono int16 PCM at the recording's rate
pub fn write_waveform_wav<P: AsRef<Path>>(path: P, recording: &Recording) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: recording.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;

    for sample in &recording.samples {
        // 12-bit unsigned -> 16-bit signed around mid-scale
        let centered = (sample.signal as i32 - AMPLITUDE_CENTER) * 16;
        writer.write_sample(centered.clamp(i16::MIN as i32, i16::MAX as i32) as i16)?;
    }

    writer.finalize()?;
    Ok(())
}

/// Plot amplitude against time into a PNG
/// Text is drawn only when a system font could be loaded
pub fn write_waveform_png(path: &Path, recording: &Recording, title: &str) -> Result<()> {
    let labelled = plot_font_loaded();

    let rate = recording.sample_rate.max(1) as f64;
    let duration = (recording.len().max(1) as f64) / rate;
    let (low, high) = recording
        .samples
        .iter()
        .fold((u16::MAX, 0u16), |(lo, hi), s| (lo.min(s.signal), hi.max(s.signal)));
    let (low, high) = if low > high { (0, 4095) } else { (low, high) };
    let y_range = (low as f64 - 10.0)..(high as f64 + 10.0);

    let root = BitMapBackend::new(path, PLOT_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(|e| plot_error(path, e))?;

    let mut builder = ChartBuilder::on(&root);
    builder.margin(15).x_label_area_size(45).y_label_area_size(60);
    if labelled {
        builder.caption(title, ("sans-serif", 26));
    }
    let mut chart = builder
        .build_cartesian_2d(0f64..duration, y_range)
        .map_err(|e| plot_error(path, e))?;

    let mut mesh = chart.configure_mesh();
    if labelled {
        mesh.x_desc("Time (s)").y_desc("Amplitude (12-bit units)");
    } else {
        mesh.x_labels(0).y_labels(0);
    }
    mesh.draw().map_err(|e| plot_error(path, e))?;

    chart
        .draw_series(LineSeries::new(
            recording
                .samples
                .iter()
                .map(|s| (s.index as f64 / rate, s.signal as f64)),
            BLUE.stroke_width(1),
        ))
        .map_err(|e| plot_error(path, e))?;

    root.present().map_err(|e| plot_error(path, e))?;
    Ok(())
}

fn plot_error(path: &Path, e: impl fmt::Display) -> DecodeError {
    DecodeError::Plot {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

/// Register the first readable font under the `sans-serif` family, once
fn plot_font_loaded() -> bool {
    static LOADED: OnceLock<bool> = OnceLock::new();
    *LOADED.get_or_init(|| {
        for path in FONT_PATHS {
            let Ok(bytes) = std::fs::read(path) else {
                continue;
            };
            // the registry keeps fonts for the life of the process
            let bytes: &'static [u8] = Box::leak(bytes.into_boxed_slice());
            if register_font("sans-serif", FontStyle::Normal, bytes).is_ok() {
                debug!(font = path, "plot font loaded");
                return true;
            }
        }
        warn!("no usable font found, plot will have no labels");
        false
    })
}

/// Title line for the waveform plot
pub fn plot_title(prefix: &str, recording: &Recording) -> String {
    let name = Path::new(prefix)
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| prefix.to_string());
    format!(
        "{} — {} samples @ {} Hz",
        name,
        recording.len(),
        recording.sample_rate
    )
}

/// Create a file for writing, mapping failures to a path-carrying error
pub fn create(path: &Path) -> Result<File> {
    File::create(path).map_err(|e| DecodeError::io(path, e))
}

/// Output file names derived from a prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub samples_csv: PathBuf,
    pub intervals_csv: PathBuf,
    pub waveform_wav: PathBuf,
    pub waveform_png: PathBuf,
}

impl OutputPaths {
    pub fn from_prefix(prefix: &str) -> Self {
        Self {
            samples_csv: PathBuf::from(format!("{}_parsed.csv", prefix)),
            intervals_csv: PathBuf::from(format!("{}_intervals.csv", prefix)),
            waveform_wav: PathBuf::from(format!("{}_waveform.wav", prefix)),
            waveform_png: PathBuf::from(format!("{}_waveform.png", prefix)),
        }
    }
}

/// Prefix to use when none is given: the input file stem
pub fn default_prefix(input: &Path) -> String {
    input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "recording".to_string())
}
