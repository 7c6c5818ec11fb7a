use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod decoder;
mod detector;
mod error;
mod input;
mod layout;
mod output;
mod pipeline;
mod slicer;
mod suppressor;

use layout::LayoutHints;
use pipeline::OutputOptions;

/// Decode PC-80B ECG recorder dumps into CSV waveforms
#[derive(Parser, Debug)]
#[command(name = "pc80b-decode")]
#[command(version, about, long_about = None)]
struct Args {
    /// Input .dat file
    #[arg(value_name = "INPUT")]
    input_file: PathBuf,

    /// Header size in bytes (inferred when omitted, fallback 512)
    #[arg(long, value_name = "BYTES")]
    header_size: Option<usize>,

    /// Trailer size in bytes (inferred when omitted, fallback 512)
    #[arg(long, value_name = "BYTES")]
    trailer_size: Option<usize>,

    /// Sample rate in Hz (inferred when omitted, fallback 150)
    #[arg(long, value_name = "HZ", value_parser = clap::value_parser!(u32).range(1..))]
    samplerate: Option<u32>,

    /// Prefix for output files (default: input file stem)
    #[arg(short, long)]
    output_prefix: Option<String>,

    /// Leave the quality nibble out of the CSV
    #[arg(long)]
    no_quality: bool,

    /// Also write the waveform as a 16-bit WAV
    #[arg(long)]
    wav: bool,

    /// Also plot the waveform to a PNG
    #[arg(long)]
    png: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "pc80b_decode=debug" } else { "pc80b_decode=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(default_level.parse()?))
        .init();

    let hints = LayoutHints {
        header_size: args.header_size,
        trailer_size: args.trailer_size,
        sample_rate: args.samplerate,
    };
    let options = OutputOptions {
        prefix: args.output_prefix,
        include_quality: !args.no_quality,
        write_wav: args.wav,
        write_png: args.png,
    };

    let written = pipeline::process_file(&args.input_file, &hints, &options)
        .with_context(|| format!("failed to decode {}", args.input_file.display()))?;

    for (kind, path) in &written {
        println!("Saved {}: {}", kind, path.display());
    }

    Ok(())
}
