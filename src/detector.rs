use rustfft::{num_complex::Complex, FftPlanner};
use tracing::debug;

use crate::layout::{
    payload_size, LayoutHints, LayoutParameters, Provenance, Source, DEFAULT_HEADER_SIZE,
    DEFAULT_SAMPLE_RATE, DEFAULT_TRAILER_SIZE,
};

/// Readings per second used by the recorder family
pub const RATE_CANDIDATES: [u32; 8] = [100, 120, 125, 128, 150, 160, 180, 200];
/// Header/trailer sizes seen in practice
pub const SIZE_CANDIDATES: [usize; 6] = [0, 64, 128, 256, 512, 1024];

/// Header plus trailer bytes that must repeat at a lag before it counts as a period
const MIN_REPEAT_BYTES: usize = 16;
/// Records worth of bytes fed to the autocorrelation
const ANALYSIS_RECORDS: usize = 8;
/// Normalized autocorrelation below this is not considered a period
const MIN_PERIOD_SCORE: f64 = 0.01;
/// Strongest lags tried against the repeat check
const TOP_LAGS: usize = 8;
/// Disagreeing 16-bit units tolerated inside a header/trailer run
const RUN_GAP_UNITS: usize = 4;

/// What the byte stream says about its own structure
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Evidence {
    /// Record size confirmed by repeating header/trailer bytes
    pub period: Option<usize>,
    /// Length of the repeating run at the start of each record
    pub header: Option<usize>,
    /// Length of the repeating run at the end of each record
    pub trailer: Option<usize>,
}

/// Result of layout inference
#[derive(Debug, Clone)]
pub struct LayoutInference {
    pub params: LayoutParameters,
    pub provenance: Provenance,
    pub evidence: Evidence,
}

/// Sort key for a candidate layout; lower is better
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Score {
    pub boundary_error: usize,
    pub residual: usize,
    pub nonstandard_sizes: usize,
    pub rate_distance: u32,
    pub size_distance: usize,
}

/// Fill in whatever the caller left unset
/// Never fails: unknowns fall back to 512/512/150 when nothing fits
pub fn infer_layout(bytes: &[u8], hints: &LayoutHints) -> LayoutInference {
    if let Ok(Some(params)) = hints.to_params() {
        return LayoutInference {
            params,
            provenance: Provenance::supplied(),
            evidence: Evidence::default(),
        };
    }

    let evidence = gather_evidence(bytes, hints);
    debug!(?evidence, "structural evidence");

    let chosen = choose_layout(bytes.len(), hints, &evidence);
    let source = |supplied: bool| match (supplied, chosen.is_some()) {
        (true, _) => Source::Supplied,
        (false, true) => Source::Inferred,
        (false, false) => Source::Default,
    };
    let provenance = Provenance {
        header_size: source(hints.header_size.is_some()),
        trailer_size: source(hints.trailer_size.is_some()),
        sample_rate: source(hints.sample_rate.is_some()),
    };

    let params = chosen.unwrap_or(LayoutParameters {
        header_size: hints.header_size.unwrap_or(DEFAULT_HEADER_SIZE),
        trailer_size: hints.trailer_size.unwrap_or(DEFAULT_TRAILER_SIZE),
        sample_rate: hints.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE),
    });

    LayoutInference {
        params,
        provenance,
        evidence,
    }
}

/// Look for a record period and, if found, the run lengths around it
pub fn gather_evidence(bytes: &[u8], hints: &LayoutHints) -> Evidence {
    let (min_lag, max_lag) = lag_range(hints);
    let window = &bytes[..bytes.len().min(max_lag.saturating_mul(ANALYSIS_RECORDS))];

    match detect_period(window, min_lag, max_lag) {
        Some(period) => {
            let (header, trailer) = estimate_boundaries(bytes, period);
            Evidence {
                period: Some(period),
                header,
                trailer,
            }
        }
        None => Evidence::default(),
    }
}

/// Smallest and largest plausible record size given the hints
fn lag_range(hints: &LayoutHints) -> (usize, usize) {
    let rates: Vec<u32> = candidate_rates(hints);
    let min_payload = rates.iter().map(|&r| payload_size(r)).min().unwrap_or(0);
    let max_payload = rates.iter().map(|&r| payload_size(r)).max().unwrap_or(0);
    let largest = SIZE_CANDIDATES[SIZE_CANDIDATES.len() - 1];

    let min_lag = min_payload
        .saturating_add(hints.header_size.unwrap_or(0))
        .saturating_add(hints.trailer_size.unwrap_or(0));
    let max_lag = max_payload
        .saturating_add(hints.header_size.unwrap_or(largest))
        .saturating_add(hints.trailer_size.unwrap_or(largest));
    (min_lag.max(1), max_lag.max(1))
}

fn candidate_rates(hints: &LayoutHints) -> Vec<u32> {
    match hints.sample_rate {
        Some(rate) => vec![rate],
        None => RATE_CANDIDATES.to_vec(),
    }
    .into_iter()
    .filter(|&r| r > 0)
    .collect()
}

fn candidate_sizes(hint: Option<usize>, estimate: Option<usize>) -> Vec<usize> {
    match hint {
        Some(size) => vec![size],
        None => {
            let mut sizes = SIZE_CANDIDATES.to_vec();
            if let Some(est) = estimate {
                if !sizes.contains(&est) {
                    sizes.push(est);
                }
            }
            sizes
        }
    }
}

/// Enumerate candidate layouts and keep the best admissible one
pub fn choose_layout(
    stream_len: usize,
    hints: &LayoutHints,
    evidence: &Evidence,
) -> Option<LayoutParameters> {
    let headers = candidate_sizes(hints.header_size, evidence.header);
    let trailers = candidate_sizes(hints.trailer_size, evidence.trailer);

    let mut best: Option<(Score, LayoutParameters)> = None;
    for &sample_rate in &candidate_rates(hints) {
        for &header_size in &headers {
            for &trailer_size in &trailers {
                let params = LayoutParameters {
                    header_size,
                    trailer_size,
                    sample_rate,
                };
                let Some(score) = score_candidate(stream_len, &params, evidence) else {
                    continue;
                };
                if best.as_ref().map_or(true, |(b, _)| score < *b) {
                    best = Some((score, params));
                }
            }
        }
    }

    if let Some((score, params)) = &best {
        debug!(%params, ?score, "best candidate layout");
    }
    best.map(|(_, params)| params)
}

/// Score a candidate, or `None` if the stream rules it out
pub fn score_candidate(
    stream_len: usize,
    params: &LayoutParameters,
    evidence: &Evidence,
) -> Option<Score> {
    let record = params.record_size();
    if record == 0 || record > stream_len {
        return None;
    }

    let residual = stream_len % record;
    match evidence.period {
        Some(period) if record != period => return None,
        None if residual != 0 => return None,
        _ => {}
    }

    let boundary_error = evidence
        .header
        .map_or(0, |h| h.abs_diff(params.header_size))
        + evidence
            .trailer
            .map_or(0, |t| t.abs_diff(params.trailer_size));
    let nonstandard_sizes = [params.header_size, params.trailer_size]
        .into_iter()
        .filter(|s| !SIZE_CANDIDATES.contains(s))
        .count();

    Some(Score {
        boundary_error,
        residual,
        nonstandard_sizes,
        rate_distance: params.sample_rate.abs_diff(DEFAULT_SAMPLE_RATE),
        size_distance: params.header_size.abs_diff(DEFAULT_HEADER_SIZE)
            + params.trailer_size.abs_diff(DEFAULT_TRAILER_SIZE),
    })
}

/// Find the record period as the strongest autocorrelation lag at which
/// consecutive records share a header/trailer run
pub fn detect_period(bytes: &[u8], min_lag: usize, max_lag: usize) -> Option<usize> {
    let n = bytes.len();
    if n < min_lag.saturating_add(MIN_REPEAT_BYTES) {
        return None;
    }
    // keep at least a quarter of the window overlapping
    let max_lag = max_lag.min(n - n / 4).min(n - MIN_REPEAT_BYTES);
    if max_lag < min_lag {
        return None;
    }

    let signal = parity_centered(bytes);
    let acf = autocorrelation(&signal);
    let energy = acf[0] / n as f64;
    if energy <= f64::EPSILON {
        return None;
    }

    let mut scored: Vec<(usize, f64)> = (min_lag..=max_lag)
        .map(|lag| (lag, acf[lag] / (n - lag) as f64 / energy))
        .filter(|&(_, score)| score >= MIN_PERIOD_SCORE)
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let period = scored
        .iter()
        .take(TOP_LAGS)
        .map(|&(lag, _)| lag)
        .find(|&lag| repeats_at(bytes, lag))?;

    // the strongest lag may be a multiple of the true record size
    let reduced = [3, 2]
        .iter()
        .filter(|&&d| period % d == 0 && period / d >= min_lag)
        .map(|&d| period / d)
        .find(|&lag| repeats_at(bytes, lag))
        .unwrap_or(period);

    debug!(period = reduced, "record period detected");
    Some(reduced)
}

/// Bytes centered on the mean of their parity, which removes the low/high
/// byte structure of the 16-bit cells
fn parity_centered(bytes: &[u8]) -> Vec<f64> {
    let mut sums = [0.0f64; 2];
    let mut counts = [0usize; 2];
    for (i, &b) in bytes.iter().enumerate() {
        sums[i % 2] += b as f64;
        counts[i % 2] += 1;
    }
    let means = [
        sums[0] / counts[0].max(1) as f64,
        sums[1] / counts[1].max(1) as f64,
    ];

    bytes
        .iter()
        .enumerate()
        .map(|(i, &b)| b as f64 - means[i % 2])
        .collect()
}

/// Linear (non-circular) autocorrelation via zero-padded FFT
/// Element `k` is the raw sum over the `n - k` overlapping products
pub fn autocorrelation(signal: &[f64]) -> Vec<f64> {
    let n = signal.len();
    if n == 0 {
        return vec![];
    }
    let size = (2 * n).next_power_of_two();

    let mut planner = FftPlanner::<f64>::new();
    let forward = planner.plan_fft_forward(size);
    let inverse = planner.plan_fft_inverse(size);

    let mut buffer: Vec<Complex<f64>> = signal
        .iter()
        .map(|&x| Complex::new(x, 0.0))
        .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
        .take(size)
        .collect();

    forward.process(&mut buffer);
    for c in buffer.iter_mut() {
        *c = Complex::new(c.norm_sqr(), 0.0);
    }
    inverse.process(&mut buffer);

    buffer.iter().take(n).map(|c| c.re / size as f64).collect()
}

/// Whether records `lag` bytes apart share enough header/trailer bytes
/// Per-record fields such as counters only open short gaps in the runs
fn repeats_at(bytes: &[u8], lag: usize) -> bool {
    let (header, trailer) = estimate_boundaries(bytes, lag);
    header.unwrap_or(0) + trailer.unwrap_or(0) >= MIN_REPEAT_BYTES
}

/// Fraction of record pairs `(k, k+1)` whose 16-bit unit at `offset` agrees
fn unit_agreement(bytes: &[u8], period: usize, offset: usize) -> Option<f64> {
    let mut compared = 0usize;
    let mut agreed = 0usize;
    let mut k = 0;
    while (k + 1) * period + offset + 2 <= bytes.len() {
        let a = k * period + offset;
        let b = (k + 1) * period + offset;
        compared += 1;
        if bytes[a..a + 2] == bytes[b..b + 2] {
            agreed += 1;
        }
        k += 1;
    }
    (compared > 0).then(|| agreed as f64 / compared as f64)
}

/// Length in bytes of the agreeing run, walking unit offsets in order
fn run_length(bytes: &[u8], period: usize, offsets: impl Iterator<Item = usize>) -> Option<usize> {
    let mut units = 0;
    let mut gap = 0;
    let mut seen = false;

    for (i, offset) in offsets.enumerate() {
        let Some(rate) = unit_agreement(bytes, period, offset) else {
            break;
        };
        seen = true;
        if rate >= 0.5 {
            units = i + 1;
            gap = 0;
        } else {
            gap += 1;
            if gap > RUN_GAP_UNITS {
                break;
            }
        }
    }
    seen.then_some(units * 2)
}

/// Estimate header and trailer sizes from what repeats at both ends of a record
pub fn estimate_boundaries(bytes: &[u8], period: usize) -> (Option<usize>, Option<usize>) {
    let units = period / 2;
    let header = run_length(bytes, period, (0..units).map(|i| i * 2));
    let trailer = run_length(bytes, period, (0..units).map(|j| period - 2 * (j + 1)));

    let trailer = match (header, trailer) {
        (Some(h), Some(t)) => Some(t.min(period.saturating_sub(h))),
        (_, t) => t,
    };
    (header, trailer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Source;

    struct XorShift(u64);

    impl XorShift {
        fn next(&mut self) -> u64 {
            let mut x = self.0;
            x ^= x << 13;
            x ^= x >> 7;
            x ^= x << 17;
            self.0 = x;
            x
        }

        fn bytes(&mut self, n: usize) -> Vec<u8> {
            (0..n).map(|_| self.next() as u8).collect()
        }
    }

    /// Records with fixed header/trailer signatures and random ECG-like cells
    fn synth(records: usize, header: usize, trailer: usize, rate: u32) -> Vec<u8> {
        let mut rng = XorShift(0x9E37_79B9_7F4A_7C15);
        let header_sig = rng.bytes(header);
        let trailer_sig = rng.bytes(trailer);

        let mut out = Vec::new();
        for _ in 0..records {
            out.extend_from_slice(&header_sig);
            for _ in 0..rate as usize * 30 {
                let signal = 800 + (rng.next() % 2200) as u16;
                let quality = (rng.next() % 4) as u16;
                out.extend_from_slice(&((quality << 12) | signal).to_le_bytes());
            }
            out.extend_from_slice(&trailer_sig);
        }
        out
    }

    #[test]
    fn recovers_layout_from_signatures() {
        let bytes = synth(4, 256, 256, 150);
        let inference = infer_layout(&bytes, &LayoutHints::default());

        assert_eq!(inference.evidence.period, Some(9512));
        assert_eq!(inference.evidence.header, Some(256));
        assert_eq!(inference.evidence.trailer, Some(256));
        assert_eq!(inference.params, LayoutParameters::new(256, 256, 150).unwrap());
        assert_eq!(inference.provenance.sample_rate, Source::Inferred);
        assert_eq!(inference.provenance.header_size, Source::Inferred);
    }

    #[test]
    fn recovers_truncated_recording() {
        let mut bytes = synth(4, 512, 512, 125);
        bytes.truncate(bytes.len() - 3000);

        let inference = infer_layout(&bytes, &LayoutHints::default());
        assert_eq!(inference.params, LayoutParameters::new(512, 512, 125).unwrap());
    }

    #[test]
    fn recovers_layout_when_header_starts_with_a_counter() {
        let (header, trailer, rate) = (512, 512, 125);
        let record = header + payload_size(rate) + trailer;
        let mut bytes = synth(4, header, trailer, rate);
        // first 8 header bytes change from record to record
        for k in 0..4 {
            for i in 0..8 {
                bytes[k * record + i] = (k * 8 + i) as u8 ^ 0x5A;
            }
        }
        bytes.truncate(bytes.len() - 3000);

        let inference = infer_layout(&bytes, &LayoutHints::default());
        assert_eq!(inference.evidence.period, Some(record));
        assert_eq!(inference.evidence.header, Some(header));
        assert_eq!(inference.params, LayoutParameters::new(header, trailer, rate).unwrap());
        assert_eq!(inference.provenance.sample_rate, Source::Inferred);
    }

    #[test]
    fn random_bytes_do_not_repeat() {
        let bytes = XorShift(17).bytes(20_000);
        assert!(!repeats_at(&bytes, 8524));
        assert!(!repeats_at(&bytes, 10_024));
    }

    #[test]
    fn huge_header_hint_does_not_overflow() {
        let bytes = synth(2, 256, 256, 150);
        let hints = LayoutHints {
            header_size: Some(usize::MAX / 4),
            ..LayoutHints::default()
        };
        let inference = infer_layout(&bytes, &hints);

        assert_eq!(inference.evidence, Evidence::default());
        assert_eq!(inference.params.header_size, usize::MAX / 4);
        assert_eq!(inference.provenance.sample_rate, Source::Default);
    }

    #[test]
    fn supplied_values_are_kept() {
        let bytes = synth(4, 256, 256, 150);
        let hints = LayoutHints {
            header_size: Some(256),
            ..LayoutHints::default()
        };
        let inference = infer_layout(&bytes, &hints);

        assert_eq!(inference.params, LayoutParameters::new(256, 256, 150).unwrap());
        assert_eq!(inference.provenance.header_size, Source::Supplied);
        assert_eq!(inference.provenance.trailer_size, Source::Inferred);
    }

    #[test]
    fn complete_hints_skip_analysis() {
        let hints = LayoutHints::from(LayoutParameters::new(4, 4, 2).unwrap());
        let inference = infer_layout(&[0u8; 10], &hints);

        assert_eq!(inference.params, LayoutParameters::new(4, 4, 2).unwrap());
        assert_eq!(inference.provenance, Provenance::supplied());
        assert_eq!(inference.evidence, Evidence::default());
    }

    #[test]
    fn short_file_falls_back_to_defaults() {
        let bytes = XorShift(7).bytes(1000);
        let inference = infer_layout(&bytes, &LayoutHints::default());

        assert_eq!(inference.params, LayoutParameters::default());
        assert_eq!(inference.provenance.sample_rate, Source::Default);
        assert_eq!(inference.provenance.header_size, Source::Default);
    }

    #[test]
    fn unmatched_length_falls_back_to_defaults() {
        // odd length: no even record size divides it, and random bytes never repeat
        let bytes = XorShift(11).bytes(30_001);
        let inference = infer_layout(&bytes, &LayoutHints::default());

        assert_eq!(inference.evidence.period, None);
        assert_eq!(inference.params, LayoutParameters::default());
        assert_eq!(inference.provenance.trailer_size, Source::Default);
    }

    #[test]
    fn default_keeps_supplied_rate() {
        let bytes = XorShift(13).bytes(501);
        let hints = LayoutHints {
            sample_rate: Some(128),
            ..LayoutHints::default()
        };
        let inference = infer_layout(&bytes, &hints);

        assert_eq!(inference.params, LayoutParameters::new(512, 512, 128).unwrap());
        assert_eq!(inference.provenance.sample_rate, Source::Supplied);
    }

    #[test]
    fn divisible_length_prefers_default_sizes() {
        // 3 x 10024: 150Hz with (0,1024), (1024,0), (512,512) all divide evenly
        let inference = choose_layout(30_072, &LayoutHints::default(), &Evidence::default());
        assert_eq!(inference, Some(LayoutParameters::new(512, 512, 150).unwrap()));
    }

    #[test]
    fn period_rules_out_other_record_sizes() {
        let evidence = Evidence {
            period: Some(10024),
            header: None,
            trailer: None,
        };
        let params = LayoutParameters::new(512, 512, 150).unwrap();
        assert!(score_candidate(40_000, &params, &evidence).is_some());

        let other = LayoutParameters::new(256, 256, 150).unwrap();
        assert!(score_candidate(40_000, &other, &evidence).is_none());
    }

    #[test]
    fn boundary_estimate_picks_split() {
        let evidence = Evidence {
            period: Some(10024),
            header: Some(0),
            trailer: Some(1024),
        };
        let chosen = choose_layout(30_072, &LayoutHints::default(), &evidence);
        assert_eq!(chosen, Some(LayoutParameters::new(0, 1024, 150).unwrap()));
    }

    #[test]
    fn record_larger_than_stream_is_inadmissible() {
        let params = LayoutParameters::default();
        assert!(score_candidate(10_000, &params, &Evidence::default()).is_none());
        assert!(score_candidate(10_024, &params, &Evidence::default()).is_some());
    }

    #[test]
    fn flat_content_has_no_period() {
        assert_eq!(detect_period(&vec![0u8; 40_000], 6000, 14_048), None);
    }

    #[test]
    fn autocorrelation_matches_direct_sum() {
        let signal: Vec<f64> = (0..50).map(|i| ((i * 7) % 11) as f64 - 5.0).collect();
        let acf = autocorrelation(&signal);

        for lag in [0, 1, 5, 17, 49] {
            let direct: f64 = (0..signal.len() - lag)
                .map(|i| signal[i] * signal[i + lag])
                .sum();
            assert!((acf[lag] - direct).abs() < 1e-6, "lag {}", lag);
        }
    }

    #[test]
    fn boundaries_tolerate_short_gaps() {
        // header of 64 bytes with a 4-byte counter in the middle
        let mut rng = XorShift(3);
        let sig = rng.bytes(64);
        let period = 1000;
        let mut bytes = Vec::new();
        for k in 0..4u8 {
            let mut header = sig.clone();
            header[20] = k;
            header[22] = k;
            bytes.extend_from_slice(&header);
            bytes.extend(rng.bytes(period - 64));
        }

        let (header, _) = estimate_boundaries(&bytes, period);
        assert_eq!(header, Some(64));
    }
}
