//! PCM helpers shared by the engine and its hosts.
//!
//! The engine consumes 16-bit linear PCM, mono, at [`SAMPLE_RATE`]. Hosts that
//! capture or decode audio in other shapes use these helpers (and
//! [`resample::RateConverter`]) to get there.
//!
//! [`SAMPLE_RATE`]: crate::SAMPLE_RATE

pub mod resample;

/// Normalized RMS level of a 16-bit frame, in [0, 1].
pub fn rms_i16(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples
        .iter()
        .map(|&s| {
            let v = f64::from(s) / f64::from(i16::MAX);
            v * v
        })
        .sum();
    ((sum_sq / samples.len() as f64).sqrt() as f32).min(1.0)
}

/// Convert f32 samples in [-1, 1] to 16-bit PCM, clamping out-of-range values.
pub fn f32_to_i16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| {
            let s = if s.is_finite() { s.clamp(-1.0, 1.0) } else { 0.0 };
            (s * f32::from(i16::MAX)).round() as i16
        })
        .collect()
}

/// Convert 16-bit PCM to f32 in [-1, 1].
pub fn i16_to_f32(samples: &[i16]) -> Vec<f32> {
    samples
        .iter()
        .map(|&s| f32::from(s) / f32::from(i16::MAX))
        .collect()
}

/// Average interleaved channels down to mono.
pub fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}
