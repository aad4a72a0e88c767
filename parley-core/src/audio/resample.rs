//! Sample-rate conversion using a rubato `FastFixedIn` resampler.
//!
//! Hosts decode or capture audio at whatever rate the source provides
//! (commonly 44.1 or 48 kHz). The engine requires [`SAMPLE_RATE`]. When the
//! source already matches, `RateConverter` is a passthrough and no rubato
//! session is created.
//!
//! ```ignore
//! let mut rc = RateConverter::new(48_000, parley_core::SAMPLE_RATE, 960)?;
//! let mut out = rc.process(&samples);
//! out.extend(rc.finish());
//! ```
//!
//! [`SAMPLE_RATE`]: crate::SAMPLE_RATE

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::{error, info};

use crate::error::{ParleyError, Result};

/// Converts f32 mono audio from one fixed sample rate to another.
pub struct RateConverter {
    /// `None` in passthrough mode.
    resampler: Option<FastFixedIn<f32>>,
    /// Holds partial input blocks between calls.
    input_buf: Vec<f32>,
    /// Input frames rubato expects per call.
    chunk_size: usize,
    /// `[1][output_frames_max]`.
    output_buf: Vec<Vec<f32>>,
}

impl RateConverter {
    /// # Errors
    /// `InvalidArgument` for zero rates or chunk size, or if rubato rejects
    /// the ratio.
    pub fn new(source_rate: u32, target_rate: u32, chunk_size: usize) -> Result<Self> {
        if source_rate == 0 || target_rate == 0 || chunk_size == 0 {
            return Err(ParleyError::InvalidArgument(format!(
                "resampler needs non-zero rates and chunk size (source={source_rate}, target={target_rate}, chunk={chunk_size})"
            )));
        }

        if source_rate == target_rate {
            return Ok(Self {
                resampler: None,
                input_buf: Vec::new(),
                chunk_size,
                output_buf: Vec::new(),
            });
        }

        let ratio = f64::from(target_rate) / f64::from(source_rate);
        let resampler = FastFixedIn::<f32>::new(ratio, 1.0, PolynomialDegree::Cubic, chunk_size, 1)
            .map_err(|e| ParleyError::InvalidArgument(format!("resampler init: {e}")))?;

        let max_out = resampler.output_frames_max();
        info!(source_rate, target_rate, chunk_size, max_out, "resampling enabled");

        Ok(Self {
            resampler: Some(resampler),
            input_buf: Vec::new(),
            chunk_size,
            output_buf: vec![vec![0f32; max_out]; 1],
        })
    }

    /// Feed samples, returning whatever output full input blocks produced.
    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        if self.resampler.is_none() {
            return samples.to_vec();
        }
        self.input_buf.extend_from_slice(samples);
        self.drain_blocks()
    }

    /// Flush the pending partial block, zero-padded to a full block.
    pub fn finish(&mut self) -> Vec<f32> {
        if self.resampler.is_none() || self.input_buf.is_empty() {
            return Vec::new();
        }
        let padded = self.input_buf.len().div_ceil(self.chunk_size) * self.chunk_size;
        self.input_buf.resize(padded, 0.0);
        self.drain_blocks()
    }

    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }

    fn drain_blocks(&mut self) -> Vec<f32> {
        let Some(resampler) = self.resampler.as_mut() else {
            return Vec::new();
        };

        let mut result = Vec::new();
        while self.input_buf.len() >= self.chunk_size {
            let block = &self.input_buf[..self.chunk_size];
            match resampler.process_into_buffer(&[block], &mut self.output_buf, None) {
                Ok((_consumed, produced)) => {
                    result.extend_from_slice(&self.output_buf[0][..produced]);
                }
                Err(e) => {
                    error!("resampler process error: {e}");
                }
            }
            self.input_buf.drain(..self.chunk_size);
        }
        result
    }
}
