//! Energy-based VAD using an RMS threshold plus a hangover counter.
//!
//! 1. Compute the normalized RMS of the frame.
//! 2. At or above `threshold`: `Speech`, and the hangover is re-armed.
//! 3. Below it while hangover remains: `Speech`, hangover decremented.
//! 4. Otherwise `Silence`.

use super::{VadDecision, VoiceActivityDetector};
use crate::audio::rms_i16;

#[derive(Debug, Clone)]
pub struct EnergyVad {
    /// Normalized RMS level in [0, 1].
    threshold: f32,
    hangover_frames: u32,
    hangover_counter: u32,
}

impl EnergyVad {
    /// `threshold` is a normalized RMS level; `hangover_frames` keeps
    /// reporting speech for that many quiet frames after the last loud one.
    pub fn new(threshold: f32, hangover_frames: u32) -> Self {
        Self {
            threshold,
            hangover_frames,
            hangover_counter: 0,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }
}

impl Default for EnergyVad {
    fn default() -> Self {
        Self::new(0.02, 4)
    }
}

impl VoiceActivityDetector for EnergyVad {
    fn classify(&mut self, frame: &[i16]) -> VadDecision {
        if rms_i16(frame) >= self.threshold {
            self.hangover_counter = self.hangover_frames;
            VadDecision::Speech
        } else if self.hangover_counter > 0 {
            self.hangover_counter -= 1;
            VadDecision::Speech
        } else {
            VadDecision::Silence
        }
    }

    fn reset(&mut self) {
        self.hangover_counter = 0;
    }
}
