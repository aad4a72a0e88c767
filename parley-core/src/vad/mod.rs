//! Voice activity detection and endpointing.
//!
//! `VoiceActivityDetector` classifies single frames; [`Endpointer`] turns the
//! per-frame decisions into utterance boundaries (end of speech, or a
//! listening timeout when nothing usable was heard).

pub mod endpoint;
pub mod energy;

pub use endpoint::{EndpointConfig, EndpointSignal, Endpointer};
pub use energy::EnergyVad;

/// Whether a given audio frame contains speech or silence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadDecision {
    Speech,
    /// Below threshold, with any hangover exhausted.
    Silence,
}

impl VadDecision {
    pub fn is_speech(self) -> bool {
        self == VadDecision::Speech
    }
}

/// Frame-level speech/silence classifier.
///
/// Implementors may be stateful (hangover counters and the like).
pub trait VoiceActivityDetector: Send {
    /// Classify one frame of 16 kHz 16-bit PCM.
    fn classify(&mut self, frame: &[i16]) -> VadDecision;

    /// Drop any internal state.
    fn reset(&mut self);
}
