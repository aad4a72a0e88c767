//! Utterance endpointing on top of a frame-level VAD.
//!
//! The endpointer waits for `min_speech_frames` consecutive voiced frames
//! before it considers an utterance started. From then on a run of
//! `min_silence_frames` unvoiced frames ends it. Independently, once
//! `max_listening_frames` frames have been seen the session times out.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{EnergyVad, VoiceActivityDetector};
use crate::error::{ParleyError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct EndpointConfig {
    pub vad_threshold: f32,
    pub vad_hangover_frames: u32,
    /// Consecutive voiced frames that count as the start of speech.
    pub min_speech_frames: u32,
    /// Trailing unvoiced frames that end an utterance (25 ≈ 0.8 s).
    pub min_silence_frames: u32,
    /// Hard cap on frames per session (313 ≈ 10 s).
    pub max_listening_frames: u32,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            vad_threshold: 0.02,
            vad_hangover_frames: 4,
            min_speech_frames: 3,
            min_silence_frames: 25,
            max_listening_frames: 313,
        }
    }
}

impl EndpointConfig {
    /// # Errors
    /// `InvalidArgument` for a threshold outside (0, 1] or zero frame counts.
    pub fn validate(&self) -> Result<()> {
        if !(self.vad_threshold > 0.0 && self.vad_threshold <= 1.0) {
            return Err(ParleyError::InvalidArgument(format!(
                "vadThreshold must be in (0, 1], got {}",
                self.vad_threshold
            )));
        }
        if self.min_speech_frames == 0 || self.min_silence_frames == 0 {
            return Err(ParleyError::InvalidArgument(
                "minSpeechFrames and minSilenceFrames must be positive".into(),
            ));
        }
        if self.max_listening_frames == 0 {
            return Err(ParleyError::InvalidArgument(
                "maxListeningFrames must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// What the endpointer concluded after a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointSignal {
    Continue,
    /// Speech was heard and has been followed by enough silence.
    EndOfSpeech,
    /// The listening budget is spent.
    Timeout,
}

pub struct Endpointer {
    vad: Box<dyn VoiceActivityDetector>,
    config: EndpointConfig,
    elapsed: u32,
    voiced_run: u32,
    silent_run: u32,
    heard_speech: bool,
}

impl Endpointer {
    pub fn new(config: EndpointConfig) -> Self {
        let vad = EnergyVad::new(config.vad_threshold, config.vad_hangover_frames);
        Self::with_vad(config, Box::new(vad))
    }

    pub fn with_vad(config: EndpointConfig, vad: Box<dyn VoiceActivityDetector>) -> Self {
        Self {
            vad,
            config,
            elapsed: 0,
            voiced_run: 0,
            silent_run: 0,
            heard_speech: false,
        }
    }

    /// Feed one frame.
    pub fn update(&mut self, frame: &[i16]) -> EndpointSignal {
        self.elapsed += 1;

        if self.vad.classify(frame).is_speech() {
            self.voiced_run += 1;
            self.silent_run = 0;
            if !self.heard_speech && self.voiced_run >= self.config.min_speech_frames {
                debug!(frame = self.elapsed, "speech onset");
                self.heard_speech = true;
            }
        } else {
            self.voiced_run = 0;
            self.silent_run += 1;
        }

        if self.heard_speech && self.silent_run >= self.config.min_silence_frames {
            debug!(frame = self.elapsed, "end of speech");
            return EndpointSignal::EndOfSpeech;
        }
        if self.elapsed >= self.config.max_listening_frames {
            debug!(frame = self.elapsed, heard = self.heard_speech, "listening timeout");
            return EndpointSignal::Timeout;
        }
        EndpointSignal::Continue
    }

    pub fn heard_speech(&self) -> bool {
        self.heard_speech
    }

    pub fn elapsed(&self) -> u32 {
        self.elapsed
    }

    pub fn reset(&mut self) {
        self.vad.reset();
        self.elapsed = 0;
        self.voiced_run = 0;
        self.silent_run = 0;
        self.heard_speech = false;
    }
}
