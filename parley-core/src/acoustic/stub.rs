//! `StubModel`: placeholder acoustic backend driven only by frame energy.
//!
//! Quiet frames are reported as silence. Loud frames are reported as speech
//! that no vocabulary word explains well, so the decoder can exercise onset,
//! pruning and endpointing on real audio without ever accepting a command.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{AcousticModel, AcousticScorer, FrameEvidence, ModelLoader};
use crate::audio::rms_i16;
use crate::error::{ParleyError, Result};
use crate::grammar::{Vocabulary, BLANK};

/// Tunables carried by a stub model blob (JSON).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct StubModelConfig {
    /// RMS level (normalized to [0, 1]) above which a frame counts as speech.
    pub energy_threshold: f32,
    /// Posterior assigned to every word on a speech frame.
    pub word_probability: f32,
}

impl Default for StubModelConfig {
    fn default() -> Self {
        Self {
            energy_threshold: 0.02,
            word_probability: 0.01,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StubModel {
    config: StubModelConfig,
}

impl StubModel {
    pub fn new(config: StubModelConfig) -> Self {
        Self { config }
    }
}

impl AcousticModel for StubModel {
    fn name(&self) -> &str {
        "stub"
    }

    fn scorer(&self, vocabulary: &Vocabulary) -> Result<Box<dyn AcousticScorer>> {
        let classes = vocabulary.len();
        let mut speech = Vec::new();
        speech.try_reserve_exact(classes)?;
        speech.resize(classes, self.config.word_probability.clamp(0.0, 1.0));
        speech[BLANK] = 0.0;

        Ok(Box::new(StubScorer {
            threshold: self.config.energy_threshold,
            speech: FrameEvidence::new(speech),
            silence: FrameEvidence::silence(classes),
            frames: 0,
        }))
    }
}

struct StubScorer {
    threshold: f32,
    speech: FrameEvidence,
    silence: FrameEvidence,
    frames: u64,
}

impl AcousticScorer for StubScorer {
    fn score(&mut self, pcm: &[i16]) -> Result<FrameEvidence> {
        self.frames += 1;
        if rms_i16(pcm) >= self.threshold {
            Ok(self.speech.clone())
        } else {
            Ok(self.silence.clone())
        }
    }

    fn reset(&mut self) {
        debug!(frames = self.frames, "StubScorer::reset");
        self.frames = 0;
    }
}

/// Loads a [`StubModel`] from a JSON blob. An empty blob yields defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct StubModelLoader;

impl ModelLoader for StubModelLoader {
    fn load(&self, blob: &[u8]) -> Result<Arc<dyn AcousticModel>> {
        let config = if blob.iter().all(u8::is_ascii_whitespace) {
            StubModelConfig::default()
        } else {
            serde_json::from_slice(blob)
                .map_err(|e| ParleyError::ModelLoad(format!("stub model blob: {e}")))?
        };
        debug!(?config, "loaded stub model");
        Ok(Arc::new(StubModel::new(config)))
    }
}
