//! Acoustic scoring abstraction.
//!
//! The `AcousticModel` trait decouples the decoder from any specific acoustic
//! front end. A model is immutable and shareable; each session asks it for a
//! fresh [`AcousticScorer`] bound to the grammar's [`Vocabulary`].
//!
//! `&mut self` on `score` expresses that scorers are stateful (rolling
//! feature windows, recurrent state). That state belongs to the owning
//! session and is only cleared through `reset`.

pub mod scripted;
pub mod stub;

pub use scripted::{ScriptedModel, ScriptedScorer};
pub use stub::{StubModel, StubModelConfig, StubModelLoader};

use std::sync::Arc;

use crate::error::Result;
use crate::grammar::{Vocabulary, WordId, BLANK};

/// Per-frame evidence: one posterior per vocabulary class.
///
/// Index [`BLANK`] is the silence/non-speech class. Posteriors need not sum
/// to one; any remaining mass is out-of-vocabulary speech.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameEvidence {
    posteriors: Vec<f32>,
}

impl FrameEvidence {
    pub fn new(posteriors: Vec<f32>) -> Self {
        Self { posteriors }
    }

    /// Evidence of pure silence for a vocabulary of `classes` entries.
    pub fn silence(classes: usize) -> Self {
        let mut posteriors = vec![0.0; classes.max(1)];
        posteriors[BLANK] = 1.0;
        Self { posteriors }
    }

    /// Posterior for `word`; classes the scorer did not report count as zero.
    pub fn probability(&self, word: WordId) -> f32 {
        self.posteriors
            .get(word)
            .copied()
            .filter(|p| p.is_finite())
            .unwrap_or(0.0)
            .clamp(0.0, 1.0)
    }

    pub fn blank(&self) -> f32 {
        self.probability(BLANK)
    }

    /// `true` when silence is at least as likely as every word.
    pub fn is_blank_dominant(&self) -> bool {
        let blank = self.blank();
        (1..self.posteriors.len()).all(|w| self.probability(w) <= blank)
    }

    pub fn posteriors(&self) -> &[f32] {
        &self.posteriors
    }
}

/// Stateful per-session scorer.
pub trait AcousticScorer: Send {
    /// Score one frame of 16-bit PCM. The engine guarantees the frame length.
    ///
    /// # Errors
    /// `ParleyError::OutOfMemory` when internal buffers cannot grow.
    fn score(&mut self, pcm: &[i16]) -> Result<FrameEvidence>;

    /// Drop all rolling acoustic context.
    fn reset(&mut self);
}

/// Contract for acoustic model backends.
pub trait AcousticModel: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Create a scorer whose posteriors are indexed by `vocabulary`.
    ///
    /// # Errors
    /// `InvalidArgument` if the model cannot cover the vocabulary,
    /// `OutOfMemory` if scorer state cannot be allocated.
    fn scorer(&self, vocabulary: &Vocabulary) -> Result<Box<dyn AcousticScorer>>;
}

/// Turns an opaque model blob into an [`AcousticModel`].
pub trait ModelLoader {
    /// # Errors
    /// `ModelLoad` if the blob is not a model this loader understands.
    fn load(&self, blob: &[u8]) -> Result<Arc<dyn AcousticModel>>;
}
