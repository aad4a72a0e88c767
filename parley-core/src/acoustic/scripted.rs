//! `ScriptedModel`: replays a fixed word timeline as acoustic evidence.
//!
//! Each segment is either silence, a vocabulary word held for some frames, or
//! speech outside the vocabulary. The scorer ignores the PCM it is given and
//! emits the next frame of the script; once the script is exhausted it emits
//! silence. Useful for simulating a speaker who says an exact expression.

use tracing::debug;

use super::{AcousticModel, AcousticScorer, FrameEvidence};
use crate::error::Result;
use crate::grammar::{Vocabulary, BLANK};

/// Posterior given to every word during out-of-vocabulary speech.
const OOV_WORD_PROBABILITY: f32 = 0.001;

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Silence { frames: usize },
    Word { word: String, frames: usize, confidence: f32 },
    Unknown { frames: usize },
}

impl Segment {
    fn frames(&self) -> usize {
        match self {
            Segment::Silence { frames }
            | Segment::Word { frames, .. }
            | Segment::Unknown { frames } => *frames,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedModel {
    segments: Vec<Segment>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn silence(mut self, frames: usize) -> Self {
        self.segments.push(Segment::Silence { frames });
        self
    }

    /// Hold `word` with full confidence for `frames` frames.
    pub fn say(self, word: &str, frames: usize) -> Self {
        self.say_with_confidence(word, frames, 1.0)
    }

    pub fn say_with_confidence(mut self, word: &str, frames: usize, confidence: f32) -> Self {
        self.segments.push(Segment::Word {
            word: word.to_lowercase(),
            frames,
            confidence: confidence.clamp(0.0, 1.0),
        });
        self
    }

    /// Say each whitespace-separated word of `phrase` for `frames_per_word`.
    pub fn say_phrase(self, phrase: &str, frames_per_word: usize) -> Self {
        self.say_phrase_with_confidence(phrase, frames_per_word, 1.0)
    }

    pub fn say_phrase_with_confidence(
        self,
        phrase: &str,
        frames_per_word: usize,
        confidence: f32,
    ) -> Self {
        phrase.split_whitespace().fold(self, |model, w| {
            model.say_with_confidence(w, frames_per_word, confidence)
        })
    }

    /// Speech that matches no vocabulary word.
    pub fn mumble(mut self, frames: usize) -> Self {
        self.segments.push(Segment::Unknown { frames });
        self
    }

    /// Total scripted frames.
    pub fn len(&self) -> usize {
        self.segments.iter().map(Segment::frames).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether frame `index` of the script is voiced (word or unknown speech).
    pub fn is_voiced(&self, index: usize) -> bool {
        let mut offset = 0;
        for seg in &self.segments {
            let end = offset + seg.frames();
            if index < end {
                return !matches!(seg, Segment::Silence { .. });
            }
            offset = end;
        }
        false
    }
}

impl AcousticModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    fn scorer(&self, vocabulary: &Vocabulary) -> Result<Box<dyn AcousticScorer>> {
        let classes = vocabulary.len();
        let silence = FrameEvidence::silence(classes);

        let mut frames: Vec<FrameEvidence> = Vec::new();
        frames.try_reserve_exact(self.len())?;
        for seg in &self.segments {
            let evidence = match seg {
                Segment::Silence { .. } => silence.clone(),
                Segment::Unknown { .. } => {
                    let mut p = vec![OOV_WORD_PROBABILITY; classes];
                    p[BLANK] = 0.0;
                    FrameEvidence::new(p)
                }
                Segment::Word {
                    word, confidence, ..
                } => {
                    let mut p = vec![0.0; classes];
                    match vocabulary.get(word) {
                        Some(id) => p[id] = *confidence,
                        None => {
                            debug!(word = word.as_str(), "scripted word outside vocabulary");
                            p.iter_mut().skip(1).for_each(|x| *x = OOV_WORD_PROBABILITY);
                        }
                    }
                    FrameEvidence::new(p)
                }
            };
            frames.extend(std::iter::repeat(evidence).take(seg.frames()));
        }

        Ok(Box::new(ScriptedScorer {
            frames,
            silence,
            cursor: 0,
        }))
    }
}

/// Scorer produced by [`ScriptedModel`].
pub struct ScriptedScorer {
    frames: Vec<FrameEvidence>,
    silence: FrameEvidence,
    cursor: usize,
}

impl ScriptedScorer {
    /// Frames emitted since construction or the last reset.
    pub fn position(&self) -> usize {
        self.cursor
    }
}

impl AcousticScorer for ScriptedScorer {
    fn score(&mut self, _pcm: &[i16]) -> Result<FrameEvidence> {
        let ev = self
            .frames
            .get(self.cursor)
            .cloned()
            .unwrap_or_else(|| self.silence.clone());
        self.cursor += 1;
        Ok(ev)
    }

    fn reset(&mut self) {
        self.cursor = 0;
    }
}
