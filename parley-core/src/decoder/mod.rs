//! Streaming decoder: Viterbi token passing over compiled expression graphs.
//!
//! ## Frame clock
//!
//! Blank-dominant frames are skipped entirely: no transitions, no score
//! change, no clock tick. Every other frame advances the speech clock, and an
//! expression may be entered on any of them, so a breath or a misheard frame
//! before the command does not lock the utterance out. Each hypothesis
//! remembers the speech frame it entered on; its span is the number of speech
//! frames since then and its confidence is `exp(score / span)`.
//!
//! ## Transitions
//!
//! For a node whose word is `w`:
//!
//! - staying scores `ln max(p[w], p[blank])`, so short pauses inside a word
//!   cost nothing;
//! - entering from a predecessor, or as an entry node, scores `ln p[w]`.
//!
//! ## Pruning and acceptance
//!
//! Hypotheses are ranked by their margin over the acceptance floor,
//! `score - span * ln(floor)`, and one survives a frame only while that
//! margin is non-negative. Candidates for a node are considered stay first,
//! then predecessors in ascending order, then a fresh entry; a later
//! candidate only wins with a strictly larger margin.
//!
//! Lowering the floor raises every margin and raises the margin of a longer
//! span more, so the best margin on each node never drops as sensitivity
//! rises. A node that is occupied at one sensitivity is occupied at every
//! higher one.
//!
//! ## Early finalization
//!
//! On a pause, the search reports `early_final` when its best completed path
//! is confident enough and no live, equally confident hypothesis that
//! started no later is still inside a longer expression. A pause between
//! "turn lights on" and "in the kitchen" therefore waits for the endpointer.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::acoustic::FrameEvidence;
use crate::error::{ParleyError, Result};
use crate::grammar::{Binding, Grammar};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct DecoderConfig {
    /// Floor used at sensitivity 0 (strictest).
    pub floor_at_min_sensitivity: f32,
    /// Floor used at sensitivity 1 (most permissive).
    pub floor_at_max_sensitivity: f32,
    /// Confidence at which a completed path finalizes on the next pause
    /// without waiting for the endpointer.
    pub early_finalize_confidence: f32,
    /// Lower clamp applied to posteriors before taking logarithms.
    pub min_probability: f32,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            floor_at_min_sensitivity: 0.8,
            floor_at_max_sensitivity: 0.2,
            early_finalize_confidence: 0.9,
            min_probability: 1e-4,
        }
    }
}

impl DecoderConfig {
    /// # Errors
    /// `InvalidArgument` when a floor is outside (0, 1), the floors are
    /// inverted, early finalization sits below the strictest floor, or the
    /// probability clamp is outside (0, 1).
    pub fn validate(&self) -> Result<()> {
        let unit = |v: f32| v > 0.0 && v < 1.0;
        if !unit(self.floor_at_min_sensitivity) || !unit(self.floor_at_max_sensitivity) {
            return Err(ParleyError::InvalidArgument(format!(
                "acceptance floors must be in (0, 1), got {} and {}",
                self.floor_at_min_sensitivity, self.floor_at_max_sensitivity
            )));
        }
        if self.floor_at_max_sensitivity > self.floor_at_min_sensitivity {
            return Err(ParleyError::InvalidArgument(
                "floorAtMaxSensitivity must not exceed floorAtMinSensitivity".into(),
            ));
        }
        if !(self.early_finalize_confidence >= self.floor_at_min_sensitivity
            && self.early_finalize_confidence <= 1.0)
        {
            return Err(ParleyError::InvalidArgument(format!(
                "earlyFinalizeConfidence must be in [{}, 1], got {}",
                self.floor_at_min_sensitivity, self.early_finalize_confidence
            )));
        }
        if !unit(self.min_probability) {
            return Err(ParleyError::InvalidArgument(format!(
                "minProbability must be in (0, 1), got {}",
                self.min_probability
            )));
        }
        Ok(())
    }

    /// Confidence a hypothesis needs to stay alive at `sensitivity`.
    pub fn acceptance_floor(&self, sensitivity: f32) -> f32 {
        let s = sensitivity.clamp(0.0, 1.0);
        self.floor_at_min_sensitivity
            + (self.floor_at_max_sensitivity - self.floor_at_min_sensitivity) * s
    }
}

/// `InvalidArgument` unless `sensitivity` is a number in [0, 1].
pub fn check_sensitivity(sensitivity: f32) -> Result<()> {
    if (0.0..=1.0).contains(&sensitivity) {
        Ok(())
    } else {
        Err(ParleyError::InvalidArgument(format!(
            "sensitivity must be in [0, 1], got {sensitivity}"
        )))
    }
}

/// Result of feeding one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StepOutcome {
    /// The frame counted as speech and advanced the search.
    pub speech: bool,
    /// A completed path is confident enough to finalize now.
    pub early_final: bool,
}

/// Best hypothesis that has reached the end of an expression.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedPath {
    pub expression: usize,
    pub confidence: f32,
    /// Slot fills in the order they were spoken.
    pub bindings: Vec<Binding>,
}

/// Diagnostic view of the search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecoderSnapshot {
    /// Live hypotheses across all expressions.
    pub active: usize,
    pub speech_frames: u32,
    /// Best confidence among live hypotheses, complete or not.
    pub best_confidence: Option<f32>,
}

#[derive(Debug, Clone)]
struct Hypothesis {
    score: f64,
    /// Speech frame (1-based) on which the path entered its expression.
    start: u32,
    bindings: Vec<Binding>,
}

#[derive(Clone, Copy)]
enum Origin {
    Stay,
    From(usize),
    Entry,
}

/// Per expression, per node: the surviving hypothesis, if any.
type Lattice = Vec<Vec<Option<Hypothesis>>>;

pub struct Decoder {
    grammar: Arc<Grammar>,
    floor: f32,
    ln_floor: f64,
    early_finalize_confidence: f32,
    min_probability: f32,
    tokens: Lattice,
    scratch: Lattice,
    speech_frames: u32,
}

impl Decoder {
    /// # Errors
    /// `InvalidArgument` for a bad config or sensitivity, `OutOfMemory` when
    /// the lattice cannot be allocated.
    pub fn new(grammar: Arc<Grammar>, config: &DecoderConfig, sensitivity: f32) -> Result<Self> {
        config.validate()?;
        check_sensitivity(sensitivity)?;

        let floor = config.acceptance_floor(sensitivity);
        let tokens = empty_lattice(&grammar)?;
        let scratch = empty_lattice(&grammar)?;
        debug!(sensitivity, floor, "decoder ready");

        Ok(Self {
            grammar,
            floor,
            ln_floor: f64::from(floor).ln(),
            early_finalize_confidence: config.early_finalize_confidence,
            min_probability: config.min_probability,
            tokens,
            scratch,
            speech_frames: 0,
        })
    }

    /// Acceptance floor derived from the session's sensitivity.
    pub fn floor(&self) -> f32 {
        self.floor
    }

    pub fn grammar(&self) -> &Arc<Grammar> {
        &self.grammar
    }

    /// Frames since onset that counted as speech.
    pub fn speech_frames(&self) -> u32 {
        self.speech_frames
    }

    /// Advance the search by one frame of evidence.
    ///
    /// On error the search state is exactly as it was before the call.
    ///
    /// # Errors
    /// `OutOfMemory` when hypothesis storage cannot grow.
    pub fn advance(&mut self, evidence: &FrameEvidence) -> Result<StepOutcome> {
        if evidence.is_blank_dominant() {
            return Ok(StepOutcome {
                speech: false,
                early_final: self.ready_to_finalize(),
            });
        }

        let onset = self.speech_frames == 0;
        let frames = self.speech_frames + 1;
        let mut next = std::mem::take(&mut self.scratch);
        if let Err(e) = self.step_into(evidence, frames, &mut next) {
            self.scratch = next;
            return Err(e);
        }
        std::mem::swap(&mut self.tokens, &mut next);
        self.scratch = next;
        self.speech_frames = frames;

        if onset {
            debug!(active = self.active(), "utterance onset");
        }
        trace!(frames, active = self.active(), "decoder step");
        Ok(StepOutcome {
            speech: true,
            early_final: false,
        })
    }

    fn step_into(&self, evidence: &FrameEvidence, frames: u32, next: &mut Lattice) -> Result<()> {
        let blank = evidence.blank();
        let ln = |p: f32| f64::from(p.max(self.min_probability)).ln();
        let margin = |score: f64, start: u32| score - span(frames, start) * self.ln_floor;

        let exprs = self.grammar.compiled_expressions();
        for ((expr, cur), out) in exprs.iter().zip(&self.tokens).zip(next.iter_mut()) {
            out.clear();
            out.try_reserve_exact(expr.graph.nodes.len())?;

            for (i, node) in expr.graph.nodes.iter().enumerate() {
                let p = evidence.probability(node.word);
                let enter = ln(p);
                let mut best: Option<Candidate> = None;
                let mut offer = |score: f64, start: u32, origin: Origin| {
                    let m = margin(score, start);
                    if best.as_ref().map_or(true, |b| m > b.margin) {
                        best = Some(Candidate {
                            score,
                            start,
                            margin: m,
                            origin,
                        });
                    }
                };

                if let Some(h) = &cur[i] {
                    offer(h.score + ln(p.max(blank)), h.start, Origin::Stay);
                }
                for &j in &node.prev {
                    if let Some(h) = &cur[j] {
                        offer(h.score + enter, h.start, Origin::From(j));
                    }
                }
                if node.is_entry {
                    offer(enter, frames, Origin::Entry);
                }

                let hypothesis = match best {
                    Some(c) if c.margin >= 0.0 => {
                        let bindings = match c.origin {
                            Origin::Stay => cur[i]
                                .as_ref()
                                .map(|h| copy_bindings(&h.bindings, None))
                                .transpose()?
                                .unwrap_or_default(),
                            Origin::From(j) => cur[j]
                                .as_ref()
                                .map(|h| copy_bindings(&h.bindings, node.binding))
                                .transpose()?
                                .unwrap_or_default(),
                            Origin::Entry => copy_bindings(&[], node.binding)?,
                        };
                        Some(Hypothesis {
                            score: c.score,
                            start: c.start,
                            bindings,
                        })
                    }
                    _ => None,
                };
                out.push(hypothesis);
            }
        }
        Ok(())
    }

    /// Completed hypothesis with the largest margin. Ties go to the earliest
    /// declared expression, then the lowest node.
    fn best_final(&self) -> Option<(usize, &Hypothesis)> {
        let mut best: Option<(usize, &Hypothesis)> = None;
        for (e, (expr, row)) in self
            .grammar
            .compiled_expressions()
            .iter()
            .zip(&self.tokens)
            .enumerate()
        {
            for (node, h) in expr.graph.nodes.iter().zip(row) {
                let Some(h) = h.as_ref().filter(|_| node.is_final) else {
                    continue;
                };
                if best.map_or(true, |(_, b)| self.margin(h) > self.margin(b)) {
                    best = Some((e, h));
                }
            }
        }
        best
    }

    /// Best path that has reached the end of an expression, if any.
    pub fn best_completed(&self) -> Option<CompletedPath> {
        if self.speech_frames == 0 {
            return None;
        }
        self.best_final().map(|(expression, h)| CompletedPath {
            expression,
            confidence: self.confidence(h),
            bindings: h.bindings.clone(),
        })
    }

    fn ready_to_finalize(&self) -> bool {
        let Some((_, done)) = self.best_final() else {
            return false;
        };
        let threshold = self.early_finalize_confidence;
        if self.confidence(done) < threshold {
            return false;
        }

        let exprs = self.grammar.compiled_expressions();
        let pending = exprs.iter().zip(&self.tokens).any(|(expr, row)| {
            expr.graph.nodes.iter().zip(row).any(|(node, h)| {
                h.as_ref().is_some_and(|h| {
                    !node.is_final && h.start <= done.start && self.confidence(h) >= threshold
                })
            })
        });
        if pending {
            trace!(frames = self.speech_frames, "early finalization held by a longer expression");
        }
        !pending
    }

    pub fn snapshot(&self) -> DecoderSnapshot {
        let best = self
            .tokens
            .iter()
            .flatten()
            .flatten()
            .map(|h| self.confidence(h))
            .fold(None, |acc: Option<f32>, c| Some(acc.map_or(c, |a| a.max(c))));
        DecoderSnapshot {
            active: self.active(),
            speech_frames: self.speech_frames,
            best_confidence: best,
        }
    }

    /// Drop every hypothesis and rewind the frame clock.
    pub fn reset(&mut self) {
        for row in &mut self.tokens {
            row.iter_mut().for_each(|h| *h = None);
        }
        self.speech_frames = 0;
    }

    fn active(&self) -> usize {
        self.tokens.iter().flatten().filter(|h| h.is_some()).count()
    }

    fn margin(&self, h: &Hypothesis) -> f64 {
        h.score - span(self.speech_frames, h.start) * self.ln_floor
    }

    fn confidence(&self, h: &Hypothesis) -> f32 {
        (h.score / span(self.speech_frames, h.start)).exp() as f32
    }
}

struct Candidate {
    score: f64,
    start: u32,
    margin: f64,
    origin: Origin,
}

/// Speech frames covered by a path that entered on `start`, as of `frames`.
fn span(frames: u32, start: u32) -> f64 {
    f64::from(frames.saturating_sub(start) + 1)
}

fn empty_lattice(grammar: &Grammar) -> Result<Lattice> {
    let exprs = grammar.compiled_expressions();
    let mut lattice = Vec::new();
    lattice.try_reserve_exact(exprs.len())?;
    for expr in exprs {
        let mut row = Vec::new();
        row.try_reserve_exact(expr.graph.nodes.len())?;
        row.resize(expr.graph.nodes.len(), None);
        lattice.push(row);
    }
    Ok(lattice)
}

fn copy_bindings(base: &[Binding], extra: Option<Binding>) -> Result<Vec<Binding>> {
    let mut out = Vec::new();
    out.try_reserve_exact(base.len() + usize::from(extra.is_some()))?;
    out.extend_from_slice(base);
    out.extend(extra);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::fixtures::LIGHTS;
    use approx::assert_relative_eq;

    fn lights() -> Arc<Grammar> {
        Arc::new(Grammar::load(LIGHTS.as_bytes()).expect("load"))
    }

    fn word(g: &Grammar, w: &str, p: f32) -> FrameEvidence {
        let mut post = vec![0.0; g.vocabulary().len()];
        post[g.vocabulary().get(w).expect("in vocabulary")] = p;
        FrameEvidence::new(post)
    }

    fn silence(g: &Grammar) -> FrameEvidence {
        FrameEvidence::silence(g.vocabulary().len())
    }

    fn say(dec: &mut Decoder, phrase: &str, frames: usize, p: f32) {
        let g = Arc::clone(dec.grammar());
        for w in phrase.split_whitespace() {
            for _ in 0..frames {
                dec.advance(&word(&g, w, p)).expect("advance");
            }
        }
    }

    #[test]
    fn exact_phrase_completes_with_bindings() {
        let g = lights();
        let mut dec = Decoder::new(Arc::clone(&g), &DecoderConfig::default(), 0.5).expect("decoder");
        say(&mut dec, "turn the lights on", 3, 1.0);

        let done = dec.best_completed().expect("completed");
        assert_eq!(done.expression, 3);
        assert_relative_eq!(done.confidence, 1.0);
        assert_eq!(done.bindings.len(), 1);
        let state = &g.slot_types()[done.bindings[0].slot_type];
        assert_eq!(state.values[done.bindings[0].value].canonical, "on");

        let step = dec.advance(&silence(&g)).expect("advance");
        assert!(!step.speech);
        assert!(step.early_final);
    }

    #[test]
    fn incomplete_phrase_has_no_completed_path() {
        let g = lights();
        let mut dec = Decoder::new(Arc::clone(&g), &DecoderConfig::default(), 0.5).expect("decoder");
        say(&mut dec, "turn the lights", 3, 1.0);
        assert!(dec.best_completed().is_none());
        assert!(dec.snapshot().active > 0);
        assert!(!dec.advance(&silence(&g)).expect("advance").early_final);
    }

    #[test]
    fn blank_frames_do_not_advance_the_clock() {
        let g = lights();
        let mut dec = Decoder::new(Arc::clone(&g), &DecoderConfig::default(), 0.5).expect("decoder");
        for _ in 0..5 {
            assert!(!dec.advance(&silence(&g)).expect("advance").speech);
        }
        assert_eq!(dec.speech_frames(), 0);
        say(&mut dec, "turn", 2, 1.0);
        assert_eq!(dec.speech_frames(), 2);
        dec.advance(&silence(&g)).expect("advance");
        assert_eq!(dec.speech_frames(), 2);
    }

    fn mumble(g: &Grammar) -> FrameEvidence {
        let mut noise = vec![0.001; g.vocabulary().len()];
        noise[0] = 0.0;
        FrameEvidence::new(noise)
    }

    #[test]
    fn command_after_stray_speech_still_matches() {
        let g = lights();
        for sensitivity in [0.0, 0.5, 1.0] {
            let mut dec = Decoder::new(Arc::clone(&g), &DecoderConfig::default(), sensitivity)
                .expect("decoder");
            dec.advance(&silence(&g)).expect("advance");
            assert!(dec.advance(&mumble(&g)).expect("advance").speech);
            dec.advance(&silence(&g)).expect("advance");
            say(&mut dec, "turn the lights on", 4, 1.0);

            let done = dec.best_completed().expect("completed after a stray frame");
            assert_eq!(done.expression, 3);
            assert_relative_eq!(done.confidence, 1.0);
            assert_eq!(dec.speech_frames(), 17);
            assert!(dec.advance(&silence(&g)).expect("advance").early_final);
        }
    }

    #[test]
    fn soft_first_frame_does_not_sink_the_command() {
        let g = lights();
        let mut dec = Decoder::new(Arc::clone(&g), &DecoderConfig::default(), 0.5).expect("decoder");
        dec.advance(&word(&g, "turn", 0.3)).expect("advance");
        assert_eq!(dec.snapshot().active, 0);
        say(&mut dec, "turn lights off", 3, 1.0);

        let done = dec.best_completed().expect("completed");
        assert_eq!(done.expression, 3);
        assert_relative_eq!(done.confidence, 1.0);
    }

    #[test]
    fn pause_inside_a_longer_expression_defers_early_finalization() {
        let ctx = r#"{ "context": {
            "expressions": {
                "on": ["turn lights on"],
                "onIn": ["turn lights on in $room:room"]
            },
            "slots": { "room": ["kitchen", "hall"] } } }"#;
        let g = Arc::new(Grammar::load(ctx.as_bytes()).expect("load"));
        let mut dec = Decoder::new(Arc::clone(&g), &DecoderConfig::default(), 0.5).expect("decoder");

        say(&mut dec, "turn lights on", 2, 1.0);
        assert_eq!(dec.best_completed().expect("short form completed").expression, 0);
        for _ in 0..2 {
            assert!(!dec.advance(&silence(&g)).expect("advance").early_final);
        }

        say(&mut dec, "in kitchen", 2, 1.0);
        let done = dec.best_completed().expect("long form completed");
        assert_eq!(done.expression, 1);
        assert_eq!(done.bindings.len(), 1);
        let room = &g.slot_types()[done.bindings[0].slot_type];
        assert_eq!(room.values[done.bindings[0].value].canonical, "kitchen");
        assert!(dec.advance(&silence(&g)).expect("advance").early_final);
    }

    #[test]
    fn weak_evidence_is_accepted_only_at_high_sensitivity() {
        let g = lights();
        let phrase = "make the lights crimson";
        let accepted = |sensitivity: f32| {
            let mut dec = Decoder::new(Arc::clone(&g), &DecoderConfig::default(), sensitivity)
                .expect("decoder");
            say(&mut dec, phrase, 3, 0.7);
            dec.best_completed()
        };

        assert!(accepted(0.0).is_none());
        let done = accepted(1.0).expect("accepted at max sensitivity");
        assert_eq!(done.expression, 0);
        assert_relative_eq!(done.confidence, 0.7, epsilon = 1e-4);

        let mut previous = false;
        for step in 0..=10 {
            let now = accepted(step as f32 / 10.0).is_some();
            assert!(now || !previous, "acceptance must not drop as sensitivity rises");
            previous = now;
        }
    }

    #[test]
    fn moderate_confidence_does_not_finalize_early() {
        let g = lights();
        let mut dec = Decoder::new(Arc::clone(&g), &DecoderConfig::default(), 1.0).expect("decoder");
        say(&mut dec, "turn lights off", 3, 0.7);
        assert!(dec.best_completed().is_some());
        assert!(!dec.advance(&silence(&g)).expect("advance").early_final);
    }

    #[test]
    fn mumbling_prunes_everything() {
        let g = lights();
        let mut dec = Decoder::new(Arc::clone(&g), &DecoderConfig::default(), 0.5).expect("decoder");
        for _ in 0..5 {
            assert!(dec.advance(&mumble(&g)).expect("advance").speech);
        }
        let snap = dec.snapshot();
        assert_eq!(snap.active, 0);
        assert_eq!(snap.best_confidence, None);
        assert_eq!(snap.speech_frames, 5);
    }

    #[test]
    fn identical_expressions_resolve_to_the_first_declared() {
        let ctx = r#"{ "context": { "expressions": {
            "greet": ["hello world"],
            "salute": ["hello world"] } } }"#;
        let g = Arc::new(Grammar::load(ctx.as_bytes()).expect("load"));
        let mut dec = Decoder::new(Arc::clone(&g), &DecoderConfig::default(), 0.5).expect("decoder");
        say(&mut dec, "hello world", 2, 1.0);
        assert_eq!(dec.best_completed().expect("completed").expression, 0);
    }

    #[test]
    fn reset_forgets_hypotheses() {
        let g = lights();
        let mut dec = Decoder::new(Arc::clone(&g), &DecoderConfig::default(), 0.5).expect("decoder");
        say(&mut dec, "turn lights on", 2, 1.0);
        dec.reset();
        assert_eq!(dec.snapshot().active, 0);
        assert_eq!(dec.speech_frames(), 0);
        assert!(dec.best_completed().is_none());
        say(&mut dec, "turn lights off", 2, 1.0);
        assert_eq!(dec.best_completed().expect("completed").expression, 3);
    }

    #[test]
    fn floor_is_linear_in_sensitivity() {
        let cfg = DecoderConfig::default();
        assert_relative_eq!(cfg.acceptance_floor(0.0), 0.8);
        assert_relative_eq!(cfg.acceptance_floor(1.0), 0.2);
        assert_relative_eq!(cfg.acceptance_floor(0.5), 0.5);
    }

    #[test]
    fn rejects_bad_sensitivity_and_config() {
        let g = lights();
        for s in [-0.1, 1.5, f32::NAN] {
            let err = Decoder::new(Arc::clone(&g), &DecoderConfig::default(), s)
                .err()
                .expect("must fail");
            assert!(matches!(err, ParleyError::InvalidArgument(_)));
        }
        let inverted = DecoderConfig {
            floor_at_min_sensitivity: 0.3,
            floor_at_max_sensitivity: 0.6,
            ..DecoderConfig::default()
        };
        assert!(inverted.validate().is_err());
        let lax_early = DecoderConfig {
            early_finalize_confidence: 0.5,
            ..DecoderConfig::default()
        };
        assert!(lax_early.validate().is_err());
    }
}
