//! `Engine`: one speech-to-intent session.
//!
//! ## Lifecycle
//!
//! ```text
//! Engine::new()                        phase = Listening
//!     └─► process(frame)* ──► true     phase = FinalizedUnderstood | FinalizedNotUnderstood
//!         └─► is_understood()
//!             └─► get_intent() ──► IntentView ──► release(ticket)
//!                 └─► reset()          phase = Listening
//! ```
//!
//! Out-of-order calls fail with `InvalidState` and leave the session as it
//! was. Each `process` call scores the frame, advances the decoder, then
//! feeds the endpointer; finalization happens on the first of early
//! confidence, end of speech, or the listening timeout.
//!
//! ## Threading
//!
//! A session is single-writer: every method takes `&mut self` or `&self` and
//! does a bounded amount of work. The compiled [`Grammar`] is immutable and
//! can be shared between sessions through `Arc` (see
//! [`Engine::with_grammar`]).

pub mod view;

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub use view::{IntentView, ReleaseTicket};

use crate::{
    acoustic::{AcousticModel, AcousticScorer, ModelLoader},
    decoder::{check_sensitivity, Decoder, DecoderConfig},
    error::{ParleyError, Result},
    extract::{extract, Extraction},
    grammar::Grammar,
    ipc::events::{EngineStatus, FinalizeReason, InferenceEvent, Phase, SlotValue},
    vad::{EndpointConfig, EndpointSignal, Endpointer},
    FRAME_LENGTH,
};

/// Configuration for an [`Engine`] session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct EngineConfig {
    /// Trade-off between missed commands (0) and false accepts (1).
    pub sensitivity: f32,
    pub decoder: DecoderConfig,
    pub endpoint: EndpointConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sensitivity: 0.5,
            decoder: DecoderConfig::default(),
            endpoint: EndpointConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn with_sensitivity(sensitivity: f32) -> Self {
        Self {
            sensitivity,
            ..Self::default()
        }
    }

    /// # Errors
    /// `InvalidArgument` describing the first out-of-range field.
    pub fn validate(&self) -> Result<()> {
        check_sensitivity(self.sensitivity)?;
        self.decoder.validate()?;
        self.endpoint.validate()?;
        if self.endpoint.max_listening_frames < self.endpoint.min_silence_frames {
            return Err(ParleyError::InvalidArgument(format!(
                "maxListeningFrames ({}) is shorter than minSilenceFrames ({})",
                self.endpoint.max_listening_frames, self.endpoint.min_silence_frames
            )));
        }
        Ok(())
    }
}

pub struct Engine {
    id: u64,
    config: EngineConfig,
    grammar: Arc<Grammar>,
    model_name: String,
    context_info: String,
    scorer: Box<dyn AcousticScorer>,
    decoder: Decoder,
    endpointer: Endpointer,
    phase: Phase,
    result: Option<Extraction>,
    reason: Option<FinalizeReason>,
    frames: u64,
    finalized_at: Option<u64>,
    utterances: u64,
    /// Serial of the intent view currently handed out.
    outstanding: Option<u64>,
    serial: u64,
}

impl Engine {
    /// Open a session from a model and a context blob.
    ///
    /// # Errors
    /// `InvalidArgument` for a sensitivity outside [0, 1],
    /// `MalformedContext` for a bad context, `OutOfMemory` when session state
    /// cannot be allocated.
    pub fn new(model: &dyn AcousticModel, context: &[u8], sensitivity: f32) -> Result<Self> {
        Self::with_config(model, context, EngineConfig::with_sensitivity(sensitivity))
    }

    pub fn with_config(
        model: &dyn AcousticModel,
        context: &[u8],
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate()?;
        let grammar = Arc::new(Grammar::load(context)?);
        Self::with_grammar(model, grammar, config)
    }

    /// Open a session on an already compiled grammar.
    pub fn with_grammar(
        model: &dyn AcousticModel,
        grammar: Arc<Grammar>,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate()?;
        let scorer = model.scorer(grammar.vocabulary())?;
        let decoder = Decoder::new(Arc::clone(&grammar), &config.decoder, config.sensitivity)?;
        let endpointer = Endpointer::new(config.endpoint.clone());
        let id = view::next_session_id();

        info!(
            session = id,
            model = model.name(),
            context = grammar.name(),
            sensitivity = config.sensitivity,
            floor = decoder.floor(),
            "session opened"
        );

        Ok(Self {
            id,
            context_info: grammar.describe(),
            model_name: model.name().to_string(),
            grammar,
            config,
            scorer,
            decoder,
            endpointer,
            phase: Phase::Listening,
            result: None,
            reason: None,
            frames: 0,
            finalized_at: None,
            utterances: 0,
            outstanding: None,
            serial: 0,
        })
    }

    /// Read a model blob and a context blob from disk and open a session.
    ///
    /// # Errors
    /// `Io` when either file is unreadable, `ModelLoad` when the loader
    /// rejects the model, plus everything [`Engine::new`] returns.
    pub fn from_files(
        loader: &dyn ModelLoader,
        model_path: &Path,
        context_path: &Path,
        sensitivity: f32,
    ) -> Result<Self> {
        check_sensitivity(sensitivity)?;
        let blob = std::fs::read(model_path)?;
        let context = std::fs::read(context_path)?;
        let model = loader.load(&blob)?;
        debug!(model = %model_path.display(), context = %context_path.display(), "blobs read");
        Self::new(model.as_ref(), &context, sensitivity)
    }

    /// Feed exactly [`FRAME_LENGTH`] samples of 16 kHz mono PCM.
    ///
    /// Returns `true` on the call that finalizes the utterance.
    ///
    /// # Errors
    /// - `InvalidState` once finalized, until [`reset`](Self::reset).
    /// - `InvalidArgument` for a frame of the wrong length.
    /// - `OutOfMemory` from the decoder or scorer; reset or drop the session.
    pub fn process(&mut self, pcm: &[i16]) -> Result<bool> {
        if self.phase.is_finalized() {
            warn!(session = self.id, "process called after finalization");
            return Err(ParleyError::InvalidState(
                "session is finalized; call reset before processing more audio".into(),
            ));
        }
        if pcm.len() != FRAME_LENGTH {
            return Err(ParleyError::InvalidArgument(format!(
                "frame must hold {FRAME_LENGTH} samples, got {}",
                pcm.len()
            )));
        }

        let evidence = self.scorer.score(pcm)?;
        let step = self.decoder.advance(&evidence)?;
        let signal = self.endpointer.update(pcm);
        self.frames += 1;

        let reason = if step.early_final {
            Some(FinalizeReason::EarlyConfidence)
        } else {
            match signal {
                EndpointSignal::Continue => None,
                EndpointSignal::EndOfSpeech => Some(FinalizeReason::EndOfSpeech),
                EndpointSignal::Timeout => Some(FinalizeReason::Timeout),
            }
        };

        match reason {
            Some(reason) => {
                self.finalize(reason);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn finalize(&mut self, reason: FinalizeReason) {
        self.result = self.decoder.best_completed().and_then(|path| {
            extract(&self.grammar, path.expression, &path.bindings, path.confidence)
        });
        self.phase = if self.result.is_some() {
            Phase::FinalizedUnderstood
        } else {
            Phase::FinalizedNotUnderstood
        };
        self.reason = Some(reason);
        self.finalized_at = Some(self.frames);
        self.utterances += 1;

        if reason == FinalizeReason::Timeout {
            warn!(
                session = self.id,
                frame = self.frames,
                heard_speech = self.endpointer.heard_speech(),
                "listening timed out"
            );
        }
        match &self.result {
            Some(r) => info!(
                session = self.id,
                frame = self.frames,
                ?reason,
                intent = r.intent.as_str(),
                confidence = r.confidence,
                "utterance understood"
            ),
            None => info!(session = self.id, frame = self.frames, ?reason, "utterance not understood"),
        }
    }

    /// # Errors
    /// `InvalidState` while still listening.
    pub fn is_understood(&self) -> Result<bool> {
        match self.phase {
            Phase::Listening => Err(ParleyError::InvalidState(
                "is_understood called before finalization".into(),
            )),
            phase => Ok(phase == Phase::FinalizedUnderstood),
        }
    }

    /// Borrow the understood intent and its slots.
    ///
    /// The view must be turned into its ticket and handed to
    /// [`release`](Self::release) before another view is requested.
    ///
    /// # Errors
    /// `InvalidState` unless the session finalized understood, or while a
    /// previous view is still unreleased.
    pub fn get_intent(&mut self) -> Result<IntentView<'_>> {
        if self.phase != Phase::FinalizedUnderstood || self.result.is_none() {
            return Err(ParleyError::InvalidState(
                "no understood intent to read".into(),
            ));
        }
        if self.outstanding.is_some() {
            return Err(ParleyError::InvalidState(
                "previous intent view has not been released".into(),
            ));
        }

        self.serial += 1;
        self.outstanding = Some(self.serial);
        let ticket = ReleaseTicket {
            session: self.id,
            serial: self.serial,
        };
        let Some(result) = self.result.as_ref() else {
            return Err(ParleyError::InvalidState("no understood intent to read".into()));
        };
        Ok(IntentView {
            intent: &result.intent,
            slots: &result.slots,
            values: &result.values,
            confidence: result.confidence,
            ticket,
        })
    }

    /// Release a view obtained from [`get_intent`](Self::get_intent).
    ///
    /// # Errors
    /// `InvalidArgument` for a ticket from another session, a ticket already
    /// released, or when nothing is outstanding.
    pub fn release(&mut self, ticket: ReleaseTicket) -> Result<()> {
        if ticket.session != self.id {
            return Err(ParleyError::InvalidArgument(
                "ticket belongs to a different session".into(),
            ));
        }
        match self.outstanding {
            Some(serial) if serial == ticket.serial => {
                self.outstanding = None;
                Ok(())
            }
            Some(_) => Err(ParleyError::InvalidArgument(
                "ticket is stale; it was already released".into(),
            )),
            None => Err(ParleyError::InvalidArgument(
                "no intent view is outstanding".into(),
            )),
        }
    }

    /// Return to `Listening`, dropping decode state and any unreleased view.
    pub fn reset(&mut self) {
        if self.outstanding.take().is_some() {
            debug!(session = self.id, "discarding unreleased intent view");
        }
        self.scorer.reset();
        self.decoder.reset();
        self.endpointer.reset();
        self.phase = Phase::Listening;
        self.result = None;
        self.reason = None;
        self.frames = 0;
        self.finalized_at = None;
    }

    /// Human-readable description of the loaded context.
    pub fn context_info(&self) -> &str {
        &self.context_info
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn sensitivity(&self) -> f32 {
        self.config.sensitivity
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn grammar(&self) -> &Arc<Grammar> {
        &self.grammar
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Frames accepted since construction or the last reset.
    pub fn frames_processed(&self) -> u64 {
        self.frames
    }

    /// 1-based index of the frame that finalized the current utterance.
    pub fn finalized_at(&self) -> Option<u64> {
        self.finalized_at
    }

    pub fn finalize_reason(&self) -> Option<FinalizeReason> {
        self.reason
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            phase: self.phase,
            sensitivity: self.config.sensitivity,
            frames_processed: self.frames,
            finalized_at: self.finalized_at,
            decoder: self.decoder.snapshot(),
        }
    }

    /// Owned record of the finalized utterance, `None` while listening.
    pub fn inference_event(&self) -> Option<InferenceEvent> {
        let (Some(frame_index), Some(reason)) = (self.finalized_at, self.reason) else {
            return None;
        };
        let result = self.result.as_ref();
        Some(InferenceEvent {
            seq: self.utterances,
            frame_index,
            is_understood: result.is_some(),
            intent: result.map(|r| r.intent.clone()),
            slots: result
                .map(|r| {
                    r.pairs()
                        .map(|(slot, value)| SlotValue {
                            slot: slot.to_string(),
                            value: value.to_string(),
                        })
                        .collect()
                })
                .unwrap_or_default(),
            confidence: result.map(|r| r.confidence),
            reason,
        })
    }

    /// Tear the session down. Dropping it has the same effect.
    pub fn close(self) {
        info!(session = self.id, utterances = self.utterances, "session closed");
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if self.outstanding.is_some() {
            debug!(session = self.id, "dropping session with an unreleased intent view");
        }
        debug!(session = self.id, "session released");
    }
}
