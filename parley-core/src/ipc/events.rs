//! Serializable session events.
//!
//! | Record | Produced by |
//! |--------|-------------|
//! | `InferenceEvent` | `Engine::inference_event` after finalization |
//! | `EngineStatus` | `Engine::status` at any time |

use serde::{Deserialize, Serialize};

use crate::decoder::DecoderSnapshot;

/// Lifecycle phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Accepting frames.
    Listening,
    /// Finalized with a matched expression; the intent may be read.
    FinalizedUnderstood,
    /// Finalized without a match.
    FinalizedNotUnderstood,
}

impl Phase {
    pub fn is_finalized(self) -> bool {
        self != Phase::Listening
    }
}

/// Why the session stopped listening.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalizeReason {
    /// A completed expression was confident enough not to wait for silence.
    EarlyConfidence,
    /// Speech followed by sustained silence.
    EndOfSpeech,
    /// The listening budget ran out.
    Timeout,
}

/// One filled slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotValue {
    pub slot: String,
    /// Canonical value.
    pub value: String,
}

/// Outcome of one utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceEvent {
    /// Utterance sequence number within the session, starting at 1.
    pub seq: u64,
    /// Frame (1-based) on which the session finalized.
    pub frame_index: u64,
    pub is_understood: bool,
    pub intent: Option<String>,
    /// In the intent's declared slot order.
    pub slots: Vec<SlotValue>,
    pub confidence: Option<f32>,
    pub reason: FinalizeReason,
}

/// Point-in-time session diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub phase: Phase,
    pub sensitivity: f32,
    pub frames_processed: u64,
    pub finalized_at: Option<u64>,
    pub decoder: DecoderSnapshot,
}
