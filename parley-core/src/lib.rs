//! # parley-core
//!
//! Streaming speech-to-intent engine for small command grammars.
//!
//! ## Architecture
//!
//! ```text
//! frame (512 × i16 @ 16 kHz)
//!     │
//!     ├─► AcousticScorer ─► FrameEvidence ─► Decoder (Viterbi over expression graphs)
//!     │                                          │ early confidence
//!     └─► Endpointer (EnergyVad + timers) ───────┤ end of speech / timeout
//!                                                ▼
//!                                   finalize ─► extract ─► IntentView
//! ```
//!
//! A session never allocates outside the decode state it owns, never blocks,
//! and never touches disk after construction.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod acoustic;
pub mod audio;
pub mod buffering;
pub mod decoder;
pub mod engine;
pub mod error;
pub mod extract;
pub mod grammar;
pub mod ipc;
pub mod vad;

pub use acoustic::{
    AcousticModel, AcousticScorer, FrameEvidence, ModelLoader, ScriptedModel, StubModel,
    StubModelLoader,
};
pub use buffering::FrameAssembler;
pub use decoder::DecoderConfig;
pub use engine::{Engine, EngineConfig, IntentView, ReleaseTicket};
pub use error::{ParleyError, Status};
pub use grammar::Grammar;
pub use ipc::events::{EngineStatus, FinalizeReason, InferenceEvent, Phase, SlotValue};
pub use vad::EndpointConfig;

/// Samples per `Engine::process` call.
pub const FRAME_LENGTH: usize = 512;

/// Required input sample rate (Hz).
pub const SAMPLE_RATE: u32 = 16_000;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn frame_length() -> usize {
    FRAME_LENGTH
}

pub fn sample_rate() -> u32 {
    SAMPLE_RATE
}

pub fn version() -> &'static str {
    VERSION
}
