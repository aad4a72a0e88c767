//! Optional JSON settings file for the `parley` binary.
//!
//! Every field has a default and out-of-range values are clamped rather than
//! rejected, so a hand-edited file never stops the tool from running.

use std::fs;
use std::path::Path;

use parley_core::EngineConfig;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct CliSettings {
    pub sensitivity: f32,
    pub early_finalize_confidence: f32,
    pub vad_threshold: f32,
    pub min_silence_frames: u32,
    pub max_listening_frames: u32,
    /// Keep decoding after the first utterance instead of stopping.
    pub continuous: bool,
    pub pretty: bool,
}

impl Default for CliSettings {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            sensitivity: engine.sensitivity,
            early_finalize_confidence: engine.decoder.early_finalize_confidence,
            vad_threshold: engine.endpoint.vad_threshold,
            min_silence_frames: engine.endpoint.min_silence_frames,
            max_listening_frames: engine.endpoint.max_listening_frames,
            continuous: true,
            pretty: false,
        }
    }
}

impl CliSettings {
    pub fn normalize(&mut self) {
        let floor = EngineConfig::default().decoder.floor_at_min_sensitivity;
        self.sensitivity = finite_or(self.sensitivity, 0.5).clamp(0.0, 1.0);
        self.early_finalize_confidence =
            finite_or(self.early_finalize_confidence, 0.9).clamp(floor, 1.0);
        self.vad_threshold = finite_or(self.vad_threshold, 0.02).clamp(0.001, 1.0);
        self.min_silence_frames = self.min_silence_frames.clamp(1, 300);
        self.max_listening_frames = self
            .max_listening_frames
            .clamp(self.min_silence_frames, 30 * 60);
    }

    pub fn engine_config(&self) -> EngineConfig {
        let mut config = EngineConfig::with_sensitivity(self.sensitivity);
        config.decoder.early_finalize_confidence = self.early_finalize_confidence;
        config.endpoint.vad_threshold = self.vad_threshold;
        config.endpoint.min_silence_frames = self.min_silence_frames;
        config.endpoint.max_listening_frames = self.max_listening_frames;
        config
    }
}

fn finite_or(v: f32, fallback: f32) -> f32 {
    if v.is_finite() {
        v
    } else {
        fallback
    }
}

/// Read settings from `path`, falling back to defaults when the file is
/// missing or unparsable.
pub fn load_settings(path: &Path) -> CliSettings {
    let mut settings = match fs::read_to_string(path) {
        Ok(raw) => serde_json::from_str::<CliSettings>(&raw).unwrap_or_else(|e| {
            warn!(path = %path.display(), "ignoring unparsable settings: {e}");
            CliSettings::default()
        }),
        Err(e) => {
            warn!(path = %path.display(), "settings unreadable, using defaults: {e}");
            CliSettings::default()
        }
    };
    settings.normalize();
    settings
}
