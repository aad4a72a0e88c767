//! `parley`: run WAV files through a speech-to-intent session.
//!
//! ```text
//! parley run --context lights.json --input cmd.wav [--model stub.json] [--sensitivity 0.6]
//! parley info --context lights.json
//! parley resolve --context lights.json turn the lights on
//! parley version
//! ```
//!
//! Results go to stdout as JSON, one line per utterance; logs go to stderr.

mod decode;
mod settings;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use parley_core::{
    AcousticModel, Engine, Grammar, ModelLoader, SlotValue, StubModelLoader, FRAME_LENGTH,
    SAMPLE_RATE,
};
use serde::Serialize;
use tracing::info;

use crate::settings::{load_settings, CliSettings};

/// Streaming speech-to-intent over small command grammars.
#[derive(Parser)]
#[command(name = "parley", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Decode a WAV file and print one JSON event per utterance.
    Run {
        /// Context (grammar) JSON file.
        #[arg(long)]
        context: PathBuf,

        /// Input WAV file (any sample rate or channel count).
        #[arg(long)]
        input: PathBuf,

        /// Acoustic model blob. Defaults to the built-in energy stub.
        #[arg(long)]
        model: Option<PathBuf>,

        /// Sensitivity in [0, 1]; overrides the settings file.
        #[arg(long)]
        sensitivity: Option<f32>,

        /// JSON settings file.
        #[arg(long)]
        settings: Option<PathBuf>,

        /// Stop after the first utterance.
        #[arg(long)]
        once: bool,
    },

    /// Describe a context: intents, expressions, slot types.
    Info {
        #[arg(long)]
        context: PathBuf,
    },

    /// Match a word sequence against a context without audio.
    Resolve {
        #[arg(long)]
        context: PathBuf,

        /// Words as they would be spoken.
        #[arg(required = true)]
        words: Vec<String>,
    },

    /// Print engine version and audio format.
    Version,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResolveOutput {
    intent: String,
    expression: String,
    required_slots: Vec<String>,
    slots: Vec<SlotValue>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("parley=info,parley_core=info")),
        )
        .init();

    match Cli::parse().command {
        Command::Run {
            context,
            input,
            model,
            sensitivity,
            settings,
            once,
        } => {
            let mut cfg = settings.as_deref().map(load_settings).unwrap_or_default();
            if let Some(s) = sensitivity {
                anyhow::ensure!((0.0..=1.0).contains(&s), "--sensitivity must be in [0, 1], got {s}");
                cfg.sensitivity = s;
            }
            if once {
                cfg.continuous = false;
            }
            cfg.normalize();
            run(&context, &input, model.as_deref(), &cfg)
        }
        Command::Info { context } => {
            let grammar = load_grammar(&context)?;
            print!("{}", grammar.describe());
            println!(
                "  vocabulary: {} words, {} intents, {} expressions",
                grammar.vocabulary().len() - 1,
                grammar.intents().len(),
                grammar.compiled_expressions().len()
            );
            Ok(())
        }
        Command::Resolve { context, words } => {
            let grammar = load_grammar(&context)?;
            let Some(resolution) = grammar.resolve(words.as_slice()) else {
                anyhow::bail!("{:?} does not match any expression", words.join(" "));
            };
            let source = grammar
                .expression(resolution.expression)
                .map(|e| e.source.clone())
                .unwrap_or_default();
            let out = ResolveOutput {
                intent: resolution.extraction.intent.clone(),
                expression: source,
                required_slots: resolution.required_slots,
                slots: resolution
                    .extraction
                    .pairs()
                    .map(|(slot, value)| SlotValue {
                        slot: slot.to_string(),
                        value: value.to_string(),
                    })
                    .collect(),
            };
            println!("{}", serde_json::to_string_pretty(&out)?);
            Ok(())
        }
        Command::Version => {
            println!(
                "parley {} (frame length {FRAME_LENGTH} samples, {SAMPLE_RATE} Hz mono i16)",
                parley_core::version()
            );
            Ok(())
        }
    }
}

fn load_grammar(path: &Path) -> Result<Grammar> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    Grammar::load(&bytes).with_context(|| format!("loading context {}", path.display()))
}

fn load_model(path: Option<&Path>) -> Result<Arc<dyn AcousticModel>> {
    let blob = match path {
        Some(p) => std::fs::read(p).with_context(|| format!("reading model {}", p.display()))?,
        None => Vec::new(),
    };
    Ok(StubModelLoader.load(&blob)?)
}

fn run(context: &Path, input: &Path, model: Option<&Path>, cfg: &CliSettings) -> Result<()> {
    let grammar = Arc::new(load_grammar(context)?);
    let model = load_model(model)?;
    let mut engine = Engine::with_grammar(model.as_ref(), grammar, cfg.engine_config())?;

    let (samples, rate) = decode::read_wav_mono_f32(input)?;
    let pcm = decode::to_engine_pcm(&samples, rate)?;
    info!(
        input = %input.display(),
        source_rate = rate,
        frames = pcm.len() / FRAME_LENGTH,
        "decoding"
    );

    let events = decode::decode_pcm(&mut engine, &pcm, cfg.continuous)?;
    for event in &events {
        let line = if cfg.pretty {
            serde_json::to_string_pretty(event)?
        } else {
            serde_json::to_string(event)?
        };
        println!("{line}");
    }
    info!(utterances = events.len(), "done");
    engine.close();
    Ok(())
}
