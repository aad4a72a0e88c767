//! WAV file → 16 kHz frames → inference events.

use std::path::Path;

use anyhow::{Context, Result};
use parley_core::audio::{downmix, f32_to_i16, resample::RateConverter};
use parley_core::{Engine, FrameAssembler, InferenceEvent, FRAME_LENGTH, SAMPLE_RATE};
use tracing::{debug, info};

/// Resampler input block size.
const RESAMPLE_CHUNK: usize = 1024;

/// Decode a WAV file of any rate or channel count into mono f32 plus its rate.
pub fn read_wav_mono_f32(path: &Path) -> Result<(Vec<f32>, u32)> {
    let mut reader =
        hound::WavReader::open(path).with_context(|| format!("opening {}", path.display()))?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()?,
        hound::SampleFormat::Int => {
            let bits = spec.bits_per_sample.clamp(1, 32);
            let max = ((1_i64 << (bits - 1)) - 1).max(1) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max))
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
    };

    debug!(
        path = %path.display(),
        rate = spec.sample_rate,
        channels,
        samples = interleaved.len(),
        "wav decoded"
    );
    Ok((downmix(&interleaved, channels), spec.sample_rate))
}

/// Bring mono f32 audio at `rate` to engine-ready 16 kHz PCM.
pub fn to_engine_pcm(samples: &[f32], rate: u32) -> Result<Vec<i16>> {
    let mut converter = RateConverter::new(rate, SAMPLE_RATE, RESAMPLE_CHUNK)?;
    let mut resampled = converter.process(samples);
    resampled.extend(converter.finish());
    Ok(f32_to_i16(&resampled))
}

/// Run `pcm` through `engine`, returning one event per finalized utterance.
///
/// The session is reset after every finalization. When the audio runs out
/// mid-utterance, silence is appended until the session finalizes. With
/// `continuous` off, decoding stops after the first event.
pub fn decode_pcm(engine: &mut Engine, pcm: &[i16], continuous: bool) -> Result<Vec<InferenceEvent>> {
    let mut assembler = FrameAssembler::new();
    let mut events = Vec::new();
    let mut offset = 0;

    while offset < pcm.len() {
        offset += assembler.push(&pcm[offset..]);
        while let Some(frame) = assembler.next_frame() {
            if step(engine, frame, &mut events)? && !continuous {
                return Ok(events);
            }
        }
    }

    let silence = [0i16; FRAME_LENGTH];
    let mut pending = assembler.flush_padded().map(<[i16]>::to_vec);
    if pending.is_none() && engine.frames_processed() == 0 {
        return Ok(events);
    }
    loop {
        let frame = pending.take();
        if step(engine, frame.as_deref().unwrap_or(&silence), &mut events)? {
            break;
        }
    }
    Ok(events)
}

fn step(engine: &mut Engine, frame: &[i16], events: &mut Vec<InferenceEvent>) -> Result<bool> {
    if !engine.process(frame)? {
        return Ok(false);
    }
    if let Some(event) = engine.inference_event() {
        info!(
            seq = event.seq,
            understood = event.is_understood,
            intent = event.intent.as_deref().unwrap_or("-"),
            "utterance finalized"
        );
        events.push(event);
    }
    engine.reset();
    Ok(true)
}
