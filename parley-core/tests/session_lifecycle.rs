use std::sync::Arc;

use parley_core::acoustic::{AcousticModel, AcousticScorer, FrameEvidence};
use parley_core::grammar::Vocabulary;
use parley_core::{
    Engine, EngineConfig, FinalizeReason, Grammar, ModelLoader, ParleyError, Phase, ScriptedModel,
    Status, StubModelLoader, FRAME_LENGTH,
};

const COFFEE: &str = r#"{
  "context": {
    "name": "coffee",
    "expressions": {
      "orderDrink": [
        "[i want, can i get] [a] $size:size $drink:drink",
        "[a] $drink:drink [please]",
        "$drink:drink [in a] $size:size [cup]"
      ],
      "cancel": ["cancel [my] order", "never mind"]
    },
    "slots": {
      "size": { "small": ["short"], "medium": ["regular"], "large": ["big", "extra large"] },
      "drink": ["latte", "espresso", "cappuccino"]
    }
  }
}"#;

const QUIET: [i16; FRAME_LENGTH] = [0; FRAME_LENGTH];
const LOUD: [i16; FRAME_LENGTH] = [4_000; FRAME_LENGTH];

fn session(model: &ScriptedModel, sensitivity: f32) -> Engine {
    Engine::new(model, COFFEE.as_bytes(), sensitivity).expect("engine")
}

/// Drive the session with PCM whose loudness follows the script. Returns the
/// 1-based frame on which it finalized.
fn run(engine: &mut Engine, model: &ScriptedModel) -> Option<usize> {
    for i in 0..model.len() {
        let frame = if model.is_voiced(i) { &LOUD } else { &QUIET };
        if engine.process(frame).expect("process") {
            return Some(i + 1);
        }
    }
    None
}

fn intent_of(engine: &mut Engine) -> (String, Vec<String>, Vec<String>) {
    let view = engine.get_intent().expect("intent view");
    let out = (
        view.intent().to_string(),
        view.slots().to_vec(),
        view.values().to_vec(),
    );
    let ticket = view.into_ticket();
    engine.release(ticket).expect("release");
    out
}

#[test]
fn exact_expression_yields_intent_and_canonical_slots() {
    let model = ScriptedModel::new()
        .silence(5)
        .say_phrase("can i get a large latte", 4)
        .silence(40);
    let mut engine = session(&model, 0.5);

    assert!(run(&mut engine, &model).is_some());
    assert!(engine.is_understood().expect("finalized"));
    let (intent, slots, values) = intent_of(&mut engine);
    assert_eq!(intent, "orderDrink");
    assert_eq!(slots, ["size", "drink"]);
    assert_eq!(values, ["large", "latte"]);
}

#[test]
fn stray_sound_before_the_command_is_ignored() {
    let model = ScriptedModel::new()
        .silence(3)
        .mumble(1)
        .silence(2)
        .say_phrase("a large latte", 4)
        .silence(40);

    for sensitivity in [0.0, 0.5, 1.0] {
        let mut engine = session(&model, sensitivity);
        assert_eq!(run(&mut engine, &model), Some(3 + 1 + 2 + 12 + 1));
        assert_eq!(engine.finalize_reason(), Some(FinalizeReason::EarlyConfidence));
        let (intent, _, values) = intent_of(&mut engine);
        assert_eq!(intent, "orderDrink");
        assert_eq!(values, ["large", "latte"]);
    }
}

#[test]
fn soft_onset_of_the_first_word_is_tolerated() {
    let model = ScriptedModel::new()
        .silence(2)
        .say_with_confidence("cancel", 1, 0.3)
        .say_phrase("cancel my order", 4)
        .silence(40);
    let mut engine = session(&model, 0.5);

    assert!(run(&mut engine, &model).is_some());
    assert!(engine.is_understood().expect("finalized"));
    let view = engine.get_intent().expect("intent view");
    assert_eq!(view.intent(), "cancel");
    assert!((view.confidence() - 1.0).abs() < 1e-6);
}

#[test]
fn pause_inside_a_longer_expression_keeps_listening() {
    // "latte" alone completes "[a] $drink [please]" but is also the start of
    // "$drink [in a] $size [cup]".
    let model = ScriptedModel::new()
        .say("latte", 4)
        .silence(2)
        .say_phrase("in a large cup", 3)
        .silence(40);
    let mut engine = session(&model, 0.5);

    assert_eq!(run(&mut engine, &model), Some(4 + 2 + 12 + 1));
    assert_eq!(engine.finalize_reason(), Some(FinalizeReason::EarlyConfidence));
    let (intent, slots, values) = intent_of(&mut engine);
    assert_eq!(intent, "orderDrink");
    assert_eq!(slots, ["size", "drink"]);
    assert_eq!(values, ["large", "latte"]);
}

#[test]
fn short_form_is_reported_once_the_speaker_stops() {
    let model = ScriptedModel::new().say("latte", 4).silence(40);
    let mut engine = session(&model, 0.5);

    assert_eq!(run(&mut engine, &model), Some(4 + 4 + 25));
    assert_eq!(engine.finalize_reason(), Some(FinalizeReason::EndOfSpeech));
    let (intent, slots, values) = intent_of(&mut engine);
    assert_eq!(intent, "orderDrink");
    assert_eq!(slots, ["drink"]);
    assert_eq!(values, ["latte"]);
}

#[test]
fn slots_follow_declared_order_not_speech_order() {
    let model = ScriptedModel::new()
        .say_phrase("espresso in a big cup", 3)
        .silence(40);
    let mut engine = session(&model, 0.5);

    assert!(run(&mut engine, &model).is_some());
    let (intent, slots, values) = intent_of(&mut engine);
    assert_eq!(intent, "orderDrink");
    assert_eq!(slots, ["size", "drink"]);
    assert_eq!(values, ["large", "espresso"]);
}

#[test]
fn intent_without_slots_has_empty_view() {
    let model = ScriptedModel::new().say_phrase("never mind", 5).silence(40);
    let mut engine = session(&model, 0.5);
    assert!(run(&mut engine, &model).is_some());
    let view = engine.get_intent().expect("intent view");
    assert_eq!(view.intent(), "cancel");
    assert!(view.is_empty());
}

#[test]
fn finalization_is_sticky_until_reset() {
    let model = ScriptedModel::new().say_phrase("a cappuccino", 4).silence(40);
    let mut engine = session(&model, 0.5);
    assert!(run(&mut engine, &model).is_some());
    let frame = engine.finalized_at();

    for _ in 0..3 {
        let err = engine.process(&QUIET).err().expect("must fail");
        assert!(matches!(err, ParleyError::InvalidState(_)));
        assert_eq!(err.status(), Status::InvalidState);
        assert_eq!(engine.phase(), Phase::FinalizedUnderstood);
        assert_eq!(engine.finalized_at(), frame);
    }

    engine.reset();
    assert_eq!(engine.phase(), Phase::Listening);
    assert!(!engine.process(&QUIET).expect("process after reset"));
}

#[test]
fn get_intent_requires_an_understood_result() {
    let model = ScriptedModel::new().mumble(10).silence(60);
    let mut engine = session(&model, 0.5);

    assert!(matches!(engine.get_intent(), Err(ParleyError::InvalidState(_))));
    assert_eq!(run(&mut engine, &model), Some(10 + 4 + 25));
    assert_eq!(engine.finalize_reason(), Some(FinalizeReason::EndOfSpeech));
    assert!(!engine.is_understood().expect("finalized"));
    assert!(matches!(engine.get_intent(), Err(ParleyError::InvalidState(_))));
}

#[test]
fn acceptance_is_monotonic_in_sensitivity() {
    let model = ScriptedModel::new()
        .silence(2)
        .say_phrase_with_confidence("a latte please", 4, 0.7)
        .silence(60);

    let mut outcomes = Vec::new();
    for step in 0..=20 {
        let sensitivity = step as f32 / 20.0;
        let mut engine = session(&model, sensitivity);
        assert!(run(&mut engine, &model).is_some());
        outcomes.push(engine.is_understood().expect("finalized"));
    }

    assert!(!outcomes[0], "strictest setting should reject weak evidence");
    assert!(outcomes[20], "most permissive setting should accept it");
    for pair in outcomes.windows(2) {
        assert!(!pair[0] || pair[1], "raising sensitivity lost a match: {outcomes:?}");
    }
}

#[test]
fn reset_is_idempotent_and_decoding_is_deterministic() {
    let model = ScriptedModel::new()
        .silence(3)
        .say_phrase_with_confidence("cancel my order", 4, 0.8)
        .silence(50);
    let mut engine = session(&model, 0.7);

    let first_frame = run(&mut engine, &model);
    let first = engine.inference_event().expect("event");
    let first_intent = intent_of(&mut engine);

    for _ in 0..3 {
        engine.reset();
        assert_eq!(engine.phase(), Phase::Listening);
        let status = engine.status();
        assert_eq!(status.frames_processed, 0);
        assert_eq!(status.finalized_at, None);
        assert_eq!(status.decoder.active, 0);
        assert_eq!(status.decoder.speech_frames, 0);
    }

    let second_frame = run(&mut engine, &model);
    let second = engine.inference_event().expect("event");
    assert_eq!(first_frame, second_frame);
    assert_eq!(first.frame_index, second.frame_index);
    assert_eq!(first.intent, second.intent);
    assert_eq!(first.slots, second.slots);
    assert_eq!(first.confidence, second.confidence);
    assert_eq!(first.reason, second.reason);
    assert_eq!(second.seq, first.seq + 1);
    assert_eq!(intent_of(&mut engine), first_intent);
}

#[test]
fn silence_only_times_out_not_understood() {
    let model = ScriptedModel::new();
    let mut engine = session(&model, 1.0);
    let limit = EngineConfig::default().endpoint.max_listening_frames as u64;

    for _ in 1..limit {
        assert!(!engine.process(&QUIET).expect("process"));
    }
    assert!(engine.process(&QUIET).expect("process"));
    assert_eq!(engine.finalized_at(), Some(limit));
    assert_eq!(engine.finalize_reason(), Some(FinalizeReason::Timeout));
    assert!(!engine.is_understood().expect("finalized"));
}

#[test]
fn wrong_frame_length_is_invalid_argument() {
    let model = ScriptedModel::new();
    let mut engine = session(&model, 0.5);
    engine.process(&QUIET).expect("process");

    for len in [0, FRAME_LENGTH - 1, FRAME_LENGTH + 1] {
        let err = engine.process(&vec![0i16; len]).err().expect("must fail");
        assert_eq!(err.status(), Status::InvalidArgument);
        assert_eq!(engine.phase(), Phase::Listening);
        assert_eq!(engine.frames_processed(), 1);
    }
}

#[test]
fn release_discipline() {
    let model = ScriptedModel::new().say_phrase("a small espresso", 3).silence(40);
    let mut a = session(&model, 0.5);
    let mut b = session(&model, 0.5);
    assert!(run(&mut a, &model).is_some());
    assert!(run(&mut b, &model).is_some());

    let ticket_a = a.get_intent().expect("view").into_ticket();
    let err = b.release(ticket_a).err().expect("foreign ticket");
    assert!(matches!(err, ParleyError::InvalidArgument(_)));

    a.release(ticket_a).expect("first release");
    let err = a.release(ticket_a).err().expect("double release");
    assert!(matches!(err, ParleyError::InvalidArgument(_)));

    let ticket = a.get_intent().expect("view again").into_ticket();
    a.reset();
    let err = a.release(ticket).err().expect("reset discards the view");
    assert!(matches!(err, ParleyError::InvalidArgument(_)));
}

struct FailingModel {
    fail_at: usize,
}

struct FailingScorer {
    fail_at: usize,
    calls: usize,
    classes: usize,
}

impl AcousticScorer for FailingScorer {
    fn score(&mut self, _pcm: &[i16]) -> parley_core::error::Result<FrameEvidence> {
        self.calls += 1;
        if self.calls == self.fail_at {
            return Err(ParleyError::OutOfMemory("scorer arena exhausted".into()));
        }
        Ok(FrameEvidence::silence(self.classes))
    }

    fn reset(&mut self) {
        self.calls = 0;
    }
}

impl AcousticModel for FailingModel {
    fn name(&self) -> &str {
        "failing"
    }

    fn scorer(&self, vocabulary: &Vocabulary) -> parley_core::error::Result<Box<dyn AcousticScorer>> {
        Ok(Box::new(FailingScorer {
            fail_at: self.fail_at,
            calls: 0,
            classes: vocabulary.len(),
        }))
    }
}

#[test]
fn out_of_memory_during_decode_leaves_phase_unchanged() {
    let mut engine = Engine::new(&FailingModel { fail_at: 3 }, COFFEE.as_bytes(), 0.5).expect("engine");
    engine.process(&QUIET).expect("frame 1");
    engine.process(&QUIET).expect("frame 2");

    let err = engine.process(&QUIET).err().expect("frame 3 fails");
    assert_eq!(err.status(), Status::OutOfMemory);
    assert_eq!(engine.phase(), Phase::Listening);
    assert_eq!(engine.frames_processed(), 2);

    engine.reset();
    assert!(!engine.process(&QUIET).expect("usable after reset"));
}

#[test]
fn sessions_share_one_grammar() {
    let grammar = Arc::new(Grammar::load(COFFEE.as_bytes()).expect("grammar"));
    let orders = [
        ("a medium cappuccino", "medium", "cappuccino"),
        ("i want a regular latte", "medium", "latte"),
        ("espresso in a short cup", "small", "espresso"),
    ];

    std::thread::scope(|scope| {
        for (phrase, size, drink) in orders {
            let grammar = Arc::clone(&grammar);
            scope.spawn(move || {
                let model = ScriptedModel::new().say_phrase(phrase, 3).silence(40);
                let mut engine =
                    Engine::with_grammar(&model, grammar, EngineConfig::default()).expect("engine");
                assert!(run(&mut engine, &model).is_some(), "{phrase}");
                let (_, _, values) = intent_of(&mut engine);
                assert_eq!(values, [size, drink], "{phrase}");
            });
        }
    });
    assert_eq!(Arc::strong_count(&grammar), 1);
}

#[test]
fn stub_model_hears_speech_but_understands_nothing() {
    let model = StubModelLoader.load(b"").expect("stub model");
    let mut engine = Engine::new(model.as_ref(), COFFEE.as_bytes(), 1.0).expect("engine");
    let mut finalized = false;
    for i in 0..200 {
        let frame = if i < 20 { &LOUD } else { &QUIET };
        if engine.process(frame).expect("process") {
            finalized = true;
            break;
        }
    }
    assert!(finalized);
    assert_eq!(engine.finalize_reason(), Some(FinalizeReason::EndOfSpeech));
    assert!(!engine.is_understood().expect("finalized"));
}

#[test]
fn from_files_reads_blobs_and_reports_io_errors() {
    let dir = std::env::temp_dir().join(format!("parley-test-{}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("temp dir");
    let model_path = dir.join("model.json");
    let context_path = dir.join("coffee.json");
    std::fs::write(&model_path, br#"{ "wordProbability": 0.02 }"#).expect("write model");
    std::fs::write(&context_path, COFFEE).expect("write context");

    let engine =
        Engine::from_files(&StubModelLoader, &model_path, &context_path, 0.5).expect("engine");
    assert_eq!(engine.model_name(), "stub");
    assert!(engine.context_info().contains("orderDrink"));
    assert!(engine.context_info().contains("large (big, extra large)"));
    engine.close();

    let err = Engine::from_files(&StubModelLoader, &dir.join("missing.bin"), &context_path, 0.5)
        .err()
        .expect("missing model");
    assert_eq!(err.status(), Status::IoError);

    let err = Engine::from_files(&StubModelLoader, &model_path, &context_path, 1.5)
        .err()
        .expect("bad sensitivity");
    assert_eq!(err.status(), Status::InvalidArgument);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn process_wide_constants() {
    assert_eq!(parley_core::frame_length(), 512);
    assert_eq!(parley_core::sample_rate(), 16_000);
    assert!(!parley_core::version().is_empty());
}
