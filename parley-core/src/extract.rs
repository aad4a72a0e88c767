//! Intent and slot extraction.
//!
//! Turns the bindings collected along a matched path into the intent label
//! and parallel slot/value lists. Values are always canonical, and slots are
//! ordered by the intent's declared slot list rather than by the order in
//! which they were spoken.

use crate::grammar::{Binding, Grammar};

/// Intent with resolved slot values.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    /// Expression that produced the match.
    pub expression: usize,
    pub intent: String,
    /// Filled slot names, in the intent's declared order.
    pub slots: Vec<String>,
    /// Canonical values, parallel to `slots`.
    pub values: Vec<String>,
    /// Path confidence in (0, 1].
    pub confidence: f32,
}

impl Extraction {
    /// `(slot, value)` pairs.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.slots
            .iter()
            .zip(&self.values)
            .map(|(s, v)| (s.as_str(), v.as_str()))
    }
}

/// Resolve `bindings` recorded on a path through `expression`.
///
/// Returns `None` when `expression` is not part of `grammar`. Bindings that
/// point outside the grammar are skipped; a well-formed graph never produces
/// them.
pub fn extract(
    grammar: &Grammar,
    expression: usize,
    bindings: &[Binding],
    confidence: f32,
) -> Option<Extraction> {
    let intent = grammar
        .expression(expression)
        .and_then(|e| grammar.intent(e.intent))?;

    let mut ordered: Vec<&Binding> = bindings.iter().collect();
    ordered.sort_by_key(|b| b.slot);
    ordered.dedup_by_key(|b| b.slot);

    let mut slots = Vec::with_capacity(ordered.len());
    let mut values = Vec::with_capacity(ordered.len());
    for b in ordered {
        let decl = intent.slots.get(b.slot);
        let value = grammar
            .slot_type(b.slot_type)
            .and_then(|t| t.values.get(b.value));
        if let (Some(decl), Some(value)) = (decl, value) {
            slots.push(decl.name.clone());
            values.push(value.canonical.clone());
        }
    }

    Some(Extraction {
        expression,
        intent: intent.name.clone(),
        slots,
        values,
        confidence,
    })
}
