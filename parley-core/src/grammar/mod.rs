//! Grammar model: the compiled, immutable form of a context.
//!
//! A context declares intents, each with one or more expressions, plus a
//! catalog of slot types whose canonical values may have spoken synonyms.
//! Loading validates the whole document and compiles every expression into an
//! [`ExpressionGraph`] over a shared [`Vocabulary`].
//!
//! `Grammar` holds no interior mutability, so one `Arc<Grammar>` can back any
//! number of sessions.

pub mod context;
pub mod expression;
pub mod graph;
pub mod vocabulary;

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, info};

use crate::error::{ParleyError, Result};
use crate::extract::{self, Extraction};

pub use context::ContextDocument;
pub use graph::{Binding, ExpressionGraph};
pub use vocabulary::{Vocabulary, WordId, BLANK};

use expression::{parse_expression, phrase_words, Token};
use graph::SlotChoices;

/// One canonical slot value with its accepted surface forms.
#[derive(Debug, Clone)]
pub struct SlotValueDef {
    pub canonical: String,
    /// Surface forms other than the canonical value itself.
    pub synonyms: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SlotType {
    pub name: String,
    pub values: Vec<SlotValueDef>,
}

/// A slot declared by an intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotDecl {
    pub name: String,
    pub slot_type: usize,
}

#[derive(Debug, Clone)]
pub struct Intent {
    pub name: String,
    /// Union of slots referenced by the intent's expressions, ordered by first appearance.
    pub slots: Vec<SlotDecl>,
}

#[derive(Debug, Clone)]
pub struct Expression {
    pub intent: usize,
    pub source: String,
    pub graph: ExpressionGraph,
}

/// Result of matching a word sequence against the grammar.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Index of the matched expression in declaration order.
    pub expression: usize,
    /// Every slot the intent declares, in declared order.
    pub required_slots: Vec<String>,
    pub extraction: Extraction,
}

#[derive(Debug, Clone)]
pub struct Grammar {
    name: String,
    vocabulary: Vocabulary,
    slot_types: Vec<SlotType>,
    intents: Vec<Intent>,
    expressions: Vec<Expression>,
}

impl Grammar {
    /// Parse and compile a context blob.
    pub fn load(bytes: &[u8]) -> Result<Self> {
        Self::from_document(&ContextDocument::from_slice(bytes)?)
    }

    pub fn from_document(doc: &ContextDocument) -> Result<Self> {
        let body = &doc.context;
        if body.expressions.is_empty() {
            return Err(ParleyError::MalformedContext(
                "context declares no intents".into(),
            ));
        }

        let mut vocabulary = Vocabulary::new();
        let slot_types = compile_slot_types(body, &mut vocabulary)?;
        let type_index: HashMap<&str, usize> = slot_types
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name.as_str(), i))
            .collect();

        let mut intents = Vec::with_capacity(body.expressions.len());
        let mut expressions = Vec::new();

        for (intent_idx, (intent_name, sources)) in body.expressions.iter().enumerate() {
            if sources.is_empty() {
                return Err(ParleyError::MalformedContext(format!(
                    "intent `{intent_name}` has no expressions"
                )));
            }

            let mut intent = Intent {
                name: intent_name.clone(),
                slots: Vec::new(),
            };

            for source in sources {
                let tokens = parse_expression(source)?;
                let refs = collect_slot_refs(&tokens);

                let mut seen: Vec<&str> = Vec::new();
                for (slot_type, name) in &refs {
                    if seen.contains(name) {
                        return Err(ParleyError::MalformedContext(format!(
                            "expression {source:?} binds slot `{name}` twice"
                        )));
                    }
                    seen.push(*name);

                    let type_idx = *type_index.get(slot_type).ok_or_else(|| {
                        ParleyError::MalformedContext(format!(
                            "expression {source:?} references unknown slot type `{slot_type}`"
                        ))
                    })?;
                    match intent.slots.iter().find(|d| d.name == *name) {
                        Some(decl) if decl.slot_type != type_idx => {
                            return Err(ParleyError::MalformedContext(format!(
                                "slot `{name}` of intent `{intent_name}` is bound to two slot types"
                            )));
                        }
                        Some(_) => {}
                        None => intent.slots.push(SlotDecl {
                            name: name.to_string(),
                            slot_type: type_idx,
                        }),
                    }
                }

                let slots = intent.slots.as_slice();
                let types = slot_types.as_slice();
                let resolve_slot = |name: &str| slot_choices(slots, types, name);
                let graph = ExpressionGraph::build(
                    &tokens,
                    &mut |w: &str| vocabulary.intern(w),
                    &resolve_slot,
                )?;

                debug!(intent = intent_name.as_str(), nodes = graph.len(), "compiled expression");
                expressions.push(Expression {
                    intent: intent_idx,
                    source: source.clone(),
                    graph,
                });
            }

            intents.push(intent);
        }

        let grammar = Self {
            name: body.name.clone(),
            vocabulary,
            slot_types: slot_types.into_iter().map(CompiledSlotType::into_slot_type).collect(),
            intents,
            expressions,
        };

        info!(
            context = grammar.name.as_str(),
            intents = grammar.intents.len(),
            expressions = grammar.expressions.len(),
            words = grammar.vocabulary.len() - 1,
            "grammar loaded"
        );
        Ok(grammar)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn intents(&self) -> &[Intent] {
        &self.intents
    }

    pub fn intent(&self, idx: usize) -> Option<&Intent> {
        self.intents.get(idx)
    }

    pub fn slot_types(&self) -> &[SlotType] {
        &self.slot_types
    }

    pub fn slot_type(&self, idx: usize) -> Option<&SlotType> {
        self.slot_types.get(idx)
    }

    pub fn expression(&self, idx: usize) -> Option<&Expression> {
        self.expressions.get(idx)
    }

    /// Compiled expressions in declaration order.
    pub fn compiled_expressions(&self) -> &[Expression] {
        &self.expressions
    }

    /// `(intent, source)` for every expression in declaration order.
    pub fn expressions(&self) -> impl Iterator<Item = (&str, &str)> {
        self.expressions
            .iter()
            .map(|e| (self.intents[e.intent].name.as_str(), e.source.as_str()))
    }

    /// Match a spoken word sequence exactly. The earliest declared expression wins.
    pub fn resolve<S: AsRef<str>>(&self, words: &[S]) -> Option<Resolution> {
        let ids = words
            .iter()
            .map(|w| self.vocabulary.get(w.as_ref()))
            .collect::<Option<Vec<_>>>()?;

        self.expressions
            .iter()
            .enumerate()
            .find_map(|(idx, expr)| expr.graph.accepts(&ids).map(|b| (idx, expr, b)))
            .and_then(|(idx, expr, bindings)| {
                let intent = &self.intents[expr.intent];
                Some(Resolution {
                    expression: idx,
                    required_slots: intent.slots.iter().map(|d| d.name.clone()).collect(),
                    extraction: extract::extract(self, idx, &bindings, 1.0)?,
                })
            })
    }

    /// Human-readable dump of the context.
    pub fn describe(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "context: {}", self.name)?;
        writeln!(f, "  expressions:")?;
        for (idx, intent) in self.intents.iter().enumerate() {
            writeln!(f, "    {}:", intent.name)?;
            for expr in self.expressions.iter().filter(|e| e.intent == idx) {
                writeln!(f, "      - {}", expr.source)?;
            }
        }
        if !self.slot_types.is_empty() {
            writeln!(f, "  slots:")?;
            for slot_type in &self.slot_types {
                writeln!(f, "    {}:", slot_type.name)?;
                for value in &slot_type.values {
                    if value.synonyms.is_empty() {
                        writeln!(f, "      - {}", value.canonical)?;
                    } else {
                        writeln!(f, "      - {} ({})", value.canonical, value.synonyms.join(", "))?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Slot type plus the per-value phrase table the graph builder consumes.
struct CompiledSlotType {
    name: String,
    values: Vec<SlotValueDef>,
    phrase_table: Vec<Vec<Vec<WordId>>>,
}

impl CompiledSlotType {
    fn into_slot_type(self) -> SlotType {
        SlotType {
            name: self.name,
            values: self.values,
        }
    }
}

fn compile_slot_types(
    body: &context::ContextBody,
    vocabulary: &mut Vocabulary,
) -> Result<Vec<CompiledSlotType>> {
    let mut out = Vec::with_capacity(body.slots.len());

    for (type_name, values) in body.slots.iter() {
        let entries = values.entries();
        if entries.is_empty() {
            return Err(ParleyError::MalformedContext(format!(
                "slot type `{type_name}` has no values"
            )));
        }

        // surface form → canonical index, to reject ambiguous synonyms
        let mut surface_owner: HashMap<Vec<String>, usize> = HashMap::new();
        let mut defs = Vec::with_capacity(entries.len());
        let mut table = Vec::with_capacity(entries.len());

        for (value_idx, (canonical, synonyms)) in entries.iter().enumerate() {
            let mut phrases: Vec<Vec<WordId>> = Vec::new();
            for surface in std::iter::once(*canonical).chain(synonyms.iter().map(String::as_str)) {
                let words = phrase_words(surface)?;
                match surface_owner.get(&words) {
                    Some(&owner) if owner != value_idx => {
                        return Err(ParleyError::MalformedContext(format!(
                            "slot type `{type_name}`: {surface:?} maps to two values"
                        )));
                    }
                    // repeated surface for the same value
                    Some(_) => continue,
                    None => {}
                }
                phrases.push(words.iter().map(|w| vocabulary.intern(w)).collect());
                surface_owner.insert(words, value_idx);
            }

            defs.push(SlotValueDef {
                canonical: canonical.to_string(),
                synonyms: synonyms
                    .iter()
                    .filter(|s| s.as_str() != *canonical)
                    .cloned()
                    .collect(),
            });
            table.push(phrases);
        }

        out.push(CompiledSlotType {
            name: type_name.clone(),
            values: defs,
            phrase_table: table,
        });
    }

    Ok(out)
}

fn slot_choices<'a>(
    slots: &[SlotDecl],
    types: &'a [CompiledSlotType],
    name: &str,
) -> Result<SlotChoices<'a>> {
    let (slot, decl) = slots
        .iter()
        .enumerate()
        .find(|(_, d)| d.name == name)
        .ok_or_else(|| ParleyError::MalformedContext(format!("undeclared slot `{name}`")))?;
    Ok(SlotChoices {
        slot,
        slot_type: decl.slot_type,
        values: &types[decl.slot_type].phrase_table,
    })
}

/// `(slot_type, name)` pairs in order of appearance, including inside groups.
fn collect_slot_refs(tokens: &[Token]) -> Vec<(&str, &str)> {
    let mut out = Vec::new();
    for token in tokens {
        match token {
            Token::Slot(r) => out.push((r.slot_type.as_str(), r.name.as_str())),
            Token::Group { phrases, .. } => {
                for phrase in phrases {
                    out.extend(collect_slot_refs(phrase));
                }
            }
            Token::Word(_) => {}
        }
    }
    out
}
