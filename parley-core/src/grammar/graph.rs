//! Compiled word graph for one expression.
//!
//! Every node is one spoken word. Alternatives and slot synonyms become
//! parallel chains; optional groups let the frontier skip over them. The first
//! node of each slot synonym chain carries a [`Binding`] so a path that enters
//! it records which slot was filled with which canonical value.

use super::expression::Token;
use super::vocabulary::WordId;
use crate::error::{ParleyError, Result};

/// Frontier marker for "before the first word".
const START: usize = usize::MAX;

/// Slot fill recorded when a path enters a synonym chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    /// Index into the owning intent's declared slot list.
    pub slot: usize,
    /// Index into the grammar's slot types.
    pub slot_type: usize,
    /// Index into that slot type's canonical values.
    pub value: usize,
}

#[derive(Debug, Clone)]
pub struct GraphNode {
    pub word: WordId,
    pub binding: Option<Binding>,
    pub next: Vec<usize>,
    /// Predecessors in ascending order.
    pub prev: Vec<usize>,
    pub is_entry: bool,
    pub is_final: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ExpressionGraph {
    pub nodes: Vec<GraphNode>,
}

/// Resolved view of a slot reference handed to the graph builder.
pub(crate) struct SlotChoices<'a> {
    pub slot: usize,
    pub slot_type: usize,
    /// Per canonical value: its surface phrases as word ids.
    pub values: &'a [Vec<Vec<WordId>>],
}

impl ExpressionGraph {
    /// Build a graph from parsed tokens.
    ///
    /// `word` resolves literal words to ids and `slot` resolves slot
    /// references (by name) to their synonym chains.
    pub(crate) fn build<'a>(
        tokens: &[Token],
        word: &mut dyn FnMut(&str) -> WordId,
        slot: &dyn Fn(&str) -> Result<SlotChoices<'a>>,
    ) -> Result<Self> {
        let mut graph = ExpressionGraph::default();
        let mut frontier = vec![START];

        for token in tokens {
            frontier = match token {
                Token::Group { phrases, optional } => {
                    let mut next = Vec::new();
                    for phrase in phrases {
                        let ends = graph.chain(&frontier, phrase, word, slot)?;
                        extend_unique(&mut next, &ends);
                    }
                    if *optional {
                        extend_unique(&mut next, &frontier);
                    }
                    next
                }
                single => graph.chain(&frontier, std::slice::from_ref(single), word, slot)?,
            };
        }

        if frontier.contains(&START) {
            return Err(ParleyError::MalformedContext(
                "expression can match an empty utterance".into(),
            ));
        }
        for &id in &frontier {
            graph.nodes[id].is_final = true;
        }
        for node in &mut graph.nodes {
            node.prev.sort_unstable();
        }
        Ok(graph)
    }

    fn chain<'a>(
        &mut self,
        frontier: &[usize],
        phrase: &[Token],
        word: &mut dyn FnMut(&str) -> WordId,
        slot: &dyn Fn(&str) -> Result<SlotChoices<'a>>,
    ) -> Result<Vec<usize>> {
        let mut current = frontier.to_vec();
        for token in phrase {
            current = match token {
                Token::Word(w) => {
                    let id = self.add_node(word(w), None);
                    self.link(&current, id);
                    vec![id]
                }
                Token::Slot(reference) => {
                    let choices = slot(&reference.name)?;
                    let mut ends = Vec::new();
                    for (value, synonyms) in choices.values.iter().enumerate() {
                        let binding = Binding {
                            slot: choices.slot,
                            slot_type: choices.slot_type,
                            value,
                        };
                        for words in synonyms {
                            let mut tail = current.clone();
                            for (i, &w) in words.iter().enumerate() {
                                let id = self.add_node(w, (i == 0).then_some(binding));
                                self.link(&tail, id);
                                tail = vec![id];
                            }
                            extend_unique(&mut ends, &tail);
                        }
                    }
                    ends
                }
                Token::Group { .. } => {
                    return Err(ParleyError::MalformedContext(
                        "nested groups are not supported".into(),
                    ))
                }
            };
        }
        Ok(current)
    }

    fn add_node(&mut self, word: WordId, binding: Option<Binding>) -> usize {
        self.nodes.push(GraphNode {
            word,
            binding,
            next: Vec::new(),
            prev: Vec::new(),
            is_entry: false,
            is_final: false,
        });
        self.nodes.len() - 1
    }

    fn link(&mut self, from: &[usize], to: usize) {
        for &f in from {
            if f == START {
                self.nodes[to].is_entry = true;
            } else {
                self.nodes[f].next.push(to);
                self.nodes[to].prev.push(f);
            }
        }
    }

    /// Exact match of a word sequence. Returns the bindings of the first
    /// accepting path found (lowest node order wins ambiguities).
    pub fn accepts(&self, words: &[WordId]) -> Option<Vec<Binding>> {
        let (&first, rest) = words.split_first()?;

        let mut states: Vec<(usize, Vec<Binding>)> = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_entry && n.word == first)
            .map(|(id, n)| (id, n.binding.into_iter().collect()))
            .collect();

        for &w in rest {
            let mut next: Vec<(usize, Vec<Binding>)> = Vec::new();
            for (id, bindings) in &states {
                for &succ in &self.nodes[*id].next {
                    let node = &self.nodes[succ];
                    if node.word != w || next.iter().any(|(s, _)| *s == succ) {
                        continue;
                    }
                    let mut b = bindings.clone();
                    b.extend(node.binding);
                    next.push((succ, b));
                }
            }
            if next.is_empty() {
                return None;
            }
            states = next;
        }

        states
            .into_iter()
            .find(|(id, _)| self.nodes[*id].is_final)
            .map(|(_, b)| b)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

fn extend_unique(into: &mut Vec<usize>, from: &[usize]) {
    for &id in from {
        if !into.contains(&id) {
            into.push(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::expression::parse_expression;
    use crate::grammar::vocabulary::Vocabulary;

    fn compile(src: &str, vocab: &mut Vocabulary, colors: &[Vec<Vec<WordId>>]) -> ExpressionGraph {
        let tokens = parse_expression(src).expect("parse");
        let slot = |_: &str| color_choices(colors);
        ExpressionGraph::build(&tokens, &mut |w: &str| vocab.intern(w), &slot).expect("build")
    }

    fn color_choices(colors: &[Vec<Vec<WordId>>]) -> Result<SlotChoices<'_>> {
        Ok(SlotChoices {
            slot: 0,
            slot_type: 0,
            values: colors,
        })
    }

    fn ids(vocab: &Vocabulary, words: &str) -> Vec<WordId> {
        words
            .split_whitespace()
            .map(|w| vocab.get(w).expect("known word"))
            .collect()
    }

    #[test]
    fn linear_expression() {
        let mut vocab = Vocabulary::new();
        let g = compile("turn on the lights", &mut vocab, &[]);
        assert_eq!(g.len(), 4);
        assert!(g.nodes[0].is_entry && !g.nodes[1].is_entry);
        assert!(g.nodes[3].is_final && !g.nodes[2].is_final);
        assert_eq!(g.nodes[2].prev, vec![1]);
        assert!(g.accepts(&ids(&vocab, "turn on the lights")).is_some());
        assert!(g.accepts(&ids(&vocab, "turn on the")).is_none());
    }

    #[test]
    fn optional_groups_skip() {
        let mut vocab = Vocabulary::new();
        let g = compile("[please] turn (on, off) [the lights]", &mut vocab, &[]);
        for ok in ["please turn on", "turn off the lights", "please turn on the lights"] {
            assert!(g.accepts(&ids(&vocab, ok)).is_some(), "{ok}");
        }
        assert!(g.accepts(&ids(&vocab, "please on")).is_none());
        assert!(g.accepts(&ids(&vocab, "turn on the")).is_none());
    }

    #[test]
    fn slot_chains_record_bindings() {
        let mut vocab = Vocabulary::new();
        let red = vocab.intern("red");
        let dark = vocab.intern("dark");
        let blue = vocab.intern("blue");
        let colors = vec![vec![vec![red]], vec![vec![blue], vec![dark, blue]]];
        let g = compile("make it $color:color", &mut vocab, &colors);

        let bindings = g.accepts(&ids(&vocab, "make it dark blue")).expect("match");
        assert_eq!(
            bindings,
            vec![Binding {
                slot: 0,
                slot_type: 0,
                value: 1
            }]
        );
        assert!(g.accepts(&ids(&vocab, "make it dark")).is_none());
    }

    #[test]
    fn all_optional_expression_is_rejected() {
        let tokens = parse_expression("[please]").expect("parse");
        let mut vocab = Vocabulary::new();
        let slot = |_: &str| -> Result<SlotChoices<'static>> {
            Err(ParleyError::MalformedContext("no slots".into()))
        };
        let err = ExpressionGraph::build(&tokens, &mut |w: &str| vocab.intern(w), &slot)
            .expect_err("empty match must be rejected");
        assert!(matches!(err, ParleyError::MalformedContext(_)));
    }
}
