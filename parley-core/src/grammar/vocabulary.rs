//! Dense word inventory shared by the grammar graphs and the acoustic scorer.
//!
//! Index 0 is reserved for the silence/blank class. Every other index names a
//! lowercase word that appears somewhere in the context.

use std::collections::HashMap;

/// Index of a word inside a [`Vocabulary`].
pub type WordId = usize;

/// Reserved index for silence / non-speech evidence.
pub const BLANK: WordId = 0;

const BLANK_LABEL: &str = "<sil>";

#[derive(Debug, Clone)]
pub struct Vocabulary {
    words: Vec<String>,
    index: HashMap<String, WordId>,
}

impl Vocabulary {
    pub fn new() -> Self {
        Self {
            words: vec![BLANK_LABEL.to_string()],
            index: HashMap::new(),
        }
    }

    /// Return the id for `word`, adding it if unseen.
    pub(crate) fn intern(&mut self, word: &str) -> WordId {
        if let Some(&id) = self.index.get(word) {
            return id;
        }
        let id = self.words.len();
        self.words.push(word.to_string());
        self.index.insert(word.to_string(), id);
        id
    }

    /// Look up a word (case-insensitive).
    pub fn get(&self, word: &str) -> Option<WordId> {
        self.index.get(&word.to_lowercase()).copied()
    }

    pub fn word(&self, id: WordId) -> Option<&str> {
        self.words.get(id).map(String::as_str)
    }

    /// Number of classes, blank included.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// `true` when no real word has been interned (only the blank class exists).
    pub fn is_empty(&self) -> bool {
        self.words.len() <= 1
    }

    /// Iterate over real words (blank excluded) in id order.
    pub fn words(&self) -> impl Iterator<Item = (WordId, &str)> {
        self.words
            .iter()
            .enumerate()
            .skip(1)
            .map(|(id, w)| (id, w.as_str()))
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::new()
    }
}
