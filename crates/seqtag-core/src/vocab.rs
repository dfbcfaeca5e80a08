//! String-to-index vocabularies for words, char n-grams and tag classes.

use std::collections::HashMap;

/// Padding entry, always index 0 in vocabularies built with specials.
pub const PAD: &str = "<pad>";
/// Unknown entry, always index 1 in vocabularies built with specials.
pub const UNK: &str = "<unk>";

/// Bidirectional mapping between strings and dense `u32` indices.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    index: HashMap<String, u32>,
    entries: Vec<String>,
    unk: Option<u32>,
}

impl Vocabulary {
    /// Create an empty vocabulary without reserved entries (used for tags).
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a vocabulary with `<pad>` at 0 and `<unk>` at 1.
    pub fn with_specials() -> Self {
        let mut vocab = Self::new();
        vocab.add(PAD);
        let unk = vocab.add(UNK);
        vocab.unk = Some(unk);
        vocab
    }

    /// Add an entry if missing and return its index.
    pub fn add(&mut self, entry: &str) -> u32 {
        if let Some(&idx) = self.index.get(entry) {
            return idx;
        }
        let idx = self.entries.len() as u32;
        self.index.insert(entry.to_string(), idx);
        self.entries.push(entry.to_string());
        idx
    }

    /// Exact lookup.
    pub fn get(&self, entry: &str) -> Option<u32> {
        self.index.get(entry).copied()
    }

    /// Lookup falling back to `<unk>` when the vocabulary has one.
    pub fn encode(&self, entry: &str) -> Option<u32> {
        self.get(entry).or(self.unk)
    }

    /// The string stored at `idx`.
    pub fn entry(&self, idx: u32) -> Option<&str> {
        self.entries.get(idx as usize).map(String::as_str)
    }

    /// Index of `<unk>`, if reserved.
    pub fn unk_index(&self) -> Option<u32> {
        self.unk
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_specials() {
        let vocab = Vocabulary::with_specials();
        assert_eq!(vocab.get(PAD), Some(0));
        assert_eq!(vocab.get(UNK), Some(1));
        assert_eq!(vocab.size(), 2);
    }

    #[test]
    fn test_add_is_idempotent() {
        let mut vocab = Vocabulary::with_specials();
        let a = vocab.add("the");
        let b = vocab.add("the");
        assert_eq!(a, b);
        assert_eq!(vocab.size(), 3);
        assert_eq!(vocab.entry(a), Some("the"));
    }

    #[test]
    fn test_encode_falls_back_to_unk() {
        let mut vocab = Vocabulary::with_specials();
        vocab.add("dog");
        assert_eq!(vocab.encode("cat"), Some(1));

        let mut tags = Vocabulary::new();
        tags.add("NN");
        assert_eq!(tags.encode("VB"), None);
    }
}
