//! # Corpus
//!
//! Holds the train and dev splits as vocabulary indices and assembles padded
//! mini-batch tensors for a [`BatchRange`].

mod ngram;
mod reader;

use std::path::Path;

use candle_core::{DType, Device, Tensor};
use oorandom::Rand32;
use tracing::debug;

use crate::batch::BatchRange;
use crate::error::{Result, SeqTagError};
use crate::loss::IGNORE_LABEL;
use crate::vocab::Vocabulary;

pub use ngram::{MAX_NGRAM, char_ngrams};
pub use reader::{TaggedSentence, read_tagged_file};

/// Which split a batch is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    /// Training split, read through the current shuffled ordering.
    Train,
    /// Dev split, always in file order.
    Dev,
}

/// Char n-gram indices per token slot, with a mask marking real entries.
#[derive(Debug, Clone)]
pub struct CharInputs {
    /// `[batch * max_len, max_ngrams]`, `u32`.
    pub ids: Tensor,
    /// `[batch * max_len, max_ngrams]`, `f32`, 1.0 for real n-grams.
    pub mask: Tensor,
}

/// Initial recurrent state, one slice per encoder direction.
#[derive(Debug, Clone)]
pub struct HiddenState {
    /// `[2, batch, hidden_dim]`
    pub h: Tensor,
    /// `[2, batch, hidden_dim]`
    pub c: Tensor,
}

impl HiddenState {
    pub fn zeros(batch: usize, hidden_dim: usize, device: &Device) -> Result<Self> {
        Ok(Self {
            h: Tensor::zeros((2, batch, hidden_dim), DType::F32, device)?,
            c: Tensor::zeros((2, batch, hidden_dim), DType::F32, device)?,
        })
    }
}

/// A padded mini-batch ready for the tagger.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Word indices, `[batch, max_len]`, `u32`, padded with `<pad>`.
    pub inputs: Tensor,
    pub char_inputs: CharInputs,
    /// Flattened gold classes, `[batch * max_len]`, `i64`; padding slots hold
    /// [`IGNORE_LABEL`].
    pub targets: Tensor,
    /// Real length of every sentence in the batch.
    pub lengths: Vec<usize>,
    pub hidden0: HiddenState,
    /// Number of non-padding tokens.
    pub token_count: usize,
}

/// Source of mini-batches for the training loop.
pub trait BatchSource {
    /// Number of sentences in `split`.
    fn split_len(&self, split: Split) -> usize;

    /// Draw a fresh random permutation of the training ordering.
    fn shuffle_train(&mut self, rng: &mut Rand32);

    /// Assemble the batch for `range` of `split`.
    fn batch(
        &self,
        split: Split,
        range: BatchRange,
        hidden_dim: usize,
        device: &Device,
    ) -> Result<Batch>;
}

#[derive(Debug, Clone)]
struct EncodedSentence {
    words: Vec<u32>,
    ngrams: Vec<Vec<u32>>,
    classes: Vec<i64>,
}

/// Train/dev splits with their word, char n-gram and class vocabularies.
#[derive(Debug, Clone)]
pub struct Corpus {
    word_vocab: Vocabulary,
    char_vocab: Vocabulary,
    class_vocab: Vocabulary,
    train: Vec<EncodedSentence>,
    dev: Vec<EncodedSentence>,
    train_order: Vec<usize>,
}

impl Corpus {
    /// Load both splits from tagged corpus files.
    pub fn load<P: AsRef<Path>, Q: AsRef<Path>>(train_path: P, dev_path: Q) -> Result<Self> {
        let train = read_tagged_file(train_path)?;
        let dev = read_tagged_file(dev_path)?;
        Self::from_sentences(train, dev)
    }

    /// Build vocabularies and encode both splits.
    ///
    /// Words and char n-grams come from the training split only, lower-cased;
    /// anything unseen maps to `<unk>`. Classes are collected from both splits.
    /// Every sentence must carry exactly one tag per token.
    pub fn from_sentences(train: Vec<TaggedSentence>, dev: Vec<TaggedSentence>) -> Result<Self> {
        check_tag_counts("train", &train)?;
        check_tag_counts("dev", &dev)?;

        let train: Vec<TaggedSentence> = train.into_iter().filter(|s| !s.is_empty()).collect();
        let dev: Vec<TaggedSentence> = dev.into_iter().filter(|s| !s.is_empty()).collect();
        if train.is_empty() {
            return Err(SeqTagError::EmptyCorpus);
        }

        let mut word_vocab = Vocabulary::with_specials();
        let mut char_vocab = Vocabulary::with_specials();
        let mut class_vocab = Vocabulary::new();

        for sentence in &train {
            for token in &sentence.tokens {
                let word = token.to_lowercase();
                for ngram in char_ngrams(&word) {
                    char_vocab.add(&ngram);
                }
                word_vocab.add(&word);
            }
        }
        for sentence in train.iter().chain(dev.iter()) {
            for tag in &sentence.tags {
                class_vocab.add(tag);
            }
        }

        let encode = |sentence: &TaggedSentence| -> EncodedSentence {
            let mut words = Vec::with_capacity(sentence.len());
            let mut ngrams = Vec::with_capacity(sentence.len());
            for token in &sentence.tokens {
                let word = token.to_lowercase();
                words.push(word_vocab.encode(&word).unwrap_or(1));
                let mut ids: Vec<u32> = char_ngrams(&word)
                    .iter()
                    .filter_map(|ngram| char_vocab.get(ngram))
                    .collect();
                if ids.is_empty() {
                    ids.extend(char_vocab.unk_index());
                }
                ngrams.push(ids);
            }
            let classes = sentence
                .tags
                .iter()
                .map(|tag| class_vocab.get(tag).map_or(IGNORE_LABEL, i64::from))
                .collect();
            EncodedSentence {
                words,
                ngrams,
                classes,
            }
        };

        let train: Vec<EncodedSentence> = train.iter().map(encode).collect();
        let dev: Vec<EncodedSentence> = dev.iter().map(encode).collect();
        let train_order = (0..train.len()).collect();

        debug!(
            words = word_vocab.size(),
            char_ngrams = char_vocab.size(),
            classes = class_vocab.size(),
            "built vocabularies"
        );

        Ok(Self {
            word_vocab,
            char_vocab,
            class_vocab,
            train,
            dev,
            train_order,
        })
    }

    pub fn word_vocab(&self) -> &Vocabulary {
        &self.word_vocab
    }

    pub fn char_vocab(&self) -> &Vocabulary {
        &self.char_vocab
    }

    pub fn class_vocab(&self) -> &Vocabulary {
        &self.class_vocab
    }

    /// Current position-to-sentence mapping of the training split.
    pub fn train_order(&self) -> &[usize] {
        &self.train_order
    }

    fn sentences(&self, split: Split, range: BatchRange) -> Result<Vec<&EncodedSentence>> {
        let len = self.split_len(split);
        if range.end >= len {
            return Err(SeqTagError::BatchOutOfRange {
                start: range.start,
                end: range.end,
                len,
            });
        }
        Ok(range
            .positions()
            .map(|pos| match split {
                Split::Train => &self.train[self.train_order[pos]],
                Split::Dev => &self.dev[pos],
            })
            .collect())
    }
}

fn check_tag_counts(split: &'static str, sentences: &[TaggedSentence]) -> Result<()> {
    for (index, sentence) in sentences.iter().enumerate() {
        if sentence.tokens.len() != sentence.tags.len() {
            return Err(SeqTagError::TagCountMismatch {
                split,
                index,
                tokens: sentence.tokens.len(),
                tags: sentence.tags.len(),
            });
        }
    }
    Ok(())
}

impl BatchSource for Corpus {
    fn split_len(&self, split: Split) -> usize {
        match split {
            Split::Train => self.train.len(),
            Split::Dev => self.dev.len(),
        }
    }

    fn shuffle_train(&mut self, rng: &mut Rand32) {
        // Fisher-Yates
        for i in (1..self.train_order.len()).rev() {
            let j = rng.rand_range(0..(i as u32 + 1)) as usize;
            self.train_order.swap(i, j);
        }
    }

    fn batch(
        &self,
        split: Split,
        range: BatchRange,
        hidden_dim: usize,
        device: &Device,
    ) -> Result<Batch> {
        let sentences = self.sentences(split, range)?;
        let batch_size = sentences.len();
        let lengths: Vec<usize> = sentences.iter().map(|s| s.words.len()).collect();
        let max_len = lengths.iter().copied().max().unwrap_or(0).max(1);
        let max_ngrams = sentences
            .iter()
            .flat_map(|s| s.ngrams.iter().map(Vec::len))
            .max()
            .unwrap_or(0)
            .max(1);

        let slots = batch_size * max_len;
        let mut words = vec![0u32; slots];
        let mut targets = vec![IGNORE_LABEL; slots];
        let mut ngram_ids = vec![0u32; slots * max_ngrams];
        let mut ngram_mask = vec![0f32; slots * max_ngrams];

        for (b, sentence) in sentences.iter().enumerate() {
            for (t, &word) in sentence.words.iter().enumerate() {
                let slot = b * max_len + t;
                words[slot] = word;
                targets[slot] = sentence.classes[t];
                for (g, &id) in sentence.ngrams[t].iter().enumerate() {
                    ngram_ids[slot * max_ngrams + g] = id;
                    ngram_mask[slot * max_ngrams + g] = 1.0;
                }
            }
        }

        Ok(Batch {
            inputs: Tensor::from_vec(words, (batch_size, max_len), device)?,
            char_inputs: CharInputs {
                ids: Tensor::from_vec(ngram_ids, (slots, max_ngrams), device)?,
                mask: Tensor::from_vec(ngram_mask, (slots, max_ngrams), device)?,
            },
            targets: Tensor::from_vec(targets, slots, device)?,
            token_count: lengths.iter().sum(),
            lengths,
            hidden0: HiddenState::zeros(batch_size, hidden_dim, device)?,
        })
    }
}
