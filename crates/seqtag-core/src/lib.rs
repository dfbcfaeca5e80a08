//! # Seqtag Core
//!
//! Building blocks for training a neural sequence tagger: corpus loading and
//! batching, pretrained embedding import, an explicitly tagged parameter
//! store, masked cross-entropy and the BiLSTM tagger itself.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::num::NonZeroUsize;
//! use seqtag_core::batch::build_batch_list;
//!
//! let ranges = build_batch_list(10, NonZeroUsize::new(3).unwrap());
//! assert_eq!(ranges.len(), 4);
//! assert_eq!((ranges[3].start, ranges[3].end), (9, 9));
//! ```
pub mod batch;
pub mod corpus;
pub mod embedding;
pub mod error;
pub mod loss;
pub mod params;
pub mod tagger;
pub mod vocab;

// Re-export primary API
pub use batch::{BatchRange, build_batch_list};
pub use corpus::{Batch, BatchSource, CharInputs, Corpus, HiddenState, Split, TaggedSentence};
pub use embedding::{EmbeddingStats, load_embeddings};
pub use error::{Result, SeqTagError};
pub use loss::{IGNORE_LABEL, accuracy_percent, count_correct, summed_cross_entropy};
pub use params::{DecayClass, Param, ParamPartition, ParamStore};
pub use tagger::{BiLstmTagger, Mode, Tagger, TaggerConfig};
pub use vocab::Vocabulary;
