use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading data or running the tagger.
#[derive(Debug, Error)]
pub enum SeqTagError {
    /// Reading a corpus, embedding or checkpoint file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A tensor operation in candle failed.
    #[error("tensor error: {0}")]
    Candle(#[from] candle_core::Error),

    /// A line of a corpus or embedding file could not be understood.
    #[error("{}:{line}: {reason}", path.display())]
    MalformedLine {
        /// File the line came from.
        path: PathBuf,
        /// 1-based line number.
        line: usize,
        /// What was wrong with it.
        reason: String,
    },

    /// The training split contains no sentences.
    #[error("training corpus is empty")]
    EmptyCorpus,

    /// A sentence does not carry exactly one tag per token.
    #[error("{split} sentence {index} has {tokens} tokens but {tags} tags")]
    TagCountMismatch {
        /// `"train"` or `"dev"`.
        split: &'static str,
        /// Position of the sentence in its split, before empty ones are dropped.
        index: usize,
        /// Number of tokens.
        tokens: usize,
        /// Number of tags.
        tags: usize,
    },

    /// A batch range points past the end of its split.
    #[error("batch {start}..={end} is out of range for a split of {len} sentences")]
    BatchOutOfRange {
        /// First requested position.
        start: usize,
        /// Last requested position.
        end: usize,
        /// Number of sentences in the split.
        len: usize,
    },

    /// Two parameters were registered under the same name.
    #[error("parameter registered twice: {0}")]
    DuplicateParam(String),

    /// A parameter expected by the model is absent from a state dict.
    #[error("missing parameter in state: {0}")]
    MissingParam(String),

    /// A state dict names a parameter the model does not have.
    #[error("unexpected parameter in state: {0}")]
    UnexpectedParam(String),

    /// A stored tensor does not fit the parameter it is loaded into.
    #[error("shape mismatch for {name}: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        /// Parameter name.
        name: String,
        /// Shape of the parameter in the model.
        expected: Vec<usize>,
        /// Shape of the stored tensor.
        found: Vec<usize>,
    },

    /// A pretrained vector has a different width than the embedding table.
    #[error("{}:{line}: expected {expected} dimensions, found {found}", path.display())]
    EmbeddingDim {
        /// Embedding file.
        path: PathBuf,
        /// 1-based line number.
        line: usize,
        /// Width of the embedding table.
        expected: usize,
        /// Number of values on the line.
        found: usize,
    },
}

/// Result type alias for seqtag operations.
pub type Result<T> = std::result::Result<T, SeqTagError>;
