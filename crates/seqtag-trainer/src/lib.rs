//! # Seqtag Trainer
//!
//! Supervised training of the BiLSTM part-of-speech tagger: configuration,
//! device selection, grouped SGD, the epoch loop with periodic dev
//! evaluation, and best-checkpoint persistence.

pub mod checkpoint;
pub mod config;
pub mod device;
pub mod optim;
pub mod schedule;
pub mod trainer;

use anyhow::{Context, Result};
use oorandom::Rand32;
use seqtag_core::{BatchSource, BiLstmTagger, Corpus, ParamStore, Split, Tagger, TaggerConfig};
use tracing::info;

pub use checkpoint::{BestCheckpoint, EmbeddingInit, RunFiles, warm_start_embeddings};
pub use config::{ConfigOverrides, TrainConfig};
pub use device::select_device;
pub use optim::{GroupedSgd, clip_grad_norm};
pub use schedule::{EvalTrigger, learning_rate};
pub use trainer::{RunSummary, StepStats, Trainer};

/// Load the corpus, build the tagger, initialize embeddings and run the loop
/// described by `config`.
pub fn run_training(config: TrainConfig) -> Result<RunSummary> {
    config.validate()?;
    info!(?config, "Configuration");

    let device = select_device(config.gpu_id, config.cpu);
    let files = RunFiles::new(&config.output_dir, &config.run_id());

    let corpus = Corpus::load(&config.train_file, &config.dev_file).with_context(|| {
        format!(
            "Failed to load corpus from {} and {}",
            config.train_file.display(),
            config.dev_file.display()
        )
    })?;
    info!(
        words = corpus.word_vocab().size(),
        char_ngrams = corpus.char_vocab().size(),
        classes = corpus.class_vocab().size(),
        "Vocabulary sizes"
    );
    info!(
        train = corpus.split_len(Split::Train),
        dev = corpus.split_len(Split::Dev),
        "Sample counts"
    );

    let tagger_config = TaggerConfig {
        vocab_size: corpus.word_vocab().size(),
        char_vocab_size: corpus.char_vocab().size(),
        embed_dim: config.embed_dim,
        char_dim: config.char_dim,
        hidden_dim: config.hidden_dim,
        num_classes: corpus.class_vocab().size(),
        input_dropout: config.input_dropout,
        output_dropout: config.output_dropout,
        freeze_embeddings: config.freeze_embeddings,
    };
    let tagger = BiLstmTagger::new(
        tagger_config,
        ParamStore::new(&device),
        &mut Rand32::new(config.seed),
    )?;

    if !config.test && !config.random_init {
        warm_start_embeddings(
            tagger.params(),
            BiLstmTagger::WORD_EMBEDDING,
            corpus.word_vocab(),
            &config.word_embedding_file,
            &files.word_params,
        )?;
        warm_start_embeddings(
            tagger.params(),
            BiLstmTagger::CHAR_EMBEDDING,
            corpus.char_vocab(),
            &config.char_embedding_file,
            &files.char_params,
        )?;
    }

    let mut trainer = Trainer::new(tagger, corpus, config, files.params, device)?;
    let summary = trainer.run()?;

    info!(
        epochs = summary.epochs_run,
        best_dev = ?summary.best_dev_accuracy,
        checkpoints = summary.checkpoint_writes,
        "Run finished"
    );
    Ok(summary)
}
