use std::io::Write;
use std::path::Path;

use candle_core::{DType, Device, Tensor};
use candle_nn::{Embedding, Module};
use seqtag_core::{
    BatchRange, CharInputs, Corpus, DecayClass, HiddenState, Mode, ParamStore, Tagger,
    TaggedSentence,
};
use seqtag_trainer::{BestCheckpoint, TrainConfig, Trainer, learning_rate, run_training};

/// Scores every token from a learned `[vocab, classes]` table.
struct UnigramTagger {
    params: ParamStore,
    table: Embedding,
}

impl UnigramTagger {
    fn new(vocab: usize, classes: usize) -> Self {
        let mut params = ParamStore::new(&Device::Cpu);
        let table = params
            .register(
                "table",
                Tensor::zeros((vocab, classes), DType::F32, &Device::Cpu).unwrap(),
                DecayClass::Mlp,
                true,
            )
            .unwrap();
        Self {
            params,
            table: Embedding::new(table, classes),
        }
    }

    fn for_corpus(corpus: &Corpus) -> Self {
        Self::new(corpus.word_vocab().size(), corpus.class_vocab().size())
    }

    /// Make `word` predict `class`.
    fn prefer(&self, word: u32, class: u32) {
        let var = self.params.get("table").unwrap().var();
        let mut rows: Vec<Vec<f32>> = var.to_vec2().unwrap();
        rows[word as usize][class as usize] = 1.0;
        let flat: Vec<f32> = rows.iter().flatten().copied().collect();
        var.set(&Tensor::from_vec(flat, var.dims(), &Device::Cpu).unwrap())
            .unwrap();
    }

    fn table(&self) -> Vec<Vec<f32>> {
        self.params.get("table").unwrap().var().to_vec2().unwrap()
    }
}

impl Tagger for UnigramTagger {
    fn embed(&self, inputs: &Tensor, _char_inputs: &CharInputs) -> seqtag_core::Result<Tensor> {
        Ok(self.table.forward(inputs)?)
    }

    fn forward(
        &self,
        embedded: &Tensor,
        _lengths: &[usize],
        _hidden0: &HiddenState,
        _mode: Mode,
    ) -> seqtag_core::Result<Tensor> {
        let (batch, max_len, classes) = embedded.dims3()?;
        Ok(embedded.reshape((batch * max_len, classes))?)
    }

    fn params(&self) -> &ParamStore {
        &self.params
    }
}

fn sentence(pairs: &[(&str, &str)]) -> TaggedSentence {
    TaggedSentence::from_pairs(pairs.iter().copied())
}

fn pos_corpus() -> Corpus {
    let train = vec![
        sentence(&[("The", "DT"), ("dog", "NN"), ("runs", "VBZ")]),
        sentence(&[("A", "DT"), ("cat", "NN")]),
        sentence(&[("The", "DT"), ("cat", "NN"), ("sleeps", "VBZ")]),
    ];
    let dev = vec![sentence(&[("the", "DT"), ("dog", "NN"), ("runs", "VBZ"), ("fast", "RB")])];
    Corpus::from_sentences(train, dev).unwrap()
}

fn cpu_config(test: bool) -> TrainConfig {
    TrainConfig {
        cpu: true,
        test,
        ..TrainConfig::default()
    }
}

/// Table that tags everything in the dev sentence right except "fast".
fn three_of_four(corpus: &Corpus) -> UnigramTagger {
    let tagger = UnigramTagger::for_corpus(corpus);
    let words = corpus.word_vocab();
    let classes = corpus.class_vocab();
    for (word, class) in [("the", "DT"), ("dog", "NN"), ("runs", "VBZ"), ("<unk>", "NN")] {
        tagger.prefer(words.get(word).unwrap(), classes.get(class).unwrap());
    }
    tagger
}

#[test]
fn test_mode_evaluates_checkpoint_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("params-0.safetensors");
    let corpus = pos_corpus();

    let trained = three_of_four(&corpus);
    BestCheckpoint::new(&path).offer(0.0, trained.params()).unwrap();

    let fresh = UnigramTagger::for_corpus(&corpus);
    let mut trainer = Trainer::new(fresh, corpus, cpu_config(true), &path, Device::Cpu).unwrap();
    let summary = trainer.run().unwrap();

    assert_eq!(summary.test_accuracy, Some(75.0));
    assert_eq!(summary.epochs_run, 1);
    assert_eq!(summary.learning_rates, vec![1.0]);
    assert_eq!(summary.train_steps, 0);
    assert!(summary.train_accuracy.is_empty());
    assert!(summary.dev_accuracy.is_empty());
    assert_eq!(summary.checkpoint_writes, 0);

    // Restored, never updated.
    assert_eq!(trainer.tagger().table(), trained.table());
}

#[test]
fn test_mode_without_checkpoint_fails() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = pos_corpus();
    let tagger = UnigramTagger::for_corpus(&corpus);
    let path = dir.path().join("params-0.safetensors");

    let mut trainer = Trainer::new(tagger, corpus, cpu_config(true), &path, Device::Cpu).unwrap();
    assert!(trainer.run().is_err());
}

#[test]
fn test_loss_is_divided_by_sentence_count() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = pos_corpus();
    let classes = corpus.class_vocab().size() as f32;
    let tagger = UnigramTagger::for_corpus(&corpus);
    let config = TrainConfig {
        batch_size: 2,
        ..cpu_config(false)
    };
    let mut trainer =
        Trainer::new(tagger, corpus, config, dir.path().join("params.safetensors"), Device::Cpu)
            .unwrap();

    assert_eq!(
        trainer.train_batches(),
        &[BatchRange::new(0, 1), BatchRange::new(2, 2)]
    );

    // Uniform scores: every token costs ln(classes). Five tokens, two sentences.
    let stats = trainer.train_step(BatchRange::new(0, 1)).unwrap();
    assert_eq!(stats.tokens, 5);
    assert!((stats.loss - 5.0 * classes.ln() / 2.0).abs() < 1e-4);
    assert!(stats.grad_norm > 0.0);
}

#[test]
fn test_small_epochs_never_evaluate_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = pos_corpus();
    let tagger = UnigramTagger::for_corpus(&corpus);
    let config = TrainConfig {
        batch_size: 1,
        max_epoch: 3,
        ..cpu_config(false)
    };
    let path = dir.path().join("params-0.safetensors");
    let mut trainer = Trainer::new(tagger, corpus, config, &path, Device::Cpu).unwrap();
    let summary = trainer.run().unwrap();

    assert_eq!(summary.train_steps, 9);
    assert!(summary.dev_accuracy.is_empty());
    assert_eq!(summary.best_dev_accuracy, None);
    assert!(!path.exists());
}

#[test]
fn test_training_improves_and_keeps_best() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = pos_corpus();
    let tagger = UnigramTagger::for_corpus(&corpus);
    let config = TrainConfig {
        batch_size: 1,
        max_epoch: 4,
        eval_every: Some(1),
        ..cpu_config(false)
    };
    let path = dir.path().join("params-0.safetensors");
    let mut trainer = Trainer::new(tagger, corpus, config, &path, Device::Cpu).unwrap();
    let summary = trainer.run().unwrap();

    assert_eq!(summary.epochs_run, 4);
    assert_eq!(summary.train_steps, 12);
    assert_eq!(summary.dev_accuracy.len(), 12);
    assert_eq!(summary.train_accuracy.len(), 4);
    let expected: Vec<f64> = (0..4).map(|e| learning_rate(1.0, 0.3, e)).collect();
    assert_eq!(summary.learning_rates, expected);

    let max = summary.dev_accuracy.iter().copied().fold(f64::MIN, f64::max);
    assert_eq!(summary.best_dev_accuracy, Some(max));
    assert_eq!(trainer.checkpoint().best(), Some(max));
    assert_eq!(trainer.checkpoint().writes(), summary.checkpoint_writes);
    // "the", "dog" and "runs" are all seen in training.
    assert!(max >= 75.0);
    assert!(summary.checkpoint_writes >= 1);
    assert!(summary.checkpoint_writes <= summary.dev_accuracy.len());
    assert!(path.exists());
}

#[test]
fn test_eval_count_restarts_every_epoch() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = pos_corpus();
    let tagger = UnigramTagger::for_corpus(&corpus);
    let config = TrainConfig {
        batch_size: 1,
        max_epoch: 2,
        eval_every: Some(2),
        ..cpu_config(false)
    };
    let path = dir.path().join("params-0.safetensors");
    let mut trainer = Trainer::new(tagger, corpus, config, &path, Device::Cpu).unwrap();
    let summary = trainer.run().unwrap();

    // Three batches per epoch: one evaluation after the second batch of each
    // epoch. A count carried across epochs would fire three times.
    assert_eq!(summary.train_steps, 6);
    assert_eq!(summary.dev_accuracy.len(), 2);
}

fn write_corpus(path: &Path, sentences: &[&[(&str, &str)]]) {
    let mut file = std::fs::File::create(path).unwrap();
    writeln!(file, "# generated").unwrap();
    for sentence in sentences {
        for (token, tag) in sentence.iter() {
            writeln!(file, "{token}\t{tag}").unwrap();
        }
        writeln!(file).unwrap();
    }
}

#[test]
fn test_bilstm_run_then_test_mode() {
    let dir = tempfile::tempdir().unwrap();
    let train = dir.path().join("train.tsv");
    let dev = dir.path().join("dev.tsv");
    write_corpus(
        &train,
        &[
            &[("The", "DT"), ("dog", "NN"), ("runs", "VBZ")],
            &[("A", "DT"), ("cat", "NN"), ("sleeps", "VBZ")],
            &[("Dogs", "NNS"), ("bark", "VBP")],
        ],
    );
    write_corpus(&dev, &[&[("The", "DT"), ("cat", "NN"), ("runs", "VBZ")]]);

    let config = TrainConfig {
        embed_dim: 8,
        char_dim: 6,
        hidden_dim: 5,
        batch_size: 2,
        max_epoch: 2,
        eval_every: Some(1),
        train_file: train,
        dev_file: dev,
        word_embedding_file: dir.path().join("missing-word.txt"),
        char_embedding_file: dir.path().join("missing-char.txt"),
        output_dir: dir.path().join("out"),
        ..cpu_config(false)
    };

    let summary = run_training(config.clone()).unwrap();
    assert_eq!(summary.epochs_run, 2);
    assert_eq!(summary.dev_accuracy.len(), 4);
    assert!(summary.checkpoint_writes >= 1);
    assert!(dir.path().join("out/params-0.safetensors").exists());
    // Embedding files were missing, so nothing was cached.
    assert!(!dir.path().join("out/word_params-0.safetensors").exists());

    let evaluated = run_training(TrainConfig {
        test: true,
        ..config
    })
    .unwrap();
    assert_eq!(evaluated.test_accuracy, summary.best_dev_accuracy);
}
