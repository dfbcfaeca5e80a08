//! Training configuration.
//!
//! Values are layered: built-in defaults, then an optional JSON file, then
//! flags given on the command line.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};
use clap::Args;
use serde::{Deserialize, Serialize};

/// Immutable hyperparameters and file locations for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainConfig {
    /// Size of word embeddings
    pub embed_dim: usize,
    /// Size of char n-gram embeddings
    pub char_dim: usize,
    /// Size of the encoder hidden state (per direction)
    pub hidden_dim: usize,
    /// Mini-batch size
    pub batch_size: usize,
    /// Initial learning rate
    pub lr: f64,
    /// Learning rate decay per epoch
    pub lr_decay: f64,
    /// Weight decay for encoder weights
    pub lstm_weight_decay: f64,
    /// Weight decay for MLP weights
    pub mlp_weight_decay: f64,
    /// Maximum number of training epochs
    pub max_epoch: usize,
    /// Random seed
    pub seed: u64,
    /// GPU ordinal
    pub gpu_id: usize,
    /// Never try the GPU
    pub cpu: bool,
    /// Dropout rate for input vectors
    pub input_dropout: f32,
    /// Dropout rate for output vectors
    pub output_dropout: f32,
    /// Gradient clipping threshold (global L2 norm)
    pub grad_clip: f64,
    /// Skip pretrained embeddings
    pub random_init: bool,
    /// Evaluate the saved checkpoint on dev data instead of training
    pub test: bool,
    /// Training batches between dev evaluations; `None` means a twentieth of
    /// the training batches per epoch
    pub eval_every: Option<usize>,
    /// Keep embedding tables fixed
    pub freeze_embeddings: bool,
    pub train_file: PathBuf,
    pub dev_file: PathBuf,
    pub word_embedding_file: PathBuf,
    pub char_embedding_file: PathBuf,
    /// Directory for the checkpoint and embedding caches
    pub output_dir: PathBuf,
    /// Suffix of persisted files; defaults to the GPU id
    pub run_id: Option<String>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            embed_dim: 100,
            char_dim: 100,
            hidden_dim: 100,
            batch_size: 32,
            lr: 1.0,
            lr_decay: 0.3,
            lstm_weight_decay: 1.0e-6,
            mlp_weight_decay: 1.0e-5,
            max_epoch: 20,
            seed: 1,
            gpu_id: 0,
            cpu: false,
            input_dropout: 0.2,
            output_dropout: 0.2,
            grad_clip: 1.0,
            random_init: false,
            test: false,
            eval_every: None,
            freeze_embeddings: false,
            train_file: PathBuf::from("../dataset/pos/pos_wsj.sample.train"),
            dev_file: PathBuf::from("../dataset/pos/pos_wsj.sample.dev"),
            word_embedding_file: PathBuf::from("../embedding/word.txt"),
            char_embedding_file: PathBuf::from("../embedding/charNgram.txt"),
            output_dir: PathBuf::from("."),
            run_id: None,
        }
    }
}

impl TrainConfig {
    /// Read a JSON config file; missing fields take their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }

    /// Defaults, overlaid with `file` if given, overlaid with `overrides`.
    pub fn resolve(file: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        let mut config = match file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        overrides.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Check ranges of every hyperparameter.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.batch_size >= 1, "batch size must be at least 1");
        ensure!(self.max_epoch >= 1, "max epoch must be at least 1");
        ensure!(
            self.embed_dim >= 1 && self.char_dim >= 1 && self.hidden_dim >= 1,
            "embedding and hidden sizes must be at least 1"
        );
        ensure!(self.lr > 0.0, "learning rate must be positive, got {}", self.lr);
        ensure!(self.lr_decay >= 0.0, "learning rate decay must be non-negative");
        ensure!(
            self.lstm_weight_decay >= 0.0 && self.mlp_weight_decay >= 0.0,
            "weight decay must be non-negative"
        );
        ensure!(
            (0.0..1.0).contains(&self.input_dropout) && (0.0..1.0).contains(&self.output_dropout),
            "dropout rates must be in [0, 1)"
        );
        ensure!(self.grad_clip > 0.0, "gradient clip must be positive");
        Ok(())
    }

    pub fn batch_size(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.batch_size).unwrap_or(NonZeroUsize::MIN)
    }

    /// Identifier used in persisted file names.
    pub fn run_id(&self) -> String {
        self.run_id.clone().unwrap_or_else(|| self.gpu_id.to_string())
    }
}

/// Command-line flags; anything left unset keeps the file/default value.
#[derive(Debug, Clone, Default, Args)]
pub struct ConfigOverrides {
    /// Size of word embeddings
    #[arg(long, alias = "embedDim")]
    pub embed_dim: Option<usize>,
    /// Size of char embeddings
    #[arg(long, alias = "charDim")]
    pub char_dim: Option<usize>,
    /// Size of hidden layers
    #[arg(long, alias = "hiddenDim")]
    pub hidden_dim: Option<usize>,
    /// Mini-batch size
    #[arg(long, alias = "batchSize")]
    pub batch_size: Option<usize>,
    /// Initial learning rate
    #[arg(long)]
    pub lr: Option<f64>,
    /// Learning rate decay per epoch
    #[arg(long, alias = "lrDecay")]
    pub lr_decay: Option<f64>,
    /// Weight decay for LSTM weights
    #[arg(long, alias = "lstmWeightDecay")]
    pub lstm_weight_decay: Option<f64>,
    /// Weight decay for MLP weights
    #[arg(long, alias = "mlpWeightDecay")]
    pub mlp_weight_decay: Option<f64>,
    /// Maximum number of training epochs
    #[arg(long, alias = "epoch")]
    pub max_epoch: Option<usize>,
    /// Random seed
    #[arg(long)]
    pub seed: Option<u64>,
    /// GPU id
    #[arg(long, alias = "gpuId")]
    pub gpu_id: Option<usize>,
    /// Run on the CPU even if a GPU is available
    #[arg(long)]
    pub cpu: bool,
    /// Dropout rate for input vectors
    #[arg(long, alias = "inputDropout")]
    pub input_dropout: Option<f32>,
    /// Dropout rate for output vectors
    #[arg(long, alias = "outputDropout")]
    pub output_dropout: Option<f32>,
    /// Gradient clipping value
    #[arg(long, alias = "clip")]
    pub grad_clip: Option<f64>,
    /// Use randomly initialized embeddings
    #[arg(long, alias = "random")]
    pub random_init: bool,
    /// Evaluate the saved checkpoint instead of training
    #[arg(long)]
    pub test: bool,
    /// Training batches between dev evaluations
    #[arg(long)]
    pub eval_every: Option<usize>,
    /// Keep embedding tables fixed during training
    #[arg(long)]
    pub freeze_embeddings: bool,
    /// Training corpus
    #[arg(long, env = "SEQTAG_TRAIN_FILE")]
    pub train_file: Option<PathBuf>,
    /// Dev corpus
    #[arg(long, env = "SEQTAG_DEV_FILE")]
    pub dev_file: Option<PathBuf>,
    /// Pretrained word vectors
    #[arg(long)]
    pub word_embedding_file: Option<PathBuf>,
    /// Pretrained char n-gram vectors
    #[arg(long)]
    pub char_embedding_file: Option<PathBuf>,
    /// Directory for checkpoint and embedding caches
    #[arg(short, long, env = "SEQTAG_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,
    /// Suffix of persisted files (defaults to the GPU id)
    #[arg(long)]
    pub run_id: Option<String>,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut TrainConfig) {
        fn set<T: Clone>(slot: &mut T, value: &Option<T>) {
            if let Some(value) = value {
                *slot = value.clone();
            }
        }

        set(&mut config.embed_dim, &self.embed_dim);
        set(&mut config.char_dim, &self.char_dim);
        set(&mut config.hidden_dim, &self.hidden_dim);
        set(&mut config.batch_size, &self.batch_size);
        set(&mut config.lr, &self.lr);
        set(&mut config.lr_decay, &self.lr_decay);
        set(&mut config.lstm_weight_decay, &self.lstm_weight_decay);
        set(&mut config.mlp_weight_decay, &self.mlp_weight_decay);
        set(&mut config.max_epoch, &self.max_epoch);
        set(&mut config.seed, &self.seed);
        set(&mut config.gpu_id, &self.gpu_id);
        set(&mut config.input_dropout, &self.input_dropout);
        set(&mut config.output_dropout, &self.output_dropout);
        set(&mut config.grad_clip, &self.grad_clip);
        set(&mut config.train_file, &self.train_file);
        set(&mut config.dev_file, &self.dev_file);
        set(&mut config.word_embedding_file, &self.word_embedding_file);
        set(&mut config.char_embedding_file, &self.char_embedding_file);
        set(&mut config.output_dir, &self.output_dir);

        if self.eval_every.is_some() {
            config.eval_every = self.eval_every;
        }
        if self.run_id.is_some() {
            config.run_id = self.run_id.clone();
        }

        config.cpu |= self.cpu;
        config.random_init |= self.random_init;
        config.test |= self.test;
        config.freeze_embeddings |= self.freeze_embeddings;
    }
}
