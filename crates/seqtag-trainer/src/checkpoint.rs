//! Persisted run state: the best-dev checkpoint and the embedding caches.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use seqtag_core::{ParamStore, Vocabulary, load_embeddings};
use tracing::{info, warn};

/// File locations of one run, all inside the output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunFiles {
    /// Full parameter checkpoint of the best dev accuracy so far.
    pub params: PathBuf,
    /// Word embedding table after pretrained initialization.
    pub word_params: PathBuf,
    /// Char n-gram embedding table after pretrained initialization.
    pub char_params: PathBuf,
}

impl RunFiles {
    pub fn new<P: AsRef<Path>>(output_dir: P, run_id: &str) -> Self {
        let dir = output_dir.as_ref();
        Self {
            params: dir.join(format!("params-{run_id}.safetensors")),
            word_params: dir.join(format!("word_params-{run_id}.safetensors")),
            char_params: dir.join(format!("char_params-{run_id}.safetensors")),
        }
    }
}

/// Tracks the best dev accuracy and writes a checkpoint on every strict
/// improvement.
#[derive(Debug, Clone)]
pub struct BestCheckpoint {
    path: PathBuf,
    best: Option<f64>,
    writes: usize,
}

impl BestCheckpoint {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            best: None,
            writes: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Best accuracy offered so far, if any.
    pub fn best(&self) -> Option<f64> {
        self.best
    }

    /// Number of checkpoint files written.
    pub fn writes(&self) -> usize {
        self.writes
    }

    /// Save `params` if `accuracy` beats every earlier one. Returns whether a
    /// checkpoint was written.
    pub fn offer(&mut self, accuracy: f64, params: &ParamStore) -> Result<bool> {
        if self.best.is_some_and(|best| accuracy <= best) {
            return Ok(false);
        }

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        params
            .save(&self.path)
            .with_context(|| format!("Failed to write checkpoint {}", self.path.display()))?;

        self.best = Some(accuracy);
        self.writes += 1;
        info!(accuracy, path = %self.path.display(), "Saved new best checkpoint");
        Ok(true)
    }

    /// Load the checkpoint into `params`. A missing file is an error.
    pub fn restore(&self, params: &ParamStore) -> Result<()> {
        anyhow::ensure!(
            self.path.exists(),
            "No checkpoint found at {}",
            self.path.display()
        );
        params
            .load(&self.path)
            .with_context(|| format!("Failed to load checkpoint {}", self.path.display()))?;
        info!(path = %self.path.display(), "Loaded checkpoint");
        Ok(())
    }
}

/// Where an embedding table's initial values came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingInit {
    /// Restored from the run's cache file.
    Cache,
    /// Read from the pretrained vector file, then cached.
    Pretrained { matched: usize },
    /// Neither file was found; the random initialization stays.
    Random,
}

/// Initialize table `param` from `cache` if present, else from the
/// pretrained `vectors` file (writing `cache` afterwards), else leave it
/// random with a warning.
pub fn warm_start_embeddings(
    params: &ParamStore,
    param: &str,
    vocab: &Vocabulary,
    vectors: &Path,
    cache: &Path,
) -> Result<EmbeddingInit> {
    if cache.exists() {
        params
            .load_subset(cache)
            .with_context(|| format!("Failed to load embedding cache {}", cache.display()))?;
        info!(param, cache = %cache.display(), "Loaded cached embeddings");
        return Ok(EmbeddingInit::Cache);
    }

    if !vectors.exists() {
        warn!(
            param,
            file = %vectors.display(),
            "Pretrained embeddings not found, keeping random initialization"
        );
        return Ok(EmbeddingInit::Random);
    }

    let stats = load_embeddings(params, param, vocab, vectors)
        .with_context(|| format!("Failed to read embeddings {}", vectors.display()))?;
    if let Some(dir) = cache.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    params
        .save_subset(&[param], cache)
        .with_context(|| format!("Failed to write embedding cache {}", cache.display()))?;
    info!(
        param,
        matched = stats.matched,
        vocab_size = vocab.size(),
        "Initialized embeddings from pretrained vectors"
    );
    Ok(EmbeddingInit::Pretrained {
        matched: stats.matched,
    })
}
