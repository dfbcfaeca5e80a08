//! Epoch loop: shuffle, mini-batch SGD, periodic dev evaluation and
//! best-checkpoint saving.

use std::path::PathBuf;

use anyhow::{Context, Result};
use candle_core::Device;
use oorandom::Rand32;
use seqtag_core::{
    Batch, BatchRange, BatchSource, Mode, Split, Tagger, accuracy_percent, build_batch_list,
    count_correct, summed_cross_entropy,
};
use tracing::{debug, info, warn};

use crate::checkpoint::BestCheckpoint;
use crate::config::TrainConfig;
use crate::optim::{GroupedSgd, clip_grad_norm};
use crate::schedule::{EvalTrigger, learning_rate};

/// Outcome of one training step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepStats {
    /// Summed loss divided by the number of sentences in the batch.
    pub loss: f32,
    /// Gradient norm before clipping.
    pub grad_norm: f64,
    pub correct: usize,
    pub tokens: usize,
}

/// What a run did, for reporting and tests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// Epochs started.
    pub epochs_run: usize,
    /// Learning rate of every started epoch.
    pub learning_rates: Vec<f64>,
    /// Training accuracy per completed epoch; `None` when it saw no tokens.
    pub train_accuracy: Vec<Option<f64>>,
    /// Every periodic dev accuracy, in order.
    pub dev_accuracy: Vec<f64>,
    pub best_dev_accuracy: Option<f64>,
    pub checkpoint_writes: usize,
    pub train_steps: usize,
    /// Set in test mode only.
    pub test_accuracy: Option<f64>,
}

/// Drives a [`Tagger`] over a [`BatchSource`].
pub struct Trainer<T: Tagger, C: BatchSource> {
    tagger: T,
    corpus: C,
    config: TrainConfig,
    optimizer: GroupedSgd,
    checkpoint: BestCheckpoint,
    eval_trigger: EvalTrigger,
    device: Device,
    rng: Rand32,
    train_batches: Vec<BatchRange>,
    dev_batches: Vec<BatchRange>,
}

impl<T: Tagger, C: BatchSource> Trainer<T, C> {
    /// Plan batches and build the optimizer over the tagger's trainable
    /// parameters. The best checkpoint is written to `checkpoint_path`.
    pub fn new(
        tagger: T,
        corpus: C,
        config: TrainConfig,
        checkpoint_path: impl Into<PathBuf>,
        device: Device,
    ) -> Result<Self> {
        config.validate()?;

        let batch_size = config.batch_size();
        let train_batches = build_batch_list(corpus.split_len(Split::Train), batch_size);
        let dev_batches = build_batch_list(corpus.split_len(Split::Dev), batch_size);

        let optimizer = GroupedSgd::new(
            tagger.params().partition(),
            config.lstm_weight_decay,
            config.mlp_weight_decay,
            config.lr,
        );
        let rng = Rand32::new(config.seed);
        let eval_trigger = EvalTrigger::new(config.eval_every, train_batches.len());

        debug!(
            train_batches = train_batches.len(),
            dev_batches = dev_batches.len(),
            trainable = optimizer.vars().count(),
            "Planned batches"
        );

        Ok(Self {
            tagger,
            corpus,
            optimizer,
            checkpoint: BestCheckpoint::new(checkpoint_path),
            eval_trigger,
            device,
            rng,
            train_batches,
            dev_batches,
            config,
        })
    }

    pub fn tagger(&self) -> &T {
        &self.tagger
    }

    pub fn checkpoint(&self) -> &BestCheckpoint {
        &self.checkpoint
    }

    pub fn train_batches(&self) -> &[BatchRange] {
        &self.train_batches
    }

    /// Run up to `max_epoch` epochs, or a single checkpoint evaluation in
    /// test mode.
    pub fn run(&mut self) -> Result<RunSummary> {
        let mut summary = RunSummary::default();

        for epoch in 0..self.config.max_epoch {
            let lr = learning_rate(self.config.lr, self.config.lr_decay, epoch);
            self.optimizer.set_learning_rate(lr);
            summary.learning_rates.push(lr);
            summary.epochs_run = epoch + 1;

            info!("--- Epoch {}", epoch + 1);
            debug!(lr, "Learning rate");

            self.corpus.shuffle_train(&mut self.rng);
            self.eval_trigger.reset();

            if self.config.test {
                self.checkpoint.restore(self.tagger.params())?;
                let accuracy = self.evaluate()?;
                report_dev(accuracy);
                summary.test_accuracy = accuracy;
                break;
            }

            let train_accuracy = self.train_epoch(&mut summary)?;
            match train_accuracy {
                Some(accuracy) => info!("Train acc.: {accuracy}"),
                None => warn!("Train acc.: n/a (no training tokens)"),
            }
            summary.train_accuracy.push(train_accuracy);
        }

        summary.best_dev_accuracy = self.checkpoint.best();
        summary.checkpoint_writes = self.checkpoint.writes();
        Ok(summary)
    }

    /// One pass over the training ordering. Returns the epoch's training
    /// accuracy.
    fn train_epoch(&mut self, summary: &mut RunSummary) -> Result<Option<f64>> {
        let mut correct = 0;
        let mut tokens = 0;

        for idx in 0..self.train_batches.len() {
            let range = self.train_batches[idx];
            let stats = self.train_step(range)?;
            correct += stats.correct;
            tokens += stats.tokens;
            summary.train_steps += 1;
            debug!(batch = idx, loss = stats.loss, grad_norm = stats.grad_norm, "Step");

            if self.eval_trigger.record_batch() {
                let accuracy = self.evaluate()?;
                report_dev(accuracy);
                if let Some(accuracy) = accuracy {
                    summary.dev_accuracy.push(accuracy);
                    self.checkpoint.offer(accuracy, self.tagger.params())?;
                }
            }
        }

        Ok(accuracy_percent(correct, tokens))
    }

    /// Forward, normalized loss, backward, clip, update.
    pub fn train_step(&mut self, range: BatchRange) -> Result<StepStats> {
        let batch = self.load_batch(Split::Train, range)?;

        let embedded = self.tagger.embed(&batch.inputs, &batch.char_inputs)?;
        let scores = self
            .tagger
            .forward(&embedded, &batch.lengths, &batch.hidden0, Mode::Train)?;

        let loss = summed_cross_entropy(&scores, &batch.targets)?;
        let loss = loss.affine(1.0 / range.len() as f64, 0.0)?;

        let mut grads = loss.backward()?;
        let grad_norm = clip_grad_norm(&mut grads, self.optimizer.vars(), self.config.grad_clip)?;
        self.optimizer.step(&grads)?;

        let correct = count_correct(&scores.detach(), &batch.targets)?;
        Ok(StepStats {
            loss: loss.to_scalar::<f32>()?,
            grad_norm,
            correct,
            tokens: batch.token_count,
        })
    }

    /// Accuracy over the whole dev split with dropout off. `None` when the
    /// split holds no tokens.
    pub fn evaluate(&self) -> Result<Option<f64>> {
        let mut correct = 0;
        let mut tokens = 0;

        for &range in &self.dev_batches {
            let batch = self.load_batch(Split::Dev, range)?;
            let embedded = self.tagger.embed(&batch.inputs, &batch.char_inputs)?;
            let scores = self
                .tagger
                .forward(&embedded, &batch.lengths, &batch.hidden0, Mode::Eval)?
                .detach();
            correct += count_correct(&scores, &batch.targets)?;
            tokens += batch.token_count;
        }

        Ok(accuracy_percent(correct, tokens))
    }

    fn load_batch(&self, split: Split, range: BatchRange) -> Result<Batch> {
        self.corpus
            .batch(split, range, self.config.hidden_dim, &self.device)
            .with_context(|| {
                format!(
                    "Failed to assemble {split:?} batch [{}, {}]",
                    range.start, range.end
                )
            })
    }
}

fn report_dev(accuracy: Option<f64>) {
    match accuracy {
        Some(accuracy) => info!("Dev acc.: {accuracy}"),
        None => warn!("Dev acc.: n/a (no dev tokens)"),
    }
}
