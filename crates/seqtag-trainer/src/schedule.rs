//! Learning-rate decay and the within-epoch evaluation trigger.

use std::num::NonZeroUsize;

/// `initial / (1 + decay * epoch_index)`, with `epoch_index` counted from 0.
pub fn learning_rate(initial: f64, decay: f64, epoch_index: usize) -> f64 {
    initial / (1.0 + decay * epoch_index as f64)
}

/// Counts processed training batches and fires every `every` of them.
///
/// The count restarts at each epoch and after each firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalTrigger {
    every: Option<NonZeroUsize>,
    processed: usize,
}

impl EvalTrigger {
    /// `every` defaults to a twentieth of `train_batches` (rounded down).
    /// A period of zero never fires.
    pub fn new(every: Option<usize>, train_batches: usize) -> Self {
        let every = every.unwrap_or(train_batches / 20);
        Self {
            every: NonZeroUsize::new(every),
            processed: 0,
        }
    }

    pub fn period(&self) -> Option<NonZeroUsize> {
        self.every
    }

    /// Start of an epoch.
    pub fn reset(&mut self) {
        self.processed = 0;
    }

    /// Record one processed batch; true when an evaluation is due.
    pub fn record_batch(&mut self) -> bool {
        self.processed += 1;
        match self.every {
            Some(every) if self.processed == every.get() => {
                self.processed = 0;
                true
            }
            _ => false,
        }
    }
}
