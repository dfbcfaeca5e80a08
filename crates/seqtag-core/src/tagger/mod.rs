//! # Sequence Tagger
//!
//! The [`Tagger`] trait is the seam between the training loop and the model:
//! embedding lookup, a forward pass producing per-token class scores, and
//! access to the named parameters for optimization and checkpointing.
//! Train/eval behavior is chosen per call through [`Mode`].

mod bilstm;
mod lstm;

use candle_core::{Device, Shape, Tensor};
use oorandom::Rand32;

use crate::corpus::{CharInputs, HiddenState};
use crate::error::Result;
use crate::params::ParamStore;

pub use bilstm::{BiLstmTagger, TaggerConfig};
pub use lstm::LstmDirection;

/// Whether a forward pass is part of training (dropout active) or evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Train,
    Eval,
}

impl Mode {
    pub fn is_train(self) -> bool {
        self == Mode::Train
    }
}

/// A trainable sequence model.
pub trait Tagger {
    /// Look up and combine word and char embeddings: `[batch, max_len, dim]`.
    fn embed(&self, inputs: &Tensor, char_inputs: &CharInputs) -> Result<Tensor>;

    /// Per-token class scores, `[batch * max_len, num_classes]`, in the same
    /// slot order as the batch targets.
    fn forward(
        &self,
        embedded: &Tensor,
        lengths: &[usize],
        hidden0: &HiddenState,
        mode: Mode,
    ) -> Result<Tensor>;

    /// Named parameters, for optimization and checkpointing.
    fn params(&self) -> &ParamStore;
}

/// Tensor of `shape` with entries drawn uniformly from `[-bound, bound)`.
pub(crate) fn uniform<S: Into<Shape>>(
    shape: S,
    bound: f32,
    rng: &mut Rand32,
    device: &Device,
) -> Result<Tensor> {
    let shape = shape.into();
    let values: Vec<f32> = (0..shape.elem_count())
        .map(|_| (rng.rand_float() * 2.0 - 1.0) * bound)
        .collect();
    Ok(Tensor::from_vec(values, shape, device)?)
}
