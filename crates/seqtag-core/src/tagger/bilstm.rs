//! BiLSTM tagger over word and char n-gram embeddings.

use candle_core::{IndexOp, Tensor};
use candle_nn::{Embedding, Linear, Module};
use oorandom::Rand32;

use super::lstm::LstmDirection;
use super::{Mode, Tagger, uniform};
use crate::corpus::{CharInputs, HiddenState};
use crate::error::Result;
use crate::params::{DecayClass, ParamStore};

/// Model dimensions and regularization.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggerConfig {
    pub vocab_size: usize,
    pub char_vocab_size: usize,
    pub embed_dim: usize,
    pub char_dim: usize,
    pub hidden_dim: usize,
    pub num_classes: usize,
    /// Dropout on the concatenated embeddings.
    pub input_dropout: f32,
    /// Dropout on the encoder outputs.
    pub output_dropout: f32,
    /// Keep both embedding tables fixed during training.
    pub freeze_embeddings: bool,
}

/// Word + char n-gram embeddings → BiLSTM → ReLU layer → class scores.
pub struct BiLstmTagger {
    config: TaggerConfig,
    params: ParamStore,
    word_embedding: Embedding,
    char_embedding: Embedding,
    forward_lstm: LstmDirection,
    backward_lstm: LstmDirection,
    hidden: Linear,
    output: Linear,
}

impl BiLstmTagger {
    /// Name of the word embedding table in the parameter store.
    pub const WORD_EMBEDDING: &'static str = "embedding.weight";
    /// Name of the char n-gram embedding table in the parameter store.
    pub const CHAR_EMBEDDING: &'static str = "char_embedding.weight";

    /// Build the model with parameters drawn from `rng` on `store`'s device.
    pub fn new(config: TaggerConfig, mut params: ParamStore, rng: &mut Rand32) -> Result<Self> {
        let device = params.device().clone();
        let trainable_embeddings = !config.freeze_embeddings;

        let word_table = params.register(
            Self::WORD_EMBEDDING,
            uniform((config.vocab_size, config.embed_dim), 0.1, rng, &device)?,
            DecayClass::NoDecay,
            trainable_embeddings,
        )?;
        let char_table = params.register(
            Self::CHAR_EMBEDDING,
            uniform((config.char_vocab_size, config.char_dim), 0.1, rng, &device)?,
            DecayClass::NoDecay,
            trainable_embeddings,
        )?;

        let in_dim = config.embed_dim + config.char_dim;
        let forward_lstm = LstmDirection::new(
            &mut params,
            "encoder.forward",
            in_dim,
            config.hidden_dim,
            false,
            rng,
        )?;
        let backward_lstm = LstmDirection::new(
            &mut params,
            "encoder.backward",
            in_dim,
            config.hidden_dim,
            true,
            rng,
        )?;

        let hidden = linear(
            &mut params,
            "mlp.hidden",
            2 * config.hidden_dim,
            config.hidden_dim,
            rng,
        )?;
        let output = linear(
            &mut params,
            "mlp.output",
            config.hidden_dim,
            config.num_classes,
            rng,
        )?;

        Ok(Self {
            word_embedding: Embedding::new(word_table, config.embed_dim),
            char_embedding: Embedding::new(char_table, config.char_dim),
            config,
            params,
            forward_lstm,
            backward_lstm,
            hidden,
            output,
        })
    }

    pub fn config(&self) -> &TaggerConfig {
        &self.config
    }
}

fn linear(
    params: &mut ParamStore,
    prefix: &str,
    in_dim: usize,
    out_dim: usize,
    rng: &mut Rand32,
) -> Result<Linear> {
    let device = params.device().clone();
    let bound = 1.0 / (in_dim as f32).sqrt();
    let weight = params.register(
        format!("{prefix}.weight"),
        uniform((out_dim, in_dim), bound, rng, &device)?,
        DecayClass::Mlp,
        true,
    )?;
    let bias = params.register(
        format!("{prefix}.bias"),
        uniform(out_dim, bound, rng, &device)?,
        DecayClass::NoDecay,
        true,
    )?;
    Ok(Linear::new(weight, Some(bias)))
}

fn dropout(xs: &Tensor, rate: f32, mode: Mode) -> Result<Tensor> {
    if mode.is_train() && rate > 0.0 {
        Ok(candle_nn::ops::dropout(xs, rate)?)
    } else {
        Ok(xs.clone())
    }
}

impl Tagger for BiLstmTagger {
    fn embed(&self, inputs: &Tensor, char_inputs: &CharInputs) -> Result<Tensor> {
        let (batch, max_len) = inputs.dims2()?;
        let words = self.word_embedding.forward(inputs)?;

        // Mean over the real n-grams of every token slot.
        let vectors = self.char_embedding.forward(&char_inputs.ids)?;
        let mask = char_inputs.mask.unsqueeze(2)?;
        let summed = vectors.broadcast_mul(&mask)?.sum(1)?;
        let counts = char_inputs.mask.sum_keepdim(1)?.maximum(1f32)?;
        let chars = summed
            .broadcast_div(&counts)?
            .reshape((batch, max_len, self.config.char_dim))?;

        Ok(Tensor::cat(&[&words, &chars], 2)?)
    }

    fn forward(
        &self,
        embedded: &Tensor,
        lengths: &[usize],
        hidden0: &HiddenState,
        mode: Mode,
    ) -> Result<Tensor> {
        let (batch, max_len, _) = embedded.dims3()?;
        let xs = dropout(embedded, self.config.input_dropout, mode)?;

        let forward = self
            .forward_lstm
            .forward(&xs, lengths, &hidden0.h.i(0)?, &hidden0.c.i(0)?)?;
        let backward = self
            .backward_lstm
            .forward(&xs, lengths, &hidden0.h.i(1)?, &hidden0.c.i(1)?)?;
        let encoded = Tensor::cat(&[&forward, &backward], 2)?;
        let encoded = dropout(&encoded, self.config.output_dropout, mode)?;

        let flat = encoded.reshape((batch * max_len, 2 * self.config.hidden_dim))?;
        let hidden = self.hidden.forward(&flat)?.relu()?;
        Ok(self.output.forward(&hidden)?)
    }

    fn params(&self) -> &ParamStore {
        &self.params
    }
}
