//! One direction of a length-aware LSTM encoder.

use candle_core::{Device, IndexOp, Tensor};
use candle_nn::{Linear, Module};
use oorandom::Rand32;

use super::uniform;
use crate::error::Result;
use crate::params::{DecayClass, ParamStore};

/// A single-layer LSTM run left-to-right or right-to-left over padded batches.
///
/// Steps past a sentence's length leave its state untouched and emit zeros,
/// which gives the same result as running every sentence unpadded.
#[derive(Debug, Clone)]
pub struct LstmDirection {
    ih: Linear,
    hh: Linear,
    hidden_dim: usize,
    reverse: bool,
}

impl LstmDirection {
    /// Register the weights under `prefix`. Weight matrices are encoder
    /// parameters; both bias vectors are exempt from weight decay.
    pub fn new(
        store: &mut ParamStore,
        prefix: &str,
        in_dim: usize,
        hidden_dim: usize,
        reverse: bool,
        rng: &mut Rand32,
    ) -> Result<Self> {
        let device = store.device().clone();
        let bound = 1.0 / (hidden_dim as f32).sqrt();
        let gates = 4 * hidden_dim;

        let w_ih = store.register(
            format!("{prefix}.weight_ih"),
            uniform((gates, in_dim), bound, rng, &device)?,
            DecayClass::Encoder,
            true,
        )?;
        let w_hh = store.register(
            format!("{prefix}.weight_hh"),
            uniform((gates, hidden_dim), bound, rng, &device)?,
            DecayClass::Encoder,
            true,
        )?;
        let b_ih = store.register(
            format!("{prefix}.bias_ih"),
            uniform(gates, bound, rng, &device)?,
            DecayClass::NoDecay,
            true,
        )?;
        let b_hh = store.register(
            format!("{prefix}.bias_hh"),
            uniform(gates, bound, rng, &device)?,
            DecayClass::NoDecay,
            true,
        )?;

        Ok(Self {
            ih: Linear::new(w_ih, Some(b_ih)),
            hh: Linear::new(w_hh, Some(b_hh)),
            hidden_dim,
            reverse,
        })
    }

    pub fn hidden_dim(&self) -> usize {
        self.hidden_dim
    }

    /// Run over `xs` (`[batch, max_len, in_dim]`) from the initial state
    /// `h0`/`c0` (`[batch, hidden_dim]`). Returns `[batch, max_len, hidden_dim]`.
    pub fn forward(
        &self,
        xs: &Tensor,
        lengths: &[usize],
        h0: &Tensor,
        c0: &Tensor,
    ) -> Result<Tensor> {
        let (_, max_len, _) = xs.dims3()?;
        let mut h = h0.clone();
        let mut c = c0.clone();
        let mut outputs: Vec<Option<Tensor>> = vec![None; max_len];

        let steps: Vec<usize> = if self.reverse {
            (0..max_len).rev().collect()
        } else {
            (0..max_len).collect()
        };

        for t in steps {
            let active = step_mask(lengths, t, xs.device())?;
            let idle = active.affine(-1.0, 1.0)?;

            let x_t = xs.i((.., t, ..))?.contiguous()?;
            let gates = (self.ih.forward(&x_t)? + self.hh.forward(&h)?)?;
            let gates = gates.chunk(4, 1)?;
            let input = candle_nn::ops::sigmoid(&gates[0])?;
            let forget = candle_nn::ops::sigmoid(&gates[1])?;
            let cell = gates[2].tanh()?;
            let output = candle_nn::ops::sigmoid(&gates[3])?;

            let c_next = ((forget * &c)? + (input * cell)?)?;
            let h_next = (output * c_next.tanh()?)?;

            c = (c_next.broadcast_mul(&active)? + c.broadcast_mul(&idle)?)?;
            h = (h_next.broadcast_mul(&active)? + h.broadcast_mul(&idle)?)?;
            outputs[t] = Some(h_next.broadcast_mul(&active)?);
        }

        let outputs: Vec<Tensor> = outputs.into_iter().flatten().collect();
        Ok(Tensor::stack(&outputs, 1)?)
    }
}

/// `[batch, 1]` with 1.0 where step `t` is inside the sentence.
fn step_mask(lengths: &[usize], t: usize, device: &Device) -> Result<Tensor> {
    let mask: Vec<f32> = lengths
        .iter()
        .map(|&len| if t < len { 1.0 } else { 0.0 })
        .collect();
    Ok(Tensor::from_vec(mask, (lengths.len(), 1), device)?)
}

#[cfg(test)]
mod tests {
    use candle_core::DType;

    use super::*;

    fn direction(reverse: bool) -> (ParamStore, LstmDirection) {
        let mut store = ParamStore::new(&Device::Cpu);
        let mut rng = Rand32::new(11);
        let lstm = LstmDirection::new(&mut store, "enc", 3, 4, reverse, &mut rng).unwrap();
        (store, lstm)
    }

    #[test]
    fn test_registers_tagged_params() {
        let (store, _) = direction(false);
        assert_eq!(store.len(), 4);
        assert_eq!(store.get("enc.weight_ih").unwrap().class(), DecayClass::Encoder);
        assert_eq!(store.get("enc.weight_hh").unwrap().class(), DecayClass::Encoder);
        assert_eq!(store.get("enc.bias_ih").unwrap().class(), DecayClass::NoDecay);
        assert_eq!(store.get("enc.bias_hh").unwrap().class(), DecayClass::NoDecay);
    }

    #[test]
    fn test_padding_steps_emit_zeros() {
        for reverse in [false, true] {
            let (_, lstm) = direction(reverse);
            let xs = Tensor::ones((2, 3, 3), DType::F32, &Device::Cpu).unwrap();
            let h0 = Tensor::zeros((2, 4), DType::F32, &Device::Cpu).unwrap();
            let out = lstm.forward(&xs, &[3, 1], &h0, &h0).unwrap();
            assert_eq!(out.dims(), &[2, 3, 4]);

            let rows: Vec<Vec<Vec<f32>>> = out.to_vec3().unwrap();
            assert!(rows[1][1].iter().all(|v| *v == 0.0));
            assert!(rows[1][2].iter().all(|v| *v == 0.0));
            assert!(rows[1][0].iter().any(|v| *v != 0.0));
        }
    }

    #[test]
    fn test_padding_does_not_change_reverse_state() {
        let (_, lstm) = direction(true);
        let padded = Tensor::ones((1, 3, 3), DType::F32, &Device::Cpu).unwrap();
        let short = Tensor::ones((1, 1, 3), DType::F32, &Device::Cpu).unwrap();
        let h0 = Tensor::zeros((1, 4), DType::F32, &Device::Cpu).unwrap();

        let a: Vec<Vec<Vec<f32>>> = lstm.forward(&padded, &[1], &h0, &h0).unwrap().to_vec3().unwrap();
        let b: Vec<Vec<Vec<f32>>> = lstm.forward(&short, &[1], &h0, &h0).unwrap().to_vec3().unwrap();
        for (x, y) in a[0][0].iter().zip(&b[0][0]) {
            assert!((x - y).abs() < 1e-6);
        }
    }
}
