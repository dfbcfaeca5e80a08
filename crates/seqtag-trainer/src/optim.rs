//! Plain SGD with per-group weight decay, and global-norm gradient clipping.

use candle_core::backprop::GradStore;
use candle_core::{Result, Var};
use seqtag_core::{DecayClass, ParamPartition};

/// One optimizer group: vars sharing a weight-decay coefficient.
#[derive(Debug, Clone)]
pub struct ParamGroup {
    class: DecayClass,
    vars: Vec<Var>,
    weight_decay: f64,
}

impl ParamGroup {
    pub fn class(&self) -> DecayClass {
        self.class
    }

    pub fn vars(&self) -> &[Var] {
        &self.vars
    }

    pub fn weight_decay(&self) -> f64 {
        self.weight_decay
    }
}

/// SGD over the encoder, MLP and no-decay groups of a [`ParamPartition`].
///
/// Each step applies `w -= lr * (grad + weight_decay * w)`. Vars without a
/// gradient in the store are left untouched.
#[derive(Debug, Clone)]
pub struct GroupedSgd {
    groups: Vec<ParamGroup>,
    learning_rate: f64,
}

impl GroupedSgd {
    pub fn new(
        partition: ParamPartition,
        encoder_weight_decay: f64,
        mlp_weight_decay: f64,
        learning_rate: f64,
    ) -> Self {
        let ParamPartition {
            encoder,
            mlp,
            no_decay,
        } = partition;

        let groups = vec![
            ParamGroup {
                class: DecayClass::Encoder,
                vars: encoder,
                weight_decay: encoder_weight_decay,
            },
            ParamGroup {
                class: DecayClass::Mlp,
                vars: mlp,
                weight_decay: mlp_weight_decay,
            },
            ParamGroup {
                class: DecayClass::NoDecay,
                vars: no_decay,
                weight_decay: 0.0,
            },
        ];

        Self {
            groups,
            learning_rate,
        }
    }

    pub fn groups(&self) -> &[ParamGroup] {
        &self.groups
    }

    /// Every var the optimizer updates.
    pub fn vars(&self) -> impl Iterator<Item = &Var> + Clone {
        self.groups.iter().flat_map(|g| g.vars.iter())
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    /// Applies to all groups.
    pub fn set_learning_rate(&mut self, lr: f64) {
        self.learning_rate = lr;
    }

    pub fn step(&mut self, grads: &GradStore) -> Result<()> {
        for group in &self.groups {
            for var in &group.vars {
                let Some(grad) = grads.get(var) else {
                    continue;
                };
                let update = if group.weight_decay > 0.0 {
                    (grad + (var.as_tensor() * group.weight_decay)?)?
                } else {
                    grad.clone()
                };
                var.set(&var.sub(&(update * self.learning_rate)?)?)?;
            }
        }
        Ok(())
    }
}

/// Global L2 norm of the gradients of `vars`.
pub fn grad_norm<'a>(grads: &GradStore, vars: impl IntoIterator<Item = &'a Var>) -> Result<f64> {
    let mut total_norm_sq = 0f64;
    for var in vars {
        if let Some(grad) = grads.get(var) {
            let norm_sq: f32 = grad.sqr()?.sum_all()?.to_scalar()?;
            total_norm_sq += norm_sq as f64;
        }
    }
    Ok(total_norm_sq.sqrt())
}

/// Rescale the gradients of `vars` so their global L2 norm is at most
/// `max_norm`. Returns the norm before clipping.
pub fn clip_grad_norm<'a>(
    grads: &mut GradStore,
    vars: impl IntoIterator<Item = &'a Var> + Clone,
    max_norm: f64,
) -> Result<f64> {
    let total_norm = grad_norm(grads, vars.clone())?;

    let clip_coef = max_norm / (total_norm + 1e-6);
    if clip_coef < 1.0 {
        for var in vars {
            if let Some(grad) = grads.get(var) {
                let clipped = (grad * clip_coef)?;
                grads.insert(var, clipped);
            }
        }
    }

    Ok(total_norm)
}

#[cfg(test)]
mod tests {
    use candle_core::{Device, Tensor};

    use super::*;

    fn var(values: &[f32]) -> Var {
        Var::from_tensor(&Tensor::new(values, &Device::Cpu).unwrap()).unwrap()
    }

    fn values(var: &Var) -> Vec<f32> {
        var.as_tensor().to_vec1().unwrap()
    }

    #[test]
    fn test_step_applies_group_decay() {
        let encoder = var(&[1.0, 2.0]);
        let bias = var(&[1.0, 2.0]);
        let partition = ParamPartition {
            encoder: vec![encoder.clone()],
            mlp: Vec::new(),
            no_decay: vec![bias.clone()],
        };
        let mut sgd = GroupedSgd::new(partition, 0.5, 0.1, 0.1);

        // d/dw sum(w) == 1 for every entry.
        let loss = (encoder.as_tensor().sum_all().unwrap() + bias.as_tensor().sum_all().unwrap())
            .unwrap();
        let grads = loss.backward().unwrap();
        sgd.step(&grads).unwrap();

        // w - 0.1 * (1 + 0.5 * w)
        let e = values(&encoder);
        assert!((e[0] - 0.85).abs() < 1e-6);
        assert!((e[1] - 1.8).abs() < 1e-6);
        // w - 0.1 * 1
        let b = values(&bias);
        assert!((b[0] - 0.9).abs() < 1e-6);
        assert!((b[1] - 1.9).abs() < 1e-6);
    }

    #[test]
    fn test_group_layout() {
        let partition = ParamPartition {
            encoder: vec![var(&[0.0])],
            mlp: vec![var(&[0.0]), var(&[0.0])],
            no_decay: vec![var(&[0.0])],
        };
        let mut sgd = GroupedSgd::new(partition, 1e-6, 1e-5, 1.0);
        let decays: Vec<(DecayClass, f64)> = sgd
            .groups()
            .iter()
            .map(|g| (g.class(), g.weight_decay()))
            .collect();
        assert_eq!(
            decays,
            vec![
                (DecayClass::Encoder, 1e-6),
                (DecayClass::Mlp, 1e-5),
                (DecayClass::NoDecay, 0.0)
            ]
        );
        assert_eq!(sgd.vars().count(), 4);

        sgd.set_learning_rate(0.25);
        assert_eq!(sgd.learning_rate(), 0.25);
    }

    #[test]
    fn test_missing_grad_is_skipped() {
        let used = var(&[1.0]);
        let unused = var(&[5.0]);
        let partition = ParamPartition {
            encoder: Vec::new(),
            mlp: Vec::new(),
            no_decay: vec![used.clone(), unused.clone()],
        };
        let mut sgd = GroupedSgd::new(partition, 0.0, 0.0, 1.0);
        let grads = used.as_tensor().sum_all().unwrap().backward().unwrap();
        sgd.step(&grads).unwrap();

        assert_eq!(values(&used), vec![0.0]);
        assert_eq!(values(&unused), vec![5.0]);
    }

    #[test]
    fn test_clip_scales_to_max_norm() {
        let w = var(&[0.0, 0.0]);
        // grad == [3, 4], norm 5
        let target = Tensor::new(&[3.0f32, 4.0], &Device::Cpu).unwrap();
        let loss = (w.as_tensor() * &target).unwrap().sum_all().unwrap();
        let mut grads = loss.backward().unwrap();

        let vars = [w.clone()];
        let norm = clip_grad_norm(&mut grads, vars.iter(), 1.0).unwrap();
        assert!((norm - 5.0).abs() < 1e-6);

        let clipped = grad_norm(&grads, vars.iter()).unwrap();
        assert!((clipped - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_small_gradients_untouched() {
        let w = var(&[0.0, 0.0]);
        let target = Tensor::new(&[0.3f32, 0.4], &Device::Cpu).unwrap();
        let loss = (w.as_tensor() * &target).unwrap().sum_all().unwrap();
        let mut grads = loss.backward().unwrap();

        let vars = [w.clone()];
        clip_grad_norm(&mut grads, vars.iter(), 1.0).unwrap();
        let grad: Vec<f32> = grads.get(&w).unwrap().to_vec1().unwrap();
        assert_eq!(grad, vec![0.3, 0.4]);
    }
}
