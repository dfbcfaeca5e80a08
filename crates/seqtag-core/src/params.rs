//! # Parameter Store
//!
//! Every tensor the tagger learns is registered here at construction time
//! together with its weight-decay class and whether it is trainable. The
//! optimizer groups are derived from those tags, never from names.

use std::collections::HashMap;
use std::path::Path;

use candle_core::{Device, Tensor, Var};

use crate::error::{Result, SeqTagError};

/// Weight-decay class of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecayClass {
    /// Recurrent encoder weights.
    Encoder,
    /// Task-specific layers on top of the encoder.
    Mlp,
    /// Biases and embedding tables.
    NoDecay,
}

/// A named model parameter.
#[derive(Debug, Clone)]
pub struct Param {
    name: String,
    var: Var,
    class: DecayClass,
    trainable: bool,
}

impl Param {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn var(&self) -> &Var {
        &self.var
    }

    pub fn class(&self) -> DecayClass {
        self.class
    }

    /// Whether the optimizer updates this parameter (`requires_grad`).
    pub fn trainable(&self) -> bool {
        self.trainable
    }
}

/// Trainable parameters split by weight-decay class.
#[derive(Debug, Clone, Default)]
pub struct ParamPartition {
    pub encoder: Vec<Var>,
    pub mlp: Vec<Var>,
    pub no_decay: Vec<Var>,
}

impl ParamPartition {
    /// Vars of one class.
    pub fn group(&self, class: DecayClass) -> &[Var] {
        match class {
            DecayClass::Encoder => &self.encoder,
            DecayClass::Mlp => &self.mlp,
            DecayClass::NoDecay => &self.no_decay,
        }
    }

    pub fn len(&self) -> usize {
        self.encoder.len() + self.mlp.len() + self.no_decay.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Ordered collection of named parameters.
#[derive(Debug, Clone)]
pub struct ParamStore {
    params: Vec<Param>,
    device: Device,
}

impl ParamStore {
    pub fn new(device: &Device) -> Self {
        Self {
            params: Vec::new(),
            device: device.clone(),
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Register `init` under `name` and return the tensor modules should use.
    ///
    /// Trainable parameters hand out the variable itself so gradients reach
    /// it. Frozen ones hand out a detached view sharing the same storage, so
    /// later loads are still visible but no gradient is ever computed.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        init: Tensor,
        class: DecayClass,
        trainable: bool,
    ) -> Result<Tensor> {
        let name = name.into();
        if self.get(&name).is_some() {
            return Err(SeqTagError::DuplicateParam(name));
        }

        let var = Var::from_tensor(&init.to_device(&self.device)?)?;
        let handle = if trainable {
            var.as_tensor().clone()
        } else {
            var.as_tensor().detach()
        };

        self.params.push(Param {
            name,
            var,
            class,
            trainable,
        });
        Ok(handle)
    }

    pub fn get(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.name == name)
    }

    /// All parameters in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Param> {
        self.params.iter()
    }

    /// Parameters with `trainable == true`.
    pub fn trainable(&self) -> impl Iterator<Item = &Param> {
        self.params.iter().filter(|p| p.trainable)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Split trainable parameters into the three weight-decay groups.
    pub fn partition(&self) -> ParamPartition {
        let mut partition = ParamPartition::default();
        for param in self.trainable() {
            let group = match param.class {
                DecayClass::Encoder => &mut partition.encoder,
                DecayClass::Mlp => &mut partition.mlp,
                DecayClass::NoDecay => &mut partition.no_decay,
            };
            group.push(param.var.clone());
        }
        partition
    }

    /// Snapshot of every parameter by name.
    pub fn state_dict(&self) -> HashMap<String, Tensor> {
        self.params
            .iter()
            .map(|p| (p.name.clone(), p.var.as_tensor().detach()))
            .collect()
    }

    /// Copy tensors into parameters of the same name.
    ///
    /// With `strict`, `state` must hold exactly the store's parameters.
    /// Otherwise it may hold a subset; unknown names are still an error.
    pub fn load_state_dict(&self, state: &HashMap<String, Tensor>, strict: bool) -> Result<()> {
        if let Some(name) = state.keys().find(|name| self.get(name).is_none()) {
            return Err(SeqTagError::UnexpectedParam(name.clone()));
        }

        for param in &self.params {
            let Some(tensor) = state.get(&param.name) else {
                if strict {
                    return Err(SeqTagError::MissingParam(param.name.clone()));
                }
                continue;
            };
            if tensor.dims() != param.var.dims() {
                return Err(SeqTagError::ShapeMismatch {
                    name: param.name.clone(),
                    expected: param.var.dims().to_vec(),
                    found: tensor.dims().to_vec(),
                });
            }
            let tensor = tensor
                .to_dtype(param.var.dtype())?
                .to_device(&self.device)?;
            param.var.set(&tensor)?;
        }
        Ok(())
    }

    /// Write every parameter to a safetensors file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        candle_core::safetensors::save(&self.state_dict(), path)?;
        Ok(())
    }

    /// Write the named parameters only.
    pub fn save_subset<P: AsRef<Path>>(&self, names: &[&str], path: P) -> Result<()> {
        let mut state = HashMap::new();
        for &name in names {
            let param = self
                .get(name)
                .ok_or_else(|| SeqTagError::MissingParam(name.to_string()))?;
            state.insert(name.to_string(), param.var.as_tensor().detach());
        }
        candle_core::safetensors::save(&state, path)?;
        Ok(())
    }

    /// Restore a checkpoint written by [`ParamStore::save`].
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let state = candle_core::safetensors::load(path, &self.device)?;
        self.load_state_dict(&state, true)
    }

    /// Restore the parameters present in a file, leaving the others alone.
    pub fn load_subset<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let state = candle_core::safetensors::load(path, &self.device)?;
        self.load_state_dict(&state, false)
    }
}
