use crate::distribution::CategoricalDistribution;
use candle_core::{DType, Device, Result, Tensor};
use candle_nn::{Module, Sequential, VarBuilder, VarMap};
use rand::rngs::StdRng;
use std::path::Path;

use super::build_sequential;

/// Policy and value networks sharing one varmap so a single optimizer can
/// drive a joint loss.
pub struct ActorCritic {
    distribution: CategoricalDistribution,
    value_net: Sequential,
    varmap: VarMap,
    device: Device,
}

impl ActorCritic {
    pub fn new(
        input_dim: usize,
        action_size: usize,
        policy_layers: &[usize],
        value_layers: &[usize],
        device: &Device,
    ) -> Result<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let distribution = CategoricalDistribution::build(
            input_dim,
            action_size,
            policy_layers,
            &vb,
            device,
            "policy",
        )?;
        let mut layers = value_layers.to_vec();
        layers.push(1);
        let (value_net, _) = build_sequential(input_dim, &layers, &vb, "value")?;
        Ok(Self {
            distribution,
            value_net,
            varmap,
            device: device.clone(),
        })
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    pub fn distribution(&self) -> &CategoricalDistribution {
        &self.distribution
    }

    pub fn get_actions(
        &self,
        observations: &Tensor,
        rng: &mut StdRng,
    ) -> Result<(Vec<u32>, Vec<f32>)> {
        self.distribution.get_actions(observations, rng)
    }

    pub fn log_probs(&self, observations: &Tensor, actions: &Tensor) -> Result<Tensor> {
        self.distribution.log_probs(observations, actions)
    }

    pub fn entropy(&self, observations: &Tensor) -> Result<Tensor> {
        self.distribution.entropy(observations)
    }

    /// State-value predictions, `(batch,)`.
    pub fn values(&self, observations: &Tensor) -> Result<Tensor> {
        self.value_net.forward(observations)?.squeeze(1)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.varmap.save(path)
    }
}
