use candle_core::{D, Device, Error, Result, Tensor};
use candle_nn::ops::{log_softmax, softmax};
use candle_nn::{Module, Sequential, VarBuilder};
use rand::distr::Distribution as RandDistribution;
use rand::distr::weighted::WeightedIndex;
use rand::rngs::StdRng;

use crate::model::build_sequential;

/// Categorical action distribution over the outputs of a logits network.
pub struct CategoricalDistribution {
    action_size: usize,
    logits: Sequential,
    device: Device,
}

impl CategoricalDistribution {
    pub fn build(
        input_dim: usize,
        action_size: usize,
        hidden_layers: &[usize],
        vb: &VarBuilder,
        device: &Device,
        prefix: &str,
    ) -> Result<Self> {
        let mut layers = hidden_layers.to_vec();
        layers.push(action_size);
        let (logits, _) = build_sequential(input_dim, &layers, vb, prefix)?;
        Ok(Self {
            action_size,
            logits,
            device: device.clone(),
        })
    }

    pub fn action_size(&self) -> usize {
        self.action_size
    }

    pub fn logits(&self, observations: &Tensor) -> Result<Tensor> {
        self.logits.forward(observations)
    }

    /// Samples one action per observation row, returning the actions and
    /// their log probabilities.
    pub fn get_actions(
        &self,
        observations: &Tensor,
        rng: &mut StdRng,
    ) -> Result<(Vec<u32>, Vec<f32>)> {
        let logits = self.logits(observations)?;
        let probs: Vec<Vec<f32>> = softmax(&logits, D::Minus1)?.to_vec2()?;
        let logps: Vec<Vec<f32>> = log_softmax(&logits, D::Minus1)?.to_vec2()?;
        let mut actions = Vec::with_capacity(probs.len());
        let mut action_logps = Vec::with_capacity(probs.len());
        for (row, logp_row) in probs.iter().zip(&logps) {
            let distribution = WeightedIndex::new(row).map_err(Error::wrap)?;
            let action = distribution.sample(rng);
            actions.push(action as u32);
            action_logps.push(logp_row[action]);
        }
        Ok((actions, action_logps))
    }

    /// Log probabilities of the given actions, `(batch,)`.
    pub fn log_probs(&self, observations: &Tensor, actions: &Tensor) -> Result<Tensor> {
        let logits = self.logits(observations)?;
        let log_probs = log_softmax(&logits, D::Minus1)?;
        log_probs
            .gather(&actions.unsqueeze(1)?, D::Minus1)?
            .squeeze(1)
    }

    /// Per-row distribution entropy, `(batch,)`.
    pub fn entropy(&self, observations: &Tensor) -> Result<Tensor> {
        let logits = self.logits(observations)?;
        let log_probs = log_softmax(&logits, D::Minus1)?;
        let probs = softmax(&logits, D::Minus1)?;
        probs.mul(&log_probs)?.sum(D::Minus1)?.neg()
    }

    pub fn device(&self) -> &Device {
        &self.device
    }
}
