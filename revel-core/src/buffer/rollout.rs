use candle_core::{Device, Result, Tensor};

/// On-policy experience for a single environment: one rollout of
/// transitions plus the bootstrap state pushed at the end.
#[derive(Debug, Default)]
pub struct RolloutBuffer {
    pub states: Vec<Tensor>,
    pub actions: Vec<u32>,
    pub rewards: Vec<f32>,
    pub dones: Vec<bool>,
    pub logps: Vec<f32>,
    pub values: Vec<f32>,
    pub advantages: Option<Vec<f32>>,
    pub returns: Option<Vec<f32>>,
}

impl RolloutBuffer {
    pub fn push_step(&mut self, state: Tensor, action: u32, reward: f32, done: bool, logp: f32) {
        self.states.push(state);
        self.actions.push(action);
        self.rewards.push(reward);
        self.dones.push(done);
        self.logps.push(logp);
    }

    pub fn push_state(&mut self, state: Tensor) {
        self.states.push(state);
    }

    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    /// Generalized advantage estimation. `values` holds one value
    /// prediction per pushed state, including the bootstrap state.
    pub fn calculate_advantages_and_returns(&mut self, values: Vec<f32>, gamma: f32, lambda: f32) {
        let total_steps = self.rewards.len();
        assert_eq!(values.len(), total_steps + 1);
        let mut advantages: Vec<f32> = vec![0.; total_steps];
        let mut returns: Vec<f32> = vec![0.; total_steps];
        let mut last_gae_lam: f32 = 0.;
        for i in (0..total_steps).rev() {
            let next_non_terminal = if self.dones[i] {
                last_gae_lam = 0.;
                0.
            } else {
                1.
            };
            let delta = self.rewards[i] + next_non_terminal * gamma * values[i + 1] - values[i];
            last_gae_lam = delta + next_non_terminal * gamma * lambda * last_gae_lam;
            advantages[i] = last_gae_lam;
            returns[i] = last_gae_lam + values[i];
        }
        self.values = values;
        self.advantages = Some(advantages);
        self.returns = Some(returns);
    }
}

/// A minibatch of on-policy experience stacked into tensors.
pub struct RolloutBatch {
    pub observations: Tensor,
    pub actions: Tensor,
    pub returns: Tensor,
    pub advantages: Tensor,
    pub values: Tensor,
    pub logp_old: Tensor,
}

/// Stacks the sampled `(rollout, step)` pairs into a [`RolloutBatch`].
/// Requires advantages and returns to be calculated on every rollout.
pub fn gather_batch(
    rollouts: &[RolloutBuffer],
    indices: &[(usize, usize)],
    device: &Device,
) -> Result<RolloutBatch> {
    let mut states = Vec::with_capacity(indices.len());
    let mut actions = Vec::with_capacity(indices.len());
    let mut returns = Vec::with_capacity(indices.len());
    let mut advantages = Vec::with_capacity(indices.len());
    let mut values = Vec::with_capacity(indices.len());
    let mut logps = Vec::with_capacity(indices.len());
    for &(rollout_idx, step) in indices {
        let rollout = &rollouts[rollout_idx];
        states.push(rollout.states[step].clone());
        actions.push(rollout.actions[step]);
        returns.push(rollout.returns.as_ref().expect("returns not calculated")[step]);
        advantages.push(rollout.advantages.as_ref().expect("advantages not calculated")[step]);
        values.push(rollout.values[step]);
        logps.push(rollout.logps[step]);
    }
    let len = indices.len();
    Ok(RolloutBatch {
        observations: Tensor::stack(&states, 0)?,
        actions: Tensor::from_vec(actions, len, device)?,
        returns: Tensor::from_vec(returns, len, device)?,
        advantages: Tensor::from_vec(advantages, len, device)?,
        values: Tensor::from_vec(values, len, device)?,
        logp_old: Tensor::from_vec(logps, len, device)?,
    })
}
