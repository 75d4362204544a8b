use crate::buffer::rollout::RolloutBuffer;
use crate::env::vec_env::{EpisodeRecord, VecEnv};
use crate::model::ActorCritic;
use candle_core::{Device, Result, Tensor};
use rand::{SeedableRng, rngs::StdRng};

/// On-policy roller: collects a fixed number of steps per environment
/// into one rollout buffer each, sampling actions from the live policy.
pub struct StepRoller {
    vec_env: VecEnv,
    number_of_steps: usize,
    device: Device,
    rng: StdRng,
}

impl StepRoller {
    pub fn new(vec_env: VecEnv, number_of_steps: usize, device: &Device, seed: u64) -> Self {
        Self {
            vec_env,
            number_of_steps,
            device: device.clone(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn num_envs(&self) -> usize {
        self.vec_env.num_envs()
    }

    pub fn number_of_steps(&self) -> usize {
        self.number_of_steps
    }

    pub fn take_finished_episodes(&mut self) -> Vec<EpisodeRecord> {
        self.vec_env.take_finished_episodes()
    }

    pub fn rollout(&mut self, model: &ActorCritic) -> Result<Vec<RolloutBuffer>> {
        let num_envs = self.vec_env.num_envs();
        let mut buffers: Vec<RolloutBuffer> = (0..num_envs).map(|_| RolloutBuffer::default()).collect();
        for _ in 0..self.number_of_steps {
            let states: Result<Vec<Tensor>> = self
                .vec_env
                .observations()
                .iter()
                .map(|observation| observation.to_flat_tensor(&self.device))
                .collect();
            let states = states?;
            let observations = Tensor::stack(&states, 0)?;
            let (actions, logps) = model.get_actions(&observations, &mut self.rng)?;
            let action_indices: Vec<usize> = actions.iter().map(|&a| a as usize).collect();
            let steps = self.vec_env.step(&action_indices);
            for (env, step) in steps.iter().enumerate() {
                buffers[env].push_step(
                    states[env].clone(),
                    actions[env],
                    step.reward,
                    step.done,
                    logps[env],
                );
            }
        }
        for (env, buffer) in buffers.iter_mut().enumerate() {
            buffer.push_state(self.vec_env.observations()[env].to_flat_tensor(&self.device)?);
        }
        Ok(buffers)
    }
}
