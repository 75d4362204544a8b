use super::{Env, EnvDescription};
use crate::numeric::Frame;
use rand::{Rng, SeedableRng, rngs::StdRng};
use rayon::prelude::*;

/// Reward and length of a finished episode.
#[derive(Debug, Clone, Copy)]
pub struct EpisodeRecord {
    pub reward: f32,
    pub length: usize,
}

/// Outcome of stepping a single member of the vectorized environment.
/// `observation` is the next live observation, which already belongs to a
/// fresh episode when `done` is set.
pub struct VecStep {
    pub reward: f32,
    pub done: bool,
}

/// Steps a set of identical environments in lockstep and auto-resets the
/// finished ones, keeping per-episode statistics around for reporting.
pub struct VecEnv {
    envs: Vec<Box<dyn Env>>,
    observations: Vec<Frame>,
    episode_rewards: Vec<f32>,
    episode_lengths: Vec<usize>,
    finished: Vec<EpisodeRecord>,
    rng: StdRng,
}

impl VecEnv {
    pub fn new(mut envs: Vec<Box<dyn Env>>, seed: u64) -> Self {
        assert!(!envs.is_empty(), "a vec env needs at least one environment");
        let mut rng = StdRng::seed_from_u64(seed);
        let observations = envs
            .iter_mut()
            .map(|env| env.reset(rng.random()))
            .collect();
        let num_envs = envs.len();
        Self {
            envs,
            observations,
            episode_rewards: vec![0.; num_envs],
            episode_lengths: vec![0; num_envs],
            finished: vec![],
            rng,
        }
    }

    pub fn num_envs(&self) -> usize {
        self.envs.len()
    }

    pub fn description(&self) -> EnvDescription {
        self.envs[0].description()
    }

    /// Live observations, one frame per environment.
    pub fn observations(&self) -> &[Frame] {
        &self.observations
    }

    /// Steps every environment with its action and returns the per-env
    /// outcomes. Environments that terminate or truncate are reset in
    /// place and their episode is recorded.
    pub fn step(&mut self, actions: &[usize]) -> Vec<VecStep> {
        assert_eq!(actions.len(), self.envs.len());
        let seeds: Vec<u64> = (0..self.envs.len()).map(|_| self.rng.random()).collect();
        let outcomes: Vec<(Frame, f32, bool)> = self
            .envs
            .par_iter_mut()
            .zip(actions.par_iter())
            .zip(seeds.par_iter())
            .map(|((env, action), seed)| {
                let step = env.step(*action);
                let done = step.terminated || step.truncated;
                let observation = if done { env.reset(*seed) } else { step.observation };
                (observation, step.reward, done)
            })
            .collect();
        let mut steps = Vec::with_capacity(outcomes.len());
        for (idx, (observation, reward, done)) in outcomes.into_iter().enumerate() {
            self.observations[idx] = observation;
            self.episode_rewards[idx] += reward;
            self.episode_lengths[idx] += 1;
            if done {
                self.finished.push(EpisodeRecord {
                    reward: self.episode_rewards[idx],
                    length: self.episode_lengths[idx],
                });
                self.episode_rewards[idx] = 0.;
                self.episode_lengths[idx] = 0;
            }
            steps.push(VecStep { reward, done });
        }
        steps
    }

    /// Drains the episodes that finished since the last call.
    pub fn take_finished_episodes(&mut self) -> Vec<EpisodeRecord> {
        std::mem::take(&mut self.finished)
    }
}
