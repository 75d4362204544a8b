use super::{FrameStack, TransitionTensors};
use crate::buffer::deque::DequeMultiEnvBuffer;
use crate::env::vec_env::{EpisodeRecord, VecEnv};
use crate::model::QModel;
use crate::numeric::Frame;
use crate::schedule::{Schedule, ScheduleKind};
use candle_core::{D, Device, Error, Result, Tensor};
use rand::{Rng, SeedableRng, rngs::StdRng};

/// Epsilon-greedy environment roller backed by the deque replay buffer.
/// Rollouts store raw frames; sampling stacks them back into batches for
/// the q-learning update.
pub struct ReplayQRoller {
    vec_env: VecEnv,
    buffer: DequeMultiEnvBuffer,
    epsilon: ScheduleKind,
    history: usize,
    initial_size: usize,
    stacks: Vec<FrameStack>,
    device: Device,
    rng: StdRng,
}

impl ReplayQRoller {
    pub fn new(
        vec_env: VecEnv,
        capacity: usize,
        initial_size: usize,
        history: usize,
        epsilon: ScheduleKind,
        device: &Device,
        seed: u64,
    ) -> Self {
        assert!(initial_size <= capacity);
        let description = vec_env.description();
        let frame_shape = description.observation_space.shape();
        let buffer = DequeMultiEnvBuffer::new(
            capacity,
            vec_env.num_envs(),
            frame_shape.clone(),
            vec![],
        );
        let mut stacks: Vec<FrameStack> = (0..vec_env.num_envs())
            .map(|_| FrameStack::new(history, frame_shape.clone()))
            .collect();
        for (stack, observation) in stacks.iter_mut().zip(vec_env.observations()) {
            stack.push(observation.clone());
        }
        Self {
            vec_env,
            buffer,
            epsilon,
            history,
            initial_size,
            stacks,
            device: device.clone(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn num_envs(&self) -> usize {
        self.vec_env.num_envs()
    }

    pub fn history(&self) -> usize {
        self.history
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer.current_size()
    }

    /// True once the buffer holds enough transitions to start training.
    pub fn is_ready(&self) -> bool {
        self.buffer.current_size() >= self.initial_size
    }

    pub fn take_finished_episodes(&mut self) -> Vec<EpisodeRecord> {
        self.vec_env.take_finished_episodes()
    }

    /// The stacked live observations, `(num_envs, input_dim)`.
    fn stacked_observations(&self) -> Result<Tensor> {
        let stacked: Result<Vec<Tensor>> = self
            .stacks
            .iter()
            .map(|stack| stack.stacked().to_flat_tensor(&self.device))
            .collect();
        Tensor::stack(&stacked?, 0)
    }

    /// Steps every environment once with epsilon-greedy actions from the
    /// model and stores the transitions. Returns the number of frames
    /// collected.
    pub fn rollout(&mut self, model: &QModel, progress: f64) -> Result<usize> {
        let num_envs = self.vec_env.num_envs();
        let action_size = model.action_size();
        let observations = self.stacked_observations()?;
        let q_values = model.forward(&observations)?;
        let mut actions: Vec<u32> = q_values.argmax(D::Minus1)?.to_vec1()?;
        let epsilon = self.epsilon.value(progress);
        for action in actions.iter_mut() {
            if self.rng.random::<f64>() < epsilon {
                *action = self.rng.random_range(0..action_size) as u32;
            }
        }

        // raw (unstacked) pre-step frames go into the buffer
        let mut frame_data = vec![];
        let mut frame_shape = vec![num_envs];
        frame_shape.extend_from_slice(self.vec_env.observations()[0].shape());
        for observation in self.vec_env.observations() {
            frame_data.extend_from_slice(observation.data());
        }
        let frames = Frame::new(frame_data, frame_shape);

        let action_indices: Vec<usize> = actions.iter().map(|&a| a as usize).collect();
        let steps = self.vec_env.step(&action_indices);
        let rewards: Vec<f32> = steps.iter().map(|s| s.reward).collect();
        let dones: Vec<bool> = steps.iter().map(|s| s.done).collect();
        let action_frame = Frame::new(actions.iter().map(|&a| a as f32).collect(), vec![num_envs]);
        self.buffer
            .store_transition(&frames, &action_frame, &rewards, &dones);

        for (env, stack) in self.stacks.iter_mut().enumerate() {
            if dones[env] {
                stack.clear();
            }
            stack.push(self.vec_env.observations()[env].clone());
        }
        Ok(num_envs)
    }

    /// Samples a training batch once the buffer passed its initial fill,
    /// flattening the batch and environment axes together.
    pub fn sample_batch(&mut self, batch_size: usize) -> Result<Option<TransitionTensors>> {
        if !self.is_ready() {
            return Ok(None);
        }
        let indexes = self
            .buffer
            .sample_batch_uniform(batch_size, self.history, &mut self.rng)
            .map_err(Error::wrap)?;
        let batch = self
            .buffer
            .get_batch(&indexes, self.history)
            .map_err(Error::wrap)?;
        let rows = batch_size * self.vec_env.num_envs();
        let input_dim = batch.states.numel() / rows;
        let observations =
            Tensor::from_slice(batch.states.data(), (rows, input_dim), &self.device)?;
        let next_observations =
            Tensor::from_slice(batch.next_states.data(), (rows, input_dim), &self.device)?;
        let actions: Vec<u32> = batch.actions.data().iter().map(|&a| a as u32).collect();
        let actions = Tensor::from_vec(actions, rows, &self.device)?;
        let rewards = Tensor::from_slice(batch.rewards.data(), rows, &self.device)?;
        let dones: Vec<f32> = batch.dones.iter().map(|&d| if d { 1. } else { 0. }).collect();
        let dones = Tensor::from_vec(dones, rows, &self.device)?;
        Ok(Some(TransitionTensors {
            observations,
            actions,
            rewards,
            dones,
            next_observations,
        }))
    }
}
