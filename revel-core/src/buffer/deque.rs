use super::BufferError;
use crate::numeric::Frame;
use rand::{Rng, rngs::StdRng};

/// A single transition gathered from the buffer.
pub struct Transition {
    pub state: Frame,
    pub action: Frame,
    pub reward: f32,
    pub done: bool,
    pub next_state: Frame,
}

/// A batch of transitions gathered for a set of (index, environment)
/// pairs. The leading two axes of every field are `[batch, num_envs]`.
pub struct TransitionBatch {
    pub states: Frame,
    pub actions: Frame,
    pub rewards: Frame,
    pub dones: Vec<bool>,
    pub next_states: Frame,
}

/// A contiguous slice of transitions, leading axes `[length, num_envs]`.
pub struct Rollout {
    pub states: Frame,
    pub actions: Frame,
    pub rewards: Frame,
    pub dones: Vec<bool>,
}

/// Circular experience buffer over a set of parallel environments.
///
/// One slot stores a frame, an action, a reward and a done flag for every
/// environment. Lookups stack the `history - 1` preceding frames onto the
/// requested one along the trailing axis, zero-filling planes that fall
/// before the start of recorded data or behind an episode boundary.
/// Anchors whose history window would straddle the write head of a full
/// buffer are rejected, as the data there is no longer contiguous in time.
pub struct DequeMultiEnvBuffer {
    capacity: usize,
    num_envs: usize,
    frame_shape: Vec<usize>,
    action_shape: Vec<usize>,
    frames: Vec<f32>,
    actions: Vec<f32>,
    rewards: Vec<f32>,
    dones: Vec<bool>,
    head: usize,
    size: usize,
}

impl DequeMultiEnvBuffer {
    pub fn new(
        capacity: usize,
        num_envs: usize,
        frame_shape: Vec<usize>,
        action_shape: Vec<usize>,
    ) -> Self {
        assert!(capacity > 0 && num_envs > 0);
        let frame_numel: usize = frame_shape.iter().product();
        let action_numel: usize = action_shape.iter().product::<usize>().max(1);
        Self {
            capacity,
            num_envs,
            frame_shape,
            action_shape,
            frames: vec![0.; capacity * num_envs * frame_numel],
            actions: vec![0.; capacity * num_envs * action_numel],
            rewards: vec![0.; capacity * num_envs],
            dones: vec![false; capacity * num_envs],
            head: 0,
            size: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn num_envs(&self) -> usize {
        self.num_envs
    }

    pub fn current_size(&self) -> usize {
        self.size
    }

    fn frame_numel(&self) -> usize {
        self.frame_shape.iter().product()
    }

    fn action_numel(&self) -> usize {
        self.action_shape.iter().product::<usize>().max(1)
    }

    /// The buffer has lapped its capacity at least once.
    fn wrapped(&self) -> bool {
        self.size == self.capacity
    }

    /// Stores one step for all environments and advances the write head.
    /// `frames` and `actions` carry the environment as their leading axis.
    pub fn store_transition(
        &mut self,
        frames: &Frame,
        actions: &Frame,
        rewards: &[f32],
        dones: &[bool],
    ) {
        assert_eq!(frames.shape()[0], self.num_envs);
        assert_eq!(&frames.shape()[1..], self.frame_shape.as_slice());
        assert_eq!(actions.shape()[0], self.num_envs);
        assert_eq!(rewards.len(), self.num_envs);
        assert_eq!(dones.len(), self.num_envs);
        let frame_numel = self.frame_numel();
        let action_numel = self.action_numel();
        let slot = self.head;
        for env in 0..self.num_envs {
            let dst = (slot * self.num_envs + env) * frame_numel;
            let src = env * frame_numel;
            self.frames[dst..dst + frame_numel]
                .copy_from_slice(&frames.data()[src..src + frame_numel]);
            let dst = (slot * self.num_envs + env) * action_numel;
            let src = env * action_numel;
            self.actions[dst..dst + action_numel]
                .copy_from_slice(&actions.data()[src..src + action_numel]);
            self.rewards[slot * self.num_envs + env] = rewards[env];
            self.dones[slot * self.num_envs + env] = dones[env];
        }
        self.head = (self.head + 1) % self.capacity;
        self.size = (self.size + 1).min(self.capacity);
    }

    fn plane(&self, slot: usize, env: usize) -> &[f32] {
        let numel = self.frame_numel();
        let offset = (slot * self.num_envs + env) * numel;
        &self.frames[offset..offset + numel]
    }

    fn done_at(&self, slot: usize, env: usize) -> bool {
        self.dones[slot * self.num_envs + env]
    }

    /// Rejects anchors whose history window is not recoverable: anything
    /// past the recorded data while filling up, and the `history - 1`
    /// slots right behind the head once the buffer has lapped.
    fn check_anchor(&self, index: usize, env: usize, history: usize) -> Result<(), BufferError> {
        let inaccessible = index >= self.capacity
            || if self.wrapped() {
                (index + self.capacity - self.head) % self.capacity < history - 1
            } else {
                index >= self.head
            };
        if inaccessible {
            Err(BufferError::FrameNotAccessible { index, env })
        } else {
            Ok(())
        }
    }

    fn stacked_shape(&self, history: usize) -> Vec<usize> {
        if history == 1 {
            return self.frame_shape.clone();
        }
        let mut shape = self.frame_shape.clone();
        *shape.last_mut().unwrap() = history;
        shape
    }

    /// The observation at `index` for `env`, stacked with the preceding
    /// `history - 1` frames along the trailing axis, oldest first.
    pub fn get_frame(&self, index: usize, env: usize, history: usize) -> Result<Frame, BufferError> {
        if history > 1 && self.frame_shape.last() != Some(&1) {
            return Err(BufferError::HistoryUnsupported);
        }
        self.check_anchor(index, env, history)?;
        if history == 1 {
            return Ok(Frame::new(
                self.plane(index, env).to_vec(),
                self.frame_shape.clone(),
            ));
        }
        let spatial = self.frame_numel();
        let mut planes: Vec<Option<&[f32]>> = vec![None; history];
        planes[history - 1] = Some(self.plane(index, env));
        for offset in 1..history {
            if !self.wrapped() && index < offset {
                break;
            }
            let slot = (index + self.capacity - offset) % self.capacity;
            // A done flag at `slot` means that frame closed an earlier
            // episode; it and everything older stays zeroed.
            if self.done_at(slot, env) {
                break;
            }
            planes[history - 1 - offset] = Some(self.plane(slot, env));
        }
        let mut data = vec![0.; spatial * history];
        for (plane_idx, plane) in planes.iter().enumerate() {
            if let Some(plane) = plane {
                for s in 0..spatial {
                    data[s * history + plane_idx] = plane[s];
                }
            }
        }
        Ok(Frame::new(data, self.stacked_shape(history)))
    }

    /// Like [`get_frame`](Self::get_frame) but also returns the successor
    /// stacked frame. When the anchor transition finished an episode the
    /// successor is the anchor stack shifted by one with a zeroed newest
    /// plane, so it never leaks the next episode's first observation.
    pub fn get_frame_with_future(
        &self,
        index: usize,
        env: usize,
        history: usize,
    ) -> Result<(Frame, Frame), BufferError> {
        let newest = (self.head + self.capacity - 1) % self.capacity;
        if index == newest {
            return Err(BufferError::NoSuccessor { index, env });
        }
        let frame = self.get_frame(index, env, history)?;
        let future = if self.done_at(index, env) {
            let mut data = vec![0.; frame.numel()];
            if history == 1 {
                Frame::new(data, frame.shape().to_vec())
            } else {
                let spatial = self.frame_numel();
                for s in 0..spatial {
                    for plane_idx in 0..history - 1 {
                        data[s * history + plane_idx] = frame.data()[s * history + plane_idx + 1];
                    }
                }
                Frame::new(data, frame.shape().to_vec())
            }
        } else {
            self.get_frame((index + 1) % self.capacity, env, history)?
        };
        Ok((frame, future))
    }

    pub fn get_transition(
        &self,
        index: usize,
        env: usize,
        history: usize,
    ) -> Result<Transition, BufferError> {
        let (state, next_state) = self.get_frame_with_future(index, env, history)?;
        let numel = self.action_numel();
        let offset = (index * self.num_envs + env) * numel;
        let action_shape = if self.action_shape.is_empty() {
            vec![1]
        } else {
            self.action_shape.clone()
        };
        Ok(Transition {
            state,
            next_state,
            action: Frame::new(self.actions[offset..offset + numel].to_vec(), action_shape),
            reward: self.rewards[index * self.num_envs + env],
            done: self.dones[index * self.num_envs + env],
        })
    }

    /// Gathers a batch of transitions. `indexes` holds one row per batch
    /// entry with one anchor per environment.
    pub fn get_batch(
        &self,
        indexes: &[Vec<usize>],
        history: usize,
    ) -> Result<TransitionBatch, BufferError> {
        let batch = indexes.len();
        let stacked_numel: usize = self.stacked_shape(history).iter().product();
        let action_numel = self.action_numel();
        let mut states = Vec::with_capacity(batch * self.num_envs * stacked_numel);
        let mut next_states = Vec::with_capacity(batch * self.num_envs * stacked_numel);
        let mut actions = Vec::with_capacity(batch * self.num_envs * action_numel);
        let mut rewards = Vec::with_capacity(batch * self.num_envs);
        let mut dones = Vec::with_capacity(batch * self.num_envs);
        for row in indexes {
            assert_eq!(row.len(), self.num_envs);
            for (env, &index) in row.iter().enumerate() {
                let transition = self.get_transition(index, env, history)?;
                states.extend_from_slice(transition.state.data());
                next_states.extend_from_slice(transition.next_state.data());
                actions.extend_from_slice(transition.action.data());
                rewards.push(transition.reward);
                dones.push(transition.done);
            }
        }
        let mut state_shape = vec![batch, self.num_envs];
        state_shape.extend(self.stacked_shape(history));
        let mut action_shape = vec![batch, self.num_envs];
        action_shape.extend(if self.action_shape.is_empty() {
            vec![1]
        } else {
            self.action_shape.clone()
        });
        Ok(TransitionBatch {
            states: Frame::new(states, state_shape.clone()),
            next_states: Frame::new(next_states, state_shape),
            actions: Frame::new(actions, action_shape),
            rewards: Frame::new(rewards, vec![batch, self.num_envs]),
            dones,
        })
    }

    fn transition_anchors(&self, history: usize) -> Vec<usize> {
        let newest = (self.head + self.capacity - 1) % self.capacity;
        (0..self.capacity)
            .filter(|&idx| idx != newest && self.check_anchor(idx, 0, history).is_ok())
            .collect()
    }

    /// Uniformly samples `batch_size` transition anchors per environment,
    /// independently across environments.
    pub fn sample_batch_uniform(
        &self,
        batch_size: usize,
        history: usize,
        rng: &mut StdRng,
    ) -> Result<Vec<Vec<usize>>, BufferError> {
        let anchors = self.transition_anchors(history);
        if anchors.is_empty() {
            return Err(BufferError::NotEnoughTransitions {
                requested: batch_size,
            });
        }
        Ok((0..batch_size)
            .map(|_| {
                (0..self.num_envs)
                    .map(|_| anchors[rng.random_range(0..anchors.len())])
                    .collect()
            })
            .collect())
    }

    /// Samples, per environment, the end anchor of a contiguous rollout of
    /// `length` transitions. Every anchor of the rollout must be valid and
    /// the end anchor needs a recorded successor.
    pub fn sample_rollout(
        &self,
        length: usize,
        history: usize,
        rng: &mut StdRng,
    ) -> Result<Vec<usize>, BufferError> {
        let (start, span) = if self.wrapped() {
            let span = (self.capacity + 1).saturating_sub(history + length);
            ((self.head + history + length - 2) % self.capacity, span)
        } else {
            (length - 1, self.head.saturating_sub(length))
        };
        if span == 0 {
            return Err(BufferError::NotEnoughTransitions { requested: length });
        }
        Ok((0..self.num_envs)
            .map(|_| (start + rng.random_range(0..span)) % self.capacity)
            .collect())
    }

    /// Gathers the rollout of `length` transitions ending at the sampled
    /// per-environment anchors.
    pub fn get_rollout(
        &self,
        ends: &[usize],
        length: usize,
        history: usize,
    ) -> Result<Rollout, BufferError> {
        assert_eq!(ends.len(), self.num_envs);
        let stacked_numel: usize = self.stacked_shape(history).iter().product();
        let action_numel = self.action_numel();
        let mut states = Vec::with_capacity(length * self.num_envs * stacked_numel);
        let mut actions = Vec::with_capacity(length * self.num_envs * action_numel);
        let mut rewards = Vec::with_capacity(length * self.num_envs);
        let mut dones = Vec::with_capacity(length * self.num_envs);
        for step in 0..length {
            for (env, &end) in ends.iter().enumerate() {
                let index = (end + self.capacity + step + 1 - length) % self.capacity;
                let state = self.get_frame(index, env, history)?;
                states.extend_from_slice(state.data());
                let offset = (index * self.num_envs + env) * action_numel;
                actions.extend_from_slice(&self.actions[offset..offset + action_numel]);
                rewards.push(self.rewards[index * self.num_envs + env]);
                dones.push(self.dones[index * self.num_envs + env]);
            }
        }
        let mut state_shape = vec![length, self.num_envs];
        state_shape.extend(self.stacked_shape(history));
        let mut action_shape = vec![length, self.num_envs];
        action_shape.extend(if self.action_shape.is_empty() {
            vec![1]
        } else {
            self.action_shape.clone()
        });
        Ok(Rollout {
            states: Frame::new(states, state_shape),
            actions: Frame::new(actions, action_shape),
            rewards: Frame::new(rewards, vec![length, self.num_envs]),
            dones,
        })
    }
}
