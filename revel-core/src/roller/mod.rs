pub mod replay_q;
pub mod step;

use crate::numeric::Frame;
use candle_core::Tensor;
use std::collections::VecDeque;

/// Keeps the most recent `history` frames of one environment and exposes
/// them stacked along the trailing axis, oldest first, zero-filled while
/// the episode is younger than the window.
pub struct FrameStack {
    history: usize,
    frame_shape: Vec<usize>,
    frames: VecDeque<Frame>,
}

impl FrameStack {
    pub fn new(history: usize, frame_shape: Vec<usize>) -> Self {
        assert!(history == 1 || frame_shape.last() == Some(&1));
        Self {
            history,
            frame_shape,
            frames: VecDeque::with_capacity(history),
        }
    }

    pub fn push(&mut self, frame: Frame) {
        if self.frames.len() == self.history {
            self.frames.pop_front();
        }
        self.frames.push_back(frame);
    }

    /// Drops the current episode's frames.
    pub fn clear(&mut self) {
        self.frames.clear();
    }

    pub fn stacked(&self) -> Frame {
        if self.history == 1 {
            return self
                .frames
                .back()
                .cloned()
                .unwrap_or_else(|| Frame::zeros(self.frame_shape.clone()));
        }
        let spatial: usize = self.frame_shape.iter().product();
        let mut shape = self.frame_shape.clone();
        *shape.last_mut().unwrap() = self.history;
        let mut data = vec![0.; spatial * self.history];
        let missing = self.history - self.frames.len();
        for (slot, frame) in self.frames.iter().enumerate() {
            let plane_idx = missing + slot;
            for s in 0..spatial {
                data[s * self.history + plane_idx] = frame.data()[s];
            }
        }
        Frame::new(data, shape)
    }
}

/// A sampled replay batch stacked into tensors, observations flattened to
/// `(batch, input_dim)`.
pub struct TransitionTensors {
    pub observations: Tensor,
    pub actions: Tensor,
    pub rewards: Tensor,
    pub dones: Tensor,
    pub next_observations: Tensor,
}
