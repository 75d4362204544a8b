pub mod vec_env;

use crate::numeric::Frame;

#[derive(Debug, Clone)]
pub enum Space {
    Discrete(usize),
    Box {
        low: f32,
        high: f32,
        shape: Vec<usize>,
    },
}

impl Space {
    pub fn box_from_dims(shape: Vec<usize>) -> Self {
        Self::Box {
            low: f32::NEG_INFINITY,
            high: f32::INFINITY,
            shape,
        }
    }

    pub fn size(&self) -> usize {
        match self {
            Self::Discrete(size) => *size,
            Self::Box { shape, .. } => shape.iter().product(),
        }
    }

    pub fn shape(&self) -> Vec<usize> {
        match self {
            Self::Discrete(_) => vec![1],
            Self::Box { shape, .. } => shape.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnvDescription {
    pub observation_space: Space,
    pub action_space: Space,
}

impl EnvDescription {
    pub fn new(observation_space: Space, action_space: Space) -> Self {
        Self {
            observation_space,
            action_space,
        }
    }

    pub fn observation_size(&self) -> usize {
        self.observation_space.size()
    }

    pub fn action_size(&self) -> usize {
        self.action_space.size()
    }
}

pub struct Step {
    pub observation: Frame,
    pub reward: f32,
    pub terminated: bool,
    pub truncated: bool,
}

/// A single environment with a discrete action interface.
pub trait Env: Send {
    fn reset(&mut self, seed: u64) -> Frame;
    fn step(&mut self, action: usize) -> Step;
    fn description(&self) -> EnvDescription;
}
