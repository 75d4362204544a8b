pub mod dqn;
pub mod ppo;

pub use dqn::{DeepQLearning, DqnSettings};
pub use ppo::{Ppo, PpoSettings};
