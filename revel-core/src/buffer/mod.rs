pub mod deque;
pub mod rollout;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BufferError {
    #[error("frame {index} is not accessible for environment {env}")]
    FrameNotAccessible { index: usize, env: usize },
    #[error("frame {index} has no recorded successor for environment {env}")]
    NoSuccessor { index: usize, env: usize },
    #[error("history stacking requires a unit trailing observation axis")]
    HistoryUnsupported,
    #[error("buffer does not hold enough transitions to sample {requested} of them")]
    NotEnoughTransitions { requested: usize },
}
