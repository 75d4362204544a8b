use crate::error::ConfigError;
use serde::Deserialize;
use std::path::Path;

/// A complete model configuration: a named training run and every
/// component reference it needs. Component specs are mappings selected by
/// their `name:` string; unknown names fail deserialization with the
/// offending reference in the message.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    pub name: String,
    pub env: EnvSpec,
    pub model: ModelSpec,
    pub reinforcer: ReinforcerSpec,
    pub optimizer: OptimizerSpec,
    pub commands: CommandsSpec,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_seed() -> u64 {
    0
}

impl ModelConfig {
    pub fn from_str(source: &str) -> Result<Self, ConfigError> {
        let config: ModelConfig = serde_yaml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        })?;
        Self::from_str(&source)
    }

    /// Cross-component checks that the schema alone cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::validation("the run name must not be empty"));
        }
        let train = self.train_command()?;
        if train.total_frames < 1. {
            return Err(ConfigError::validation(
                "commands.train.total_frames must be at least 1",
            ));
        }
        if train.batches_per_epoch == 0 {
            return Err(ConfigError::validation(
                "commands.train.batches_per_epoch must be positive",
            ));
        }
        match (&self.reinforcer, &self.model) {
            (
                ReinforcerSpec::BufferedOffPolicyIteration {
                    algo,
                    env_roller,
                    rollout_rounds,
                    training_rounds: _,
                    batch_size,
                },
                model,
            ) => {
                let ModelSpec::QModel { backbone } = model else {
                    return Err(ConfigError::validation(
                        "the buffered off-policy reinforcer trains a q_model",
                    ));
                };
                backbone.validate()?;
                if !matches!(algo, AlgoSpec::DeepQLearning { .. }) {
                    return Err(ConfigError::validation(
                        "the buffered off-policy reinforcer drives a value-learning algo",
                    ));
                }
                let EnvRollerSpec::ReplayQ {
                    parallel_envs,
                    buffer_capacity,
                    buffer_initial_size,
                    frame_history,
                    epsilon_schedule,
                } = env_roller
                else {
                    return Err(ConfigError::validation(
                        "the buffered off-policy reinforcer needs the replay_q env roller",
                    ));
                };
                if *parallel_envs == 0 {
                    return Err(ConfigError::validation("parallel_envs must be positive"));
                }
                if *buffer_capacity == 0 {
                    return Err(ConfigError::validation("buffer_capacity must be positive"));
                }
                if *buffer_initial_size > *buffer_capacity {
                    return Err(ConfigError::validation(
                        "buffer_initial_size cannot exceed buffer_capacity",
                    ));
                }
                if *frame_history == 0 {
                    return Err(ConfigError::validation("frame_history must be positive"));
                }
                if *rollout_rounds == 0 {
                    return Err(ConfigError::validation(
                        "rollout_rounds must be positive, otherwise no frames are ever collected",
                    ));
                }
                if *batch_size == 0 {
                    return Err(ConfigError::validation("batch_size must be positive"));
                }
                epsilon_schedule.validate()?;
            }
            (
                ReinforcerSpec::OnPolicyIteration {
                    algo,
                    env_roller,
                    batch_size,
                    ..
                },
                model,
            ) => {
                if !matches!(model, ModelSpec::StochasticPolicy { .. }) {
                    return Err(ConfigError::validation(
                        "the on-policy reinforcer trains a stochastic_policy model",
                    ));
                }
                let AlgoSpec::Ppo { cliprange, .. } = algo else {
                    return Err(ConfigError::validation(
                        "the on-policy reinforcer drives a policy-gradient algo",
                    ));
                };
                cliprange.validate()?;
                let EnvRollerSpec::Step {
                    parallel_envs,
                    number_of_steps,
                } = env_roller
                else {
                    return Err(ConfigError::validation(
                        "the on-policy reinforcer needs the step env roller",
                    ));
                };
                if *parallel_envs == 0 || *number_of_steps == 0 {
                    return Err(ConfigError::validation(
                        "parallel_envs and number_of_steps must be positive",
                    ));
                }
                if *batch_size == 0 {
                    return Err(ConfigError::validation("batch_size must be positive"));
                }
            }
        }
        Ok(())
    }

    /// The `train` command spec, required by the CLI.
    pub fn train_command(&self) -> Result<&TrainCommandSpec, ConfigError> {
        let CommandSpec::Train(train) = self
            .commands
            .train
            .as_ref()
            .ok_or_else(|| ConfigError::validation("the commands section needs a train command"))?;
        Ok(train)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "name")]
pub enum EnvSpec {
    #[serde(rename = "revel.rl.env.cart_pole")]
    CartPole,
    #[serde(rename = "revel.rl.env.ballgame")]
    Ballgame,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "name")]
pub enum ModelSpec {
    #[serde(rename = "revel.rl.models.q_model")]
    QModel { backbone: BackboneSpec },
    #[serde(rename = "revel.rl.models.stochastic_policy")]
    StochasticPolicy {
        #[serde(default = "default_layers")]
        policy_layers: Vec<usize>,
        #[serde(default = "default_layers")]
        value_layers: Vec<usize>,
    },
}

fn default_layers() -> Vec<usize> {
    vec![64, 64]
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "name")]
pub enum BackboneSpec {
    #[serde(rename = "revel.rl.models.backbone.mlp")]
    Mlp { hidden_layers: Vec<usize> },
    #[serde(rename = "revel.rl.models.backbone.nature_cnn")]
    NatureCnn {
        input_height: usize,
        input_width: usize,
        input_frames: usize,
    },
}

impl BackboneSpec {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::Mlp { hidden_layers } => {
                if hidden_layers.is_empty() {
                    return Err(ConfigError::validation(
                        "the mlp backbone needs at least one hidden layer",
                    ));
                }
            }
            Self::NatureCnn {
                input_height,
                input_width,
                input_frames,
            } => {
                let min = revel_core::model::NATURE_CNN_MIN_INPUT;
                if *input_height < min || *input_width < min {
                    return Err(ConfigError::validation(format!(
                        "the nature_cnn backbone needs at least {min}x{min} observations, got {input_height}x{input_width}"
                    )));
                }
                if *input_frames == 0 {
                    return Err(ConfigError::validation("input_frames must be positive"));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "name")]
pub enum ReinforcerSpec {
    #[serde(rename = "revel.rl.reinforcers.buffered_off_policy_iteration")]
    BufferedOffPolicyIteration {
        algo: AlgoSpec,
        env_roller: EnvRollerSpec,
        rollout_rounds: usize,
        training_rounds: usize,
        batch_size: usize,
    },
    #[serde(rename = "revel.rl.reinforcers.on_policy_iteration")]
    OnPolicyIteration {
        algo: AlgoSpec,
        env_roller: EnvRollerSpec,
        batch_size: usize,
        #[serde(default = "default_replay")]
        experience_replay: usize,
        discount_factor: f32,
        #[serde(default = "default_gae_lambda")]
        gae_lambda: f32,
    },
}

fn default_replay() -> usize {
    1
}

fn default_gae_lambda() -> f32 {
    0.95
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "name")]
pub enum AlgoSpec {
    #[serde(rename = "revel.rl.algo.deep_q_learning")]
    DeepQLearning {
        discount_factor: f32,
        target_update_frequency: usize,
        #[serde(default)]
        max_grad_norm: Option<f32>,
        /// Decoupled action selection and evaluation between the online
        /// and target networks.
        #[serde(default = "default_true")]
        double: bool,
    },
    #[serde(rename = "revel.rl.algo.ppo")]
    Ppo {
        entropy_coefficient: f32,
        value_coefficient: f32,
        cliprange: ScheduleSpec,
        #[serde(default)]
        max_grad_norm: Option<f32>,
        #[serde(default = "default_true")]
        normalize_advantage: bool,
    },
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "name")]
pub enum EnvRollerSpec {
    #[serde(rename = "revel.rl.env_roller.replay_q")]
    ReplayQ {
        parallel_envs: usize,
        buffer_capacity: usize,
        buffer_initial_size: usize,
        #[serde(default = "default_history")]
        frame_history: usize,
        epsilon_schedule: ScheduleSpec,
    },
    #[serde(rename = "revel.rl.env_roller.step")]
    Step {
        parallel_envs: usize,
        number_of_steps: usize,
    },
}

fn default_history() -> usize {
    1
}

/// A scalar hyperparameter: either a bare number or a named schedule
/// interpolated over training progress.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ScheduleSpec {
    Constant(f64),
    Named(NamedScheduleSpec),
}

impl ScheduleSpec {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Self::Named(NamedScheduleSpec::LinearAndConstant {
            end_of_interpolation,
            ..
        }) = self
            && *end_of_interpolation <= 0.
        {
            return Err(ConfigError::validation(
                "end_of_interpolation must be positive",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "name")]
pub enum NamedScheduleSpec {
    #[serde(rename = "revel.schedules.constant")]
    Constant { value: f64 },
    #[serde(rename = "revel.schedules.linear_and_constant")]
    LinearAndConstant {
        initial_value: f64,
        final_value: f64,
        end_of_interpolation: f64,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "name")]
pub enum OptimizerSpec {
    #[serde(rename = "revel.optimizers.adamw")]
    AdamW {
        lr: f64,
        #[serde(default = "default_beta1")]
        beta1: f64,
        #[serde(default = "default_beta2")]
        beta2: f64,
        #[serde(default = "default_eps")]
        eps: f64,
        #[serde(default)]
        weight_decay: f64,
    },
    #[serde(rename = "revel.optimizers.sgd")]
    Sgd { lr: f64 },
}

fn default_beta1() -> f64 {
    0.9
}

fn default_beta2() -> f64 {
    0.999
}

fn default_eps() -> f64 {
    1e-8
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandsSpec {
    pub train: Option<CommandSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "name")]
pub enum CommandSpec {
    #[serde(rename = "revel.commands.train")]
    Train(TrainCommandSpec),
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrainCommandSpec {
    /// Frame budget, accepted in scientific notation (`1.1e7`).
    pub total_frames: f64,
    pub batches_per_epoch: usize,
}

impl TrainCommandSpec {
    pub fn total_frames(&self) -> usize {
        self.total_frames as usize
    }
}
