use crate::error::ConfigError;
use crate::schema::{
    AlgoSpec, BackboneSpec, EnvRollerSpec, EnvSpec, ModelConfig, ModelSpec, NamedScheduleSpec,
    OptimizerSpec, ReinforcerSpec, ScheduleSpec,
};
use candle_core::Device;
use candle_nn::VarMap;
use revel_agents::{DeepQLearning, DqnSettings, Ppo, PpoSettings};
use revel_core::env::Env;
use revel_core::env::vec_env::VecEnv;
use revel_core::model::{ActorCritic, BackboneSpec as CoreBackboneSpec, QModel};
use revel_core::optim::OptimizerSpec as CoreOptimizerSpec;
use revel_core::reinforcer::buffered_off_policy::{
    BufferedOffPolicyIterationReinforcer, OffPolicySettings,
};
use revel_core::reinforcer::on_policy::{OnPolicyIterationReinforcer, PolicyGradientSettings};
use revel_core::reinforcer::{EpochInfo, EpochReport, Reinforcer};
use revel_core::roller::replay_q::ReplayQRoller;
use revel_core::roller::step::StepRoller;
use revel_core::schedule::{ConstantSchedule, LinearAndConstantSchedule, ScheduleKind};
use revel_envs::{Ballgame, CartPole};

/// The reinforcer assembled from a validated configuration.
pub enum ReinforcerKind {
    OffPolicy(BufferedOffPolicyIterationReinforcer<DeepQLearning>),
    OnPolicy(OnPolicyIterationReinforcer<Ppo>),
}

impl Reinforcer for ReinforcerKind {
    fn initialize_training(&mut self) -> candle_core::Result<()> {
        match self {
            Self::OffPolicy(reinforcer) => reinforcer.initialize_training(),
            Self::OnPolicy(reinforcer) => reinforcer.initialize_training(),
        }
    }

    fn train_epoch(&mut self, epoch: &EpochInfo) -> candle_core::Result<EpochReport> {
        match self {
            Self::OffPolicy(reinforcer) => reinforcer.train_epoch(epoch),
            Self::OnPolicy(reinforcer) => reinforcer.train_epoch(epoch),
        }
    }

    fn frames(&self) -> usize {
        match self {
            Self::OffPolicy(reinforcer) => reinforcer.frames(),
            Self::OnPolicy(reinforcer) => reinforcer.frames(),
        }
    }

    fn total_frames(&self) -> usize {
        match self {
            Self::OffPolicy(reinforcer) => reinforcer.total_frames(),
            Self::OnPolicy(reinforcer) => reinforcer.total_frames(),
        }
    }

    fn varmap(&self) -> &VarMap {
        match self {
            Self::OffPolicy(reinforcer) => reinforcer.varmap(),
            Self::OnPolicy(reinforcer) => reinforcer.varmap(),
        }
    }
}

fn make_env(spec: &EnvSpec) -> Box<dyn Env> {
    match spec {
        EnvSpec::CartPole => Box::new(CartPole::new()),
        EnvSpec::Ballgame => Box::new(Ballgame::new()),
    }
}

fn make_vec_env(spec: &EnvSpec, parallel_envs: usize, seed: u64) -> VecEnv {
    let envs = (0..parallel_envs).map(|_| make_env(spec)).collect();
    VecEnv::new(envs, seed)
}

fn make_schedule(spec: &ScheduleSpec) -> Result<ScheduleKind, ConfigError> {
    spec.validate()?;
    Ok(match spec {
        ScheduleSpec::Constant(value) => ScheduleKind::from(ConstantSchedule::new(*value)),
        ScheduleSpec::Named(NamedScheduleSpec::Constant { value }) => {
            ScheduleKind::from(ConstantSchedule::new(*value))
        }
        ScheduleSpec::Named(NamedScheduleSpec::LinearAndConstant {
            initial_value,
            final_value,
            end_of_interpolation,
        }) => ScheduleKind::from(LinearAndConstantSchedule::new(
            *initial_value,
            *final_value,
            *end_of_interpolation,
        )),
    })
}

fn make_optimizer_spec(spec: &OptimizerSpec) -> CoreOptimizerSpec {
    match *spec {
        OptimizerSpec::AdamW {
            lr,
            beta1,
            beta2,
            eps,
            weight_decay,
        } => CoreOptimizerSpec::AdamW {
            learning_rate: lr,
            beta1,
            beta2,
            eps,
            weight_decay,
        },
        OptimizerSpec::Sgd { lr } => CoreOptimizerSpec::Sgd { learning_rate: lr },
    }
}

fn make_backbone(
    spec: &BackboneSpec,
    observation_shape: &[usize],
    frame_history: usize,
) -> Result<CoreBackboneSpec, ConfigError> {
    spec.validate()?;
    match spec {
        BackboneSpec::Mlp { hidden_layers } => Ok(CoreBackboneSpec::Mlp {
            hidden_layers: hidden_layers.clone(),
        }),
        BackboneSpec::NatureCnn {
            input_height,
            input_width,
            input_frames,
        } => {
            if *input_frames != frame_history {
                return Err(ConfigError::validation(format!(
                    "the backbone expects {input_frames} stacked frames but the env roller keeps {frame_history}"
                )));
            }
            let expected = [*input_height, *input_width, 1];
            if observation_shape != expected.as_slice() {
                return Err(ConfigError::validation(format!(
                    "the nature_cnn backbone needs {expected:?} observations, the environment produces {observation_shape:?}"
                )));
            }
            Ok(CoreBackboneSpec::NatureCnn {
                height: *input_height,
                width: *input_width,
                stack: *input_frames,
            })
        }
    }
}

/// Builds the full training stack a configuration describes. The
/// configuration must already be validated, which `ModelConfig` loading
/// guarantees.
pub fn build_reinforcer(
    config: &ModelConfig,
    device: &Device,
) -> Result<ReinforcerKind, ConfigError> {
    let total_frames = config.train_command()?.total_frames();
    match &config.reinforcer {
        ReinforcerSpec::BufferedOffPolicyIteration {
            algo,
            env_roller,
            rollout_rounds,
            training_rounds,
            batch_size,
        } => {
            let AlgoSpec::DeepQLearning {
                discount_factor,
                target_update_frequency,
                max_grad_norm,
                double,
            } = algo
            else {
                return Err(ConfigError::validation(
                    "the buffered off-policy reinforcer drives a value-learning algo",
                ));
            };
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
            let ModelSpec::QModel { backbone } = &config.model else {
                return Err(ConfigError::validation(
                    "the buffered off-policy reinforcer trains a q_model",
                ));
            };

            let vec_env = make_vec_env(&config.env, *parallel_envs, config.seed);
            let description = vec_env.description();
            let observation_shape = description.observation_space.shape();
            if *frame_history > 1 && observation_shape.last() != Some(&1) {
                return Err(ConfigError::validation(format!(
                    "frame_history > 1 needs observations with a unit trailing axis, the environment produces {observation_shape:?}"
                )));
            }
            let backbone = make_backbone(backbone, &observation_shape, *frame_history)?;
            let input_dim = description.observation_size() * frame_history;
            let model = QModel::new(input_dim, description.action_size(), backbone, device)?;
            let roller = ReplayQRoller::new(
                vec_env,
                *buffer_capacity,
                *buffer_initial_size,
                *frame_history,
                make_schedule(epsilon_schedule)?,
                device,
                config.seed.wrapping_add(1),
            );
            let algo = DeepQLearning::new(
                DqnSettings {
                    discount_factor: *discount_factor,
                    target_update_frequency: *target_update_frequency,
                    max_grad_norm: *max_grad_norm,
                    double: *double,
                },
                make_optimizer_spec(&config.optimizer),
            );
            let settings = OffPolicySettings {
                rollout_rounds: *rollout_rounds,
                training_rounds: *training_rounds,
                batch_size: *batch_size,
                total_frames,
            };
            Ok(ReinforcerKind::OffPolicy(
                BufferedOffPolicyIterationReinforcer::new(settings, roller, model, algo),
            ))
        }
        ReinforcerSpec::OnPolicyIteration {
            algo,
            env_roller,
            batch_size,
            experience_replay,
            discount_factor,
            gae_lambda,
        } => {
            let AlgoSpec::Ppo {
                entropy_coefficient,
                value_coefficient,
                cliprange,
                max_grad_norm,
                normalize_advantage,
            } = algo
            else {
                return Err(ConfigError::validation(
                    "the on-policy reinforcer drives a policy-gradient algo",
                ));
            };
            let EnvRollerSpec::Step {
                parallel_envs,
                number_of_steps,
            } = env_roller
            else {
                return Err(ConfigError::validation(
                    "the on-policy reinforcer needs the step env roller",
                ));
            };
            let ModelSpec::StochasticPolicy {
                policy_layers,
                value_layers,
            } = &config.model
            else {
                return Err(ConfigError::validation(
                    "the on-policy reinforcer trains a stochastic_policy model",
                ));
            };

            let vec_env = make_vec_env(&config.env, *parallel_envs, config.seed);
            let description = vec_env.description();
            let model = ActorCritic::new(
                description.observation_size(),
                description.action_size(),
                policy_layers,
                value_layers,
                device,
            )?;
            let roller = StepRoller::new(
                vec_env,
                *number_of_steps,
                device,
                config.seed.wrapping_add(1),
            );
            let algo = Ppo::new(
                PpoSettings {
                    clip_range: make_schedule(cliprange)?,
                    entropy_coefficient: *entropy_coefficient,
                    value_coefficient: *value_coefficient,
                    normalize_advantage: *normalize_advantage,
                    max_grad_norm: *max_grad_norm,
                },
                make_optimizer_spec(&config.optimizer),
            );
            let settings = PolicyGradientSettings {
                batch_size: *batch_size,
                experience_replay: *experience_replay,
                discount_factor: *discount_factor,
                gae_lambda: *gae_lambda,
                total_frames,
            };
            Ok(ReinforcerKind::OnPolicy(OnPolicyIterationReinforcer::new(
                settings,
                roller,
                model,
                algo,
                device,
                config.seed.wrapping_add(2),
            )))
        }
    }
}
