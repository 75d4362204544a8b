use candle_core::Device;
use revel_config::{ModelConfig, build_reinforcer};
use revel_core::reinforcer::{EpochInfo, Reinforcer};

const TINY_DQN: &str = "
name: tiny_dqn
seed: 3
env:
  name: revel.rl.env.ballgame
model:
  name: revel.rl.models.q_model
  backbone:
    name: revel.rl.models.backbone.mlp
    hidden_layers: [16]
reinforcer:
  name: revel.rl.reinforcers.buffered_off_policy_iteration
  algo:
    name: revel.rl.algo.deep_q_learning
    discount_factor: 0.99
    target_update_frequency: 4
    max_grad_norm: 0.5
  env_roller:
    name: revel.rl.env_roller.replay_q
    parallel_envs: 2
    buffer_capacity: 64
    buffer_initial_size: 4
    frame_history: 2
    epsilon_schedule: 0.3
  rollout_rounds: 4
  training_rounds: 1
  batch_size: 4
optimizer:
  name: revel.optimizers.adamw
  lr: 1.0e-3
commands:
  train:
    name: revel.commands.train
    total_frames: 64
    batches_per_epoch: 2
";

const TINY_PPO: &str = "
name: tiny_ppo
seed: 3
env:
  name: revel.rl.env.cart_pole
model:
  name: revel.rl.models.stochastic_policy
  policy_layers: [16]
  value_layers: [16]
reinforcer:
  name: revel.rl.reinforcers.on_policy_iteration
  algo:
    name: revel.rl.algo.ppo
    entropy_coefficient: 0.01
    value_coefficient: 0.5
    cliprange: 0.2
    max_grad_norm: 0.5
  env_roller:
    name: revel.rl.env_roller.step
    parallel_envs: 2
    number_of_steps: 8
  batch_size: 8
  experience_replay: 2
  discount_factor: 0.99
  gae_lambda: 0.95
optimizer:
  name: revel.optimizers.adamw
  lr: 1.0e-3
commands:
  train:
    name: revel.commands.train
    total_frames: 32
    batches_per_epoch: 2
";

#[test]
fn dqn_stack_trains_an_epoch() {
    let config = ModelConfig::from_str(TINY_DQN).unwrap();
    let mut reinforcer = build_reinforcer(&config, &Device::Cpu).unwrap();
    reinforcer.initialize_training().unwrap();
    let report = reinforcer
        .train_epoch(&EpochInfo {
            epoch_idx: 1,
            batches_per_epoch: 2,
        })
        .unwrap();
    assert_eq!(report.frames, 16);
    assert_eq!(report.total_frames, 64);
    assert!(report.metrics.contains_key("loss"));
}

#[test]
fn ppo_stack_trains_an_epoch() {
    let config = ModelConfig::from_str(TINY_PPO).unwrap();
    let mut reinforcer = build_reinforcer(&config, &Device::Cpu).unwrap();
    reinforcer.initialize_training().unwrap();
    let report = reinforcer
        .train_epoch(&EpochInfo {
            epoch_idx: 1,
            batches_per_epoch: 2,
        })
        .unwrap();
    assert_eq!(report.frames, 32);
    assert!(report.metrics.contains_key("policy_loss"));
    assert!(report.metrics.contains_key("approx_kl"));
}

#[test]
fn progress_advances_towards_the_frame_budget() {
    let config = ModelConfig::from_str(TINY_PPO).unwrap();
    let mut reinforcer = build_reinforcer(&config, &Device::Cpu).unwrap();
    reinforcer.initialize_training().unwrap();
    assert_eq!(reinforcer.progress(), 0.);
    let epoch = EpochInfo {
        epoch_idx: 1,
        batches_per_epoch: 2,
    };
    reinforcer.train_epoch(&epoch).unwrap();
    assert_eq!(reinforcer.progress(), 1.);
}
