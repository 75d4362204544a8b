use super::{BatchInfo, EpochInfo, EpochReport, MetricAverages, Reinforcer};
use crate::buffer::rollout::{RolloutBatch, gather_batch};
use crate::model::ActorCritic;
use crate::roller::step::StepRoller;
use candle_core::{Device, Result, Tensor};
use candle_nn::VarMap;
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};

/// An on-policy policy-gradient algorithm driven by rollout minibatches.
pub trait OnPolicyAlgo {
    fn initialize(&mut self, model: &ActorCritic) -> Result<()>;

    fn optimizer_step(
        &mut self,
        model: &ActorCritic,
        batch: &RolloutBatch,
        info: &mut BatchInfo,
    ) -> Result<()>;
}

#[derive(Debug, Clone, Copy)]
pub struct PolicyGradientSettings {
    pub batch_size: usize,
    /// How many times the rollout is replayed through the optimizer.
    pub experience_replay: usize,
    pub discount_factor: f32,
    pub gae_lambda: f32,
    pub total_frames: usize,
}

/// Calculates on-policy rollouts and trains the policy on them directly,
/// splitting each rollout into shuffled minibatches and optionally
/// replaying the experience a few times.
pub struct OnPolicyIterationReinforcer<A: OnPolicyAlgo> {
    settings: PolicyGradientSettings,
    roller: StepRoller,
    model: ActorCritic,
    algo: A,
    device: Device,
    frames: usize,
    batches: usize,
    rng: StdRng,
}

impl<A: OnPolicyAlgo> OnPolicyIterationReinforcer<A> {
    pub fn new(
        settings: PolicyGradientSettings,
        roller: StepRoller,
        model: ActorCritic,
        algo: A,
        device: &Device,
        seed: u64,
    ) -> Self {
        Self {
            settings,
            roller,
            model,
            algo,
            device: device.clone(),
            frames: 0,
            batches: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn model(&self) -> &ActorCritic {
        &self.model
    }

    fn train_batch(&mut self, info: &mut BatchInfo) -> Result<()> {
        let mut rollouts = self.roller.rollout(&self.model)?;
        for rollout in rollouts.iter_mut() {
            let states = Tensor::stack(&rollout.states, 0)?;
            let values: Vec<f32> = self.model.values(&states)?.to_vec1()?;
            rollout.calculate_advantages_and_returns(
                values,
                self.settings.discount_factor,
                self.settings.gae_lambda,
            );
        }
        let mut indices: Vec<(usize, usize)> = rollouts
            .iter()
            .enumerate()
            .flat_map(|(rollout_idx, rollout)| {
                (0..rollout.len()).map(move |step| (rollout_idx, step))
            })
            .collect();
        self.frames += indices.len();
        for _ in 0..self.settings.experience_replay {
            indices.shuffle(&mut self.rng);
            for chunk in indices.chunks(self.settings.batch_size) {
                let batch = gather_batch(&rollouts, chunk, &self.device)?;
                self.algo.optimizer_step(&self.model, &batch, info)?;
            }
        }
        Ok(())
    }
}

impl<A: OnPolicyAlgo> Reinforcer for OnPolicyIterationReinforcer<A> {
    fn initialize_training(&mut self) -> Result<()> {
        self.algo.initialize(&self.model)
    }

    fn train_epoch(&mut self, epoch: &EpochInfo) -> Result<EpochReport> {
        let mut averages = MetricAverages::default();
        for _ in 0..epoch.batches_per_epoch {
            let mut info = BatchInfo::new(self.batches, self.progress());
            self.batches += 1;
            self.train_batch(&mut info)?;
            averages.absorb(&info);
        }
        let mut report = EpochReport {
            epoch_idx: epoch.epoch_idx,
            frames: self.frames,
            total_frames: self.settings.total_frames,
            metrics: averages.finalize(),
            ..Default::default()
        };
        report.summarize_episodes(&self.roller.take_finished_episodes());
        Ok(report)
    }

    fn frames(&self) -> usize {
        self.frames
    }

    fn total_frames(&self) -> usize {
        self.settings.total_frames
    }

    fn varmap(&self) -> &VarMap {
        self.model.varmap()
    }
}
