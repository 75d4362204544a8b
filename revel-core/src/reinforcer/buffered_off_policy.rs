use super::{BatchInfo, EpochInfo, EpochReport, MetricAverages, Reinforcer};
use crate::model::QModel;
use crate::roller::TransitionTensors;
use crate::roller::replay_q::ReplayQRoller;
use candle_core::Result;
use candle_nn::VarMap;

/// An off-policy value-learning algorithm driven by sampled replay
/// batches.
pub trait OffPolicyAlgo {
    fn initialize(&mut self, model: &QModel) -> Result<()>;

    fn optimizer_step(
        &mut self,
        model: &QModel,
        batch: &TransitionTensors,
        info: &mut BatchInfo,
    ) -> Result<()>;
}

#[derive(Debug, Clone, Copy)]
pub struct OffPolicySettings {
    /// Roller steps taken per batch before training.
    pub rollout_rounds: usize,
    /// Sampled optimizer steps per batch.
    pub training_rounds: usize,
    pub batch_size: usize,
    pub total_frames: usize,
}

/// Interleaves experience collection with sampled training rounds: each
/// batch first rolls the environments a few steps into the replay buffer,
/// then replays uniformly sampled transitions through the algorithm.
pub struct BufferedOffPolicyIterationReinforcer<A: OffPolicyAlgo> {
    settings: OffPolicySettings,
    roller: ReplayQRoller,
    model: QModel,
    algo: A,
    frames: usize,
    batches: usize,
}

impl<A: OffPolicyAlgo> BufferedOffPolicyIterationReinforcer<A> {
    pub fn new(settings: OffPolicySettings, roller: ReplayQRoller, model: QModel, algo: A) -> Self {
        Self {
            settings,
            roller,
            model,
            algo,
            frames: 0,
            batches: 0,
        }
    }

    pub fn model(&self) -> &QModel {
        &self.model
    }

    fn train_batch(&mut self, info: &mut BatchInfo) -> Result<()> {
        for _ in 0..self.settings.rollout_rounds {
            self.frames += self.roller.rollout(&self.model, info.progress)?;
        }
        for _ in 0..self.settings.training_rounds {
            let Some(batch) = self.roller.sample_batch(self.settings.batch_size)? else {
                break;
            };
            self.algo.optimizer_step(&self.model, &batch, info)?;
        }
        Ok(())
    }
}

impl<A: OffPolicyAlgo> Reinforcer for BufferedOffPolicyIterationReinforcer<A> {
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
