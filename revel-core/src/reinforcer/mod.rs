pub mod buffered_off_policy;
pub mod on_policy;

use crate::env::vec_env::EpisodeRecord;
use candle_core::Result;
use candle_nn::VarMap;
use std::collections::BTreeMap;
use std::fmt;

pub struct EpochInfo {
    pub epoch_idx: usize,
    pub batches_per_epoch: usize,
}

/// Per-batch bookkeeping handed to the algorithms. Algorithms record
/// named scalars which get averaged into the epoch report.
pub struct BatchInfo {
    /// Global batch index, counted across epochs.
    pub batch_idx: usize,
    pub progress: f64,
    metrics: Vec<(&'static str, f32)>,
}

impl BatchInfo {
    pub fn new(batch_idx: usize, progress: f64) -> Self {
        Self {
            batch_idx,
            progress,
            metrics: vec![],
        }
    }

    pub fn record(&mut self, name: &'static str, value: f32) {
        self.metrics.push((name, value));
    }

    pub fn metrics(&self) -> &[(&'static str, f32)] {
        &self.metrics
    }
}

/// Running averages of the scalars recorded over an epoch.
#[derive(Default)]
pub(crate) struct MetricAverages {
    sums: BTreeMap<&'static str, (f32, usize)>,
}

impl MetricAverages {
    pub fn absorb(&mut self, info: &BatchInfo) {
        for (name, value) in info.metrics() {
            let entry = self.sums.entry(name).or_insert((0., 0));
            entry.0 += value;
            entry.1 += 1;
        }
    }

    pub fn finalize(self) -> BTreeMap<&'static str, f32> {
        self.sums
            .into_iter()
            .map(|(name, (sum, count))| (name, sum / count as f32))
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct EpochReport {
    pub epoch_idx: usize,
    pub frames: usize,
    pub total_frames: usize,
    pub episodes: usize,
    pub mean_episode_reward: f32,
    pub mean_episode_length: f32,
    pub metrics: BTreeMap<&'static str, f32>,
}

impl EpochReport {
    pub(crate) fn summarize_episodes(&mut self, records: &[EpisodeRecord]) {
        self.episodes = records.len();
        if records.is_empty() {
            return;
        }
        let rewards: f32 = records.iter().map(|r| r.reward).sum();
        let lengths: usize = records.iter().map(|r| r.length).sum();
        self.mean_episode_reward = rewards / records.len() as f32;
        self.mean_episode_length = lengths as f32 / records.len() as f32;
    }
}

impl fmt::Display for EpochReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "epoch {:>4} | frames {:>9}/{} | episodes {:>4} | reward/ep {:>8.2} | len/ep {:>7.1}",
            self.epoch_idx,
            self.frames,
            self.total_frames,
            self.episodes,
            self.mean_episode_reward,
            self.mean_episode_length,
        )?;
        for (name, value) in &self.metrics {
            write!(f, " | {name} {value:.4}")?;
        }
        Ok(())
    }
}

/// A full training procedure: owns the model, the roller and the
/// algorithm, and advances them one epoch at a time.
pub trait Reinforcer {
    fn initialize_training(&mut self) -> Result<()>;

    fn train_epoch(&mut self, epoch: &EpochInfo) -> Result<EpochReport>;

    /// Frames collected so far.
    fn frames(&self) -> usize;

    /// Frame budget of the whole run.
    fn total_frames(&self) -> usize;

    /// Variables of the trained model, for checkpointing.
    fn varmap(&self) -> &VarMap;

    fn progress(&self) -> f64 {
        (self.frames() as f64 / self.total_frames() as f64).min(1.)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_info_carries_the_global_batch_index() {
        let info = BatchInfo::new(7, 0.25);
        assert_eq!(info.batch_idx, 7);
        assert_eq!(info.progress, 0.25);
    }

    #[test]
    fn metric_averages_mean_the_recorded_scalars() {
        let mut averages = MetricAverages::default();
        for (batch_idx, loss) in [1., 3.].into_iter().enumerate() {
            let mut info = BatchInfo::new(batch_idx, 0.);
            info.record("loss", loss);
            averages.absorb(&info);
        }
        let metrics = averages.finalize();
        assert_eq!(metrics["loss"], 2.);
    }
}
