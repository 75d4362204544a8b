use candle_core::{Result, Tensor, bail};
use revel_core::buffer::rollout::RolloutBatch;
use revel_core::model::ActorCritic;
use revel_core::optim::{OptimizerSpec, OptimizerWithMaxGrad};
use revel_core::reinforcer::BatchInfo;
use revel_core::reinforcer::on_policy::OnPolicyAlgo;
use revel_core::schedule::{Schedule, ScheduleKind};

#[derive(Debug, Clone)]
pub struct PpoSettings {
    /// Ratio clipping range, possibly annealed over training.
    pub clip_range: ScheduleKind,
    pub entropy_coefficient: f32,
    pub value_coefficient: f32,
    pub normalize_advantage: bool,
    pub max_grad_norm: Option<f32>,
}

/// Proximal policy optimization with a clipped surrogate objective. The
/// value head is trained jointly, clipped around the rollout predictions
/// with the same range as the policy ratio.
pub struct Ppo {
    settings: PpoSettings,
    optimizer_spec: OptimizerSpec,
    optimizer: Option<OptimizerWithMaxGrad>,
}

impl Ppo {
    pub fn new(settings: PpoSettings, optimizer_spec: OptimizerSpec) -> Self {
        Self {
            settings,
            optimizer_spec,
            optimizer: None,
        }
    }

    fn normalized_advantages(advantages: &Tensor) -> Result<Tensor> {
        let mean = advantages.mean_all()?;
        let centered = advantages.broadcast_sub(&mean)?;
        let std = centered.sqr()?.mean_all()?.sqrt()?.to_scalar::<f32>()?;
        centered.affine(1. / (std as f64 + 1e-8), 0.)
    }
}

impl OnPolicyAlgo for Ppo {
    fn initialize(&mut self, model: &ActorCritic) -> Result<()> {
        self.optimizer = Some(
            self.optimizer_spec
                .build(model.varmap(), self.settings.max_grad_norm)?,
        );
        Ok(())
    }

    fn optimizer_step(
        &mut self,
        model: &ActorCritic,
        batch: &RolloutBatch,
        info: &mut BatchInfo,
    ) -> Result<()> {
        let clip = self.settings.clip_range.value(info.progress) as f32;

        let advantages = if self.settings.normalize_advantage {
            Self::normalized_advantages(&batch.advantages)?
        } else {
            batch.advantages.clone()
        };

        let logps = model.log_probs(&batch.observations, &batch.actions)?;
        let ratio = (&logps - &batch.logp_old)?.exp()?;
        let clipped_ratio = ratio.clamp(1. - clip, 1. + clip)?;
        let surrogate = (&advantages * &ratio)?.minimum(&(&advantages * &clipped_ratio)?)?;
        let policy_loss = surrogate.mean_all()?.neg()?;

        let values = model.values(&batch.observations)?;
        let clipped_values =
            (&batch.values + (&values - &batch.values)?.clamp(-clip, clip)?)?;
        let value_error = (&values - &batch.returns)?.sqr()?;
        let clipped_value_error = (&clipped_values - &batch.returns)?.sqr()?;
        let value_loss = value_error
            .maximum(&clipped_value_error)?
            .mean_all()?
            .affine(0.5, 0.)?;

        let entropy = model.entropy(&batch.observations)?.mean_all()?;

        let loss = (policy_loss.clone()
            + (value_loss.affine(self.settings.value_coefficient as f64, 0.)?
                - entropy.affine(self.settings.entropy_coefficient as f64, 0.)?)?)?;
        let Some(optimizer) = self.optimizer.as_mut() else {
            bail!("ppo used before initialization")
        };
        optimizer.backward_step(&loss)?;

        let approx_kl = (&batch.logp_old - &logps)?
            .sqr()?
            .mean_all()?
            .affine(0.5, 0.)?
            .to_scalar::<f32>()?;
        let ratios: Vec<f32> = ratio.flatten_all()?.to_vec1()?;
        let clipped = ratios.iter().filter(|r| (*r - 1.).abs() > clip).count();
        let clip_fraction = clipped as f32 / ratios.len() as f32;

        info.record("policy_loss", policy_loss.to_scalar::<f32>()?);
        info.record("value_loss", value_loss.to_scalar::<f32>()?);
        info.record("entropy", entropy.to_scalar::<f32>()?);
        info.record("approx_kl", approx_kl);
        info.record("clip_fraction", clip_fraction);
        Ok(())
    }
}
