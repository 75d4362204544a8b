use candle_core::{D, Result, Tensor, bail};
use revel_core::model::QModel;
use revel_core::optim::{OptimizerSpec, OptimizerWithMaxGrad};
use revel_core::reinforcer::BatchInfo;
use revel_core::reinforcer::buffered_off_policy::OffPolicyAlgo;
use revel_core::roller::TransitionTensors;

#[derive(Debug, Clone)]
pub struct DqnSettings {
    pub discount_factor: f32,
    /// Optimizer batches between target network syncs.
    pub target_update_frequency: usize,
    pub max_grad_norm: Option<f32>,
    /// Bootstrap from the target network's own argmax instead of the
    /// online network's. The decoupled variant is the default as it
    /// removes the maximization bias of the classic update.
    pub double: bool,
}

/// Deep q-learning with a periodically synced target network. Action
/// selection for the bootstrap uses the online network (double
/// q-learning) unless configured otherwise.
pub struct DeepQLearning {
    settings: DqnSettings,
    optimizer_spec: OptimizerSpec,
    optimizer: Option<OptimizerWithMaxGrad>,
    target: Option<QModel>,
    batches_since_sync: usize,
}

impl DeepQLearning {
    pub fn new(settings: DqnSettings, optimizer_spec: OptimizerSpec) -> Self {
        Self {
            settings,
            optimizer_spec,
            optimizer: None,
            target: None,
            batches_since_sync: 0,
        }
    }

    /// Smooth l1 loss, quadratic within one unit of the target and linear
    /// outside, so large td-errors do not blow up the gradients.
    fn huber_loss(predictions: &Tensor, targets: &Tensor) -> Result<Tensor> {
        let diff = (predictions - targets)?;
        let abs = diff.abs()?;
        let quadratic = diff.sqr()?.affine(0.5, 0.)?;
        let linear = abs.affine(1., -0.5)?;
        let ones = Tensor::ones_like(&abs)?;
        abs.lt(&ones)?.where_cond(&quadratic, &linear)?.mean_all()
    }

    fn bootstrap_values(&self, model: &QModel, batch: &TransitionTensors) -> Result<Tensor> {
        let Some(target) = self.target.as_ref() else {
            bail!("deep q-learning used before initialization")
        };
        let q_target = target.forward(&batch.next_observations)?.detach();
        let best_actions = if self.settings.double {
            model
                .forward(&batch.next_observations)?
                .detach()
                .argmax(D::Minus1)?
        } else {
            q_target.argmax(D::Minus1)?
        };
        q_target.gather(&best_actions.unsqueeze(1)?, 1)?.squeeze(1)
    }
}

impl OffPolicyAlgo for DeepQLearning {
    fn initialize(&mut self, model: &QModel) -> Result<()> {
        self.target = Some(model.duplicate()?);
        self.optimizer = Some(
            self.optimizer_spec
                .build(model.varmap(), self.settings.max_grad_norm)?,
        );
        self.batches_since_sync = 0;
        Ok(())
    }

    fn optimizer_step(
        &mut self,
        model: &QModel,
        batch: &TransitionTensors,
        info: &mut BatchInfo,
    ) -> Result<()> {
        let q_values = model.forward(&batch.observations)?;
        let q_taken = q_values
            .gather(&batch.actions.unsqueeze(1)?, 1)?
            .squeeze(1)?;

        let next_values = self.bootstrap_values(model, batch)?;
        let not_done = batch.dones.affine(-1., 1.)?;
        let discounted = (not_done * next_values)?.affine(self.settings.discount_factor as f64, 0.)?;
        let td_targets = (&batch.rewards + discounted)?.detach();

        let loss = Self::huber_loss(&q_taken, &td_targets)?;
        let Some(optimizer) = self.optimizer.as_mut() else {
            bail!("deep q-learning used before initialization")
        };
        optimizer.backward_step(&loss)?;

        self.batches_since_sync += 1;
        if self.batches_since_sync >= self.settings.target_update_frequency {
            let Some(target) = self.target.as_ref() else {
                bail!("deep q-learning used before initialization")
            };
            target.sync_from(model)?;
            self.batches_since_sync = 0;
        }

        info.record("loss", loss.to_scalar::<f32>()?);
        info.record("q_mean", q_taken.mean_all()?.to_scalar::<f32>()?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;
    use revel_core::model::BackboneSpec;

    fn settings() -> DqnSettings {
        DqnSettings {
            discount_factor: 0.99,
            target_update_frequency: 2,
            max_grad_norm: Some(0.5),
            double: true,
        }
    }

    fn optimizer_spec() -> OptimizerSpec {
        OptimizerSpec::AdamW {
            learning_rate: 1e-3,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            weight_decay: 0.,
        }
    }

    fn tiny_model(device: &Device) -> QModel {
        QModel::new(
            3,
            2,
            BackboneSpec::Mlp {
                hidden_layers: vec![8],
            },
            device,
        )
        .unwrap()
    }

    fn constant_batch(device: &Device) -> TransitionTensors {
        let rows = 4;
        TransitionTensors {
            observations: Tensor::ones((rows, 3), candle_core::DType::F32, device).unwrap(),
            actions: Tensor::zeros(rows, candle_core::DType::U32, device).unwrap(),
            rewards: Tensor::ones(rows, candle_core::DType::F32, device).unwrap(),
            dones: Tensor::ones(rows, candle_core::DType::F32, device).unwrap(),
            next_observations: Tensor::ones((rows, 3), candle_core::DType::F32, device).unwrap(),
        }
    }

    #[test]
    fn huber_loss_is_quadratic_inside_and_linear_outside() {
        let device = Device::Cpu;
        let predictions = Tensor::from_vec(vec![0.5f32, 3.], 2, &device).unwrap();
        let targets = Tensor::zeros(2, candle_core::DType::F32, &device).unwrap();
        let loss = DeepQLearning::huber_loss(&predictions, &targets).unwrap();
        let expected = (0.5 * 0.5 * 0.5 + (3. - 0.5)) / 2.;
        assert!((loss.to_scalar::<f32>().unwrap() - expected).abs() < 1e-6);
    }

    #[test]
    fn learns_the_value_of_a_terminal_reward() {
        let device = Device::Cpu;
        let model = tiny_model(&device);
        let mut algo = DeepQLearning::new(settings(), optimizer_spec());
        algo.initialize(&model).unwrap();
        let batch = constant_batch(&device);
        // every transition is terminal with reward 1, so q(s, 0) -> 1
        for _ in 0..300 {
            let mut info = BatchInfo::new(0, 0.);
            algo.optimizer_step(&model, &batch, &mut info).unwrap();
        }
        let q: Vec<f32> = model
            .forward(&batch.observations)
            .unwrap()
            .narrow(1, 0, 1)
            .unwrap()
            .flatten_all()
            .unwrap()
            .to_vec1()
            .unwrap();
        assert!((q[0] - 1.).abs() < 0.1);
    }

    #[test]
    fn target_network_lags_behind_the_online_network() {
        let device = Device::Cpu;
        let model = tiny_model(&device);
        let mut algo = DeepQLearning::new(
            DqnSettings {
                target_update_frequency: 1000,
                ..settings()
            },
            optimizer_spec(),
        );
        algo.initialize(&model).unwrap();
        let batch = constant_batch(&device);
        let mut info = BatchInfo::new(0, 0.);
        for _ in 0..10 {
            algo.optimizer_step(&model, &batch, &mut info).unwrap();
        }
        let obs = batch.observations.clone();
        let online: Vec<f32> = model
            .forward(&obs)
            .unwrap()
            .flatten_all()
            .unwrap()
            .to_vec1()
            .unwrap();
        let lagging: Vec<f32> = algo
            .target
            .as_ref()
            .unwrap()
            .forward(&obs)
            .unwrap()
            .flatten_all()
            .unwrap()
            .to_vec1()
            .unwrap();
        assert_ne!(online, lagging);
    }
}
