use candle_core::{Result, Tensor, Var, backprop::GradStore};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, SGD, VarMap};

/// Rescales the gradients of `vars` so their global norm stays below
/// `max_norm`.
fn clip_grad(loss: &Tensor, vars: &[Var], max_norm: f32) -> Result<GradStore> {
    let mut total_norm_squared = 0.0f32;
    let mut grad_store = loss.backward()?;
    let mut clipped = vec![];
    for var in vars.iter() {
        if let Some(grad) = grad_store.get_id(var.id()) {
            let grad_norm_sq = grad.sqr()?.sum_all()?.to_scalar::<f32>()?;
            total_norm_squared += grad_norm_sq;
            clipped.push(var);
        }
    }
    let total_norm = total_norm_squared.sqrt();
    if total_norm > max_norm {
        let clip_coef = max_norm / (total_norm + 1e-6);
        for var in clipped {
            let old_grad = grad_store.get_id(var.id()).unwrap();
            let new_grad = old_grad.affine(clip_coef as f64, 0.)?;
            grad_store.insert(var.as_tensor(), new_grad);
        }
    }
    Ok(grad_store)
}

pub enum OptimizerKind {
    AdamW(AdamW),
    Sgd(SGD),
}

impl OptimizerKind {
    fn step(&mut self, grads: &GradStore) -> Result<()> {
        match self {
            Self::AdamW(optimizer) => optimizer.step(grads),
            Self::Sgd(optimizer) => optimizer.step(grads),
        }
    }

    pub fn learning_rate(&self) -> f64 {
        match self {
            Self::AdamW(optimizer) => optimizer.learning_rate(),
            Self::Sgd(optimizer) => optimizer.learning_rate(),
        }
    }
}

/// A declarative optimizer description, turned into a live optimizer once
/// the model's varmap exists.
#[derive(Debug, Clone)]
pub enum OptimizerSpec {
    AdamW {
        learning_rate: f64,
        beta1: f64,
        beta2: f64,
        eps: f64,
        weight_decay: f64,
    },
    Sgd {
        learning_rate: f64,
    },
}

impl OptimizerSpec {
    pub fn build(&self, varmap: &VarMap, max_grad_norm: Option<f32>) -> Result<OptimizerWithMaxGrad> {
        match *self {
            Self::AdamW {
                learning_rate,
                beta1,
                beta2,
                eps,
                weight_decay,
            } => {
                let params = ParamsAdamW {
                    lr: learning_rate,
                    beta1,
                    beta2,
                    eps,
                    weight_decay,
                };
                OptimizerWithMaxGrad::adamw(varmap, params, max_grad_norm)
            }
            Self::Sgd { learning_rate } => {
                OptimizerWithMaxGrad::sgd(varmap, learning_rate, max_grad_norm)
            }
        }
    }
}

/// An optimizer over a model's varmap with optional gradient clipping.
pub struct OptimizerWithMaxGrad {
    optimizer: OptimizerKind,
    max_grad_norm: Option<f32>,
    vars: Vec<Var>,
}

impl OptimizerWithMaxGrad {
    pub fn adamw(
        varmap: &VarMap,
        params: ParamsAdamW,
        max_grad_norm: Option<f32>,
    ) -> Result<Self> {
        let vars = varmap.all_vars();
        let optimizer = AdamW::new(vars.clone(), params)?;
        Ok(Self {
            optimizer: OptimizerKind::AdamW(optimizer),
            max_grad_norm,
            vars,
        })
    }

    pub fn sgd(varmap: &VarMap, learning_rate: f64, max_grad_norm: Option<f32>) -> Result<Self> {
        let vars = varmap.all_vars();
        let optimizer = SGD::new(vars.clone(), learning_rate)?;
        Ok(Self {
            optimizer: OptimizerKind::Sgd(optimizer),
            max_grad_norm,
            vars,
        })
    }

    pub fn learning_rate(&self) -> f64 {
        self.optimizer.learning_rate()
    }

    pub fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        let grads = if let Some(max_norm) = self.max_grad_norm {
            clip_grad(loss, &self.vars, max_norm)?
        } else {
            loss.backward()?
        };
        self.optimizer.step(&grads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::{Linear, Module, VarBuilder, linear};

    #[test]
    fn backward_step_reduces_a_quadratic_loss() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let layer: Linear = linear(2, 1, vb.pp("l")).unwrap();
        let params = ParamsAdamW {
            lr: 0.1,
            ..Default::default()
        };
        let mut optimizer = OptimizerWithMaxGrad::adamw(&varmap, params, Some(0.5)).unwrap();
        let xs = Tensor::from_vec(vec![1f32, -1., 0.5, 2.], (2, 2), &device).unwrap();
        let loss_value = |layer: &Linear| -> f32 {
            layer
                .forward(&xs)
                .unwrap()
                .sqr()
                .unwrap()
                .mean_all()
                .unwrap()
                .to_scalar()
                .unwrap()
        };
        let before = loss_value(&layer);
        for _ in 0..50 {
            let loss = layer.forward(&xs).unwrap().sqr().unwrap().mean_all().unwrap();
            optimizer.backward_step(&loss).unwrap();
        }
        let after = loss_value(&layer);
        assert!(after < before);
    }
}
