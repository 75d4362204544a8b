use super::backbone::{Backbone, BackboneSpec};
use candle_core::{DType, Device, Result, Tensor};
use candle_nn::{Linear, Module, VarBuilder, VarMap, linear};
use std::path::Path;

/// Action-value network: a backbone followed by a linear head with one
/// output per action. Owns its variables so that target copies can be
/// created and synced.
pub struct QModel {
    backbone: Backbone,
    head: Linear,
    varmap: VarMap,
    device: Device,
    input_dim: usize,
    action_size: usize,
    spec: BackboneSpec,
}

impl QModel {
    pub fn new(
        input_dim: usize,
        action_size: usize,
        spec: BackboneSpec,
        device: &Device,
    ) -> Result<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let backbone = spec.build(input_dim, &vb)?;
        let head = linear(backbone.output_dim(), action_size, vb.pp("head"))?;
        Ok(Self {
            backbone,
            head,
            varmap,
            device: device.clone(),
            input_dim,
            action_size,
            spec,
        })
    }

    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    pub fn action_size(&self) -> usize {
        self.action_size
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    /// Q-values for a batch of flattened observations, `(batch, actions)`.
    pub fn forward(&self, observations: &Tensor) -> Result<Tensor> {
        self.head.forward(&self.backbone.forward(observations)?)
    }

    /// Builds a fresh network with the same topology and copies the
    /// weights over. Used for target networks.
    pub fn duplicate(&self) -> Result<QModel> {
        let copy = QModel::new(self.input_dim, self.action_size, self.spec.clone(), &self.device)?;
        copy.sync_from(self)?;
        Ok(copy)
    }

    /// Overwrites this network's weights with `other`'s.
    pub fn sync_from(&self, other: &QModel) -> Result<()> {
        let own = self.varmap.data().lock().unwrap();
        let theirs = other.varmap.data().lock().unwrap();
        for (name, var) in own.iter() {
            let source = theirs
                .get(name)
                .expect("syncing networks with different topologies");
            var.set(source.as_tensor())?;
        }
        Ok(())
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.varmap.save(path)
    }

    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.varmap.load(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_model() -> QModel {
        QModel::new(
            4,
            2,
            BackboneSpec::Mlp {
                hidden_layers: vec![8],
            },
            &Device::Cpu,
        )
        .unwrap()
    }

    #[test]
    fn forward_has_one_output_per_action() {
        let model = tiny_model();
        let obs = Tensor::zeros((3, 4), DType::F32, &Device::Cpu).unwrap();
        let q = model.forward(&obs).unwrap();
        assert_eq!(q.dims(), &[3, 2]);
    }

    #[test]
    fn nature_cnn_forward_has_one_output_per_action() {
        use super::super::backbone::NATURE_CNN_MIN_INPUT;
        let side = NATURE_CNN_MIN_INPUT;
        let stack = 2;
        let model = QModel::new(
            side * side * stack,
            4,
            BackboneSpec::NatureCnn {
                height: side,
                width: side,
                stack,
            },
            &Device::Cpu,
        )
        .unwrap();
        let obs = Tensor::rand(0f32, 1f32, (3, side * side * stack), &Device::Cpu).unwrap();
        let q = model.forward(&obs).unwrap();
        assert_eq!(q.dims(), &[3, 4]);
    }

    #[test]
    fn duplicate_predicts_the_same_values() {
        let model = tiny_model();
        let target = model.duplicate().unwrap();
        let obs = Tensor::rand(-1f32, 1f32, (5, 4), &Device::Cpu).unwrap();
        let q: Vec<f32> = model.forward(&obs).unwrap().flatten_all().unwrap().to_vec1().unwrap();
        let q_target: Vec<f32> =
            target.forward(&obs).unwrap().flatten_all().unwrap().to_vec1().unwrap();
        assert_eq!(q, q_target);
    }

    #[test]
    fn save_and_load_round_trip() {
        let model = tiny_model();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.safetensors");
        model.save(&path).unwrap();
        let mut other = tiny_model();
        other.load(&path).unwrap();
        let obs = Tensor::rand(-1f32, 1f32, (2, 4), &Device::Cpu).unwrap();
        let a: Vec<f32> = model.forward(&obs).unwrap().flatten_all().unwrap().to_vec1().unwrap();
        let b: Vec<f32> = other.forward(&obs).unwrap().flatten_all().unwrap().to_vec1().unwrap();
        assert_eq!(a, b);
    }
}
