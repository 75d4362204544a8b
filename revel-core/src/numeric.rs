use candle_core::{Device, Result, Tensor};

/// A dense f32 array with an explicit shape. Observations, actions and
/// sampled batches move through the framework as frames and are only
/// turned into tensors at the model boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    data: Vec<f32>,
    shape: Vec<usize>,
}

impl Frame {
    pub fn new(data: Vec<f32>, shape: Vec<usize>) -> Self {
        assert_eq!(
            data.len(),
            shape.iter().product::<usize>(),
            "frame data does not match its shape"
        );
        Self { data, shape }
    }

    pub fn from_vec(data: Vec<f32>) -> Self {
        let shape = vec![data.len()];
        Self { data, shape }
    }

    pub fn zeros(shape: Vec<usize>) -> Self {
        let numel = shape.iter().product();
        Self {
            data: vec![0.; numel],
            shape,
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// Extracts the `idx`-th sub frame along the leading axis.
    pub fn subframe(&self, idx: usize) -> Frame {
        assert!(!self.shape.is_empty() && idx < self.shape[0]);
        let stride: usize = self.shape[1..].iter().product();
        Frame::new(
            self.data[idx * stride..(idx + 1) * stride].to_vec(),
            self.shape[1..].to_vec(),
        )
    }

    pub fn to_tensor(&self, device: &Device) -> Result<Tensor> {
        Tensor::from_slice(&self.data, self.shape.as_slice(), device)
    }

    /// Flattened rank-1 tensor view of the frame.
    pub fn to_flat_tensor(&self, device: &Device) -> Result<Tensor> {
        Tensor::from_slice(&self.data, self.data.len(), device)
    }
}
