use candle_core::{Result, Tensor};
use candle_nn::{
    Activation, Conv2d, Conv2dConfig, Linear, Module, Sequential, VarBuilder, conv2d, linear, seq,
};

/// Builds a linear stack with ReLU between the layers and nothing after
/// the last one.
pub fn build_sequential(
    input_dim: usize,
    layers: &[usize],
    vb: &VarBuilder,
    prefix: &str,
) -> Result<(Sequential, usize)> {
    let mut last_dim = input_dim;
    let mut nn = seq();
    let num_layers = layers.len();
    for (layer_idx, layer_size) in layers.iter().enumerate() {
        let layer_pp = format!("{prefix}{layer_idx}");
        if layer_idx == num_layers - 1 {
            nn = nn.add(linear(last_dim, *layer_size, vb.pp(layer_pp))?)
        } else {
            nn = nn
                .add(linear(last_dim, *layer_size, vb.pp(layer_pp))?)
                .add(Activation::Relu);
        }
        last_dim = *layer_size;
    }
    Ok((nn, last_dim))
}

/// Architecture of a feature extractor, kept around so target networks
/// can be rebuilt with the exact same topology.
#[derive(Debug, Clone)]
pub enum BackboneSpec {
    Mlp { hidden_layers: Vec<usize> },
    /// Stacked-frame image input of `height * width * stack`, trailing
    /// stack axis.
    NatureCnn { height: usize, width: usize, stack: usize },
}

impl BackboneSpec {
    pub fn build(&self, input_dim: usize, vb: &VarBuilder) -> Result<Backbone> {
        match self {
            Self::Mlp { hidden_layers } => Backbone::mlp(input_dim, hidden_layers, vb),
            Self::NatureCnn { height, width, stack } => {
                assert_eq!(
                    input_dim,
                    height * width * stack,
                    "cnn input does not match the observation size"
                );
                Backbone::nature_cnn(*height, *width, *stack, vb)
            }
        }
    }
}

fn conv_out(size: usize, kernel: usize, stride: usize) -> usize {
    (size - kernel) / stride + 1
}

/// Smallest input side the three conv layers accept: anything below
/// leaves the last conv without a full 3x3 window.
pub const NATURE_CNN_MIN_INPUT: usize = 36;

/// Feature extractor in front of a model head. Consumes flattened
/// observation batches of shape `(batch, input_dim)`.
pub enum Backbone {
    Mlp {
        net: Sequential,
        output_dim: usize,
    },
    /// The DQN convolutional stack: 8x8/4, 4x4/2, 3x3/1, then a 512-wide
    /// linear layer.
    NatureCnn {
        conv1: Conv2d,
        conv2: Conv2d,
        conv3: Conv2d,
        fc: Linear,
        height: usize,
        width: usize,
        stack: usize,
    },
}

impl Backbone {
    pub fn mlp(input_dim: usize, hidden_layers: &[usize], vb: &VarBuilder) -> Result<Self> {
        assert!(!hidden_layers.is_empty(), "an mlp backbone needs at least one hidden layer");
        let mut nn = seq();
        let mut last_dim = input_dim;
        for (layer_idx, layer_size) in hidden_layers.iter().enumerate() {
            let layer_pp = format!("backbone{layer_idx}");
            nn = nn
                .add(linear(last_dim, *layer_size, vb.pp(layer_pp))?)
                .add(Activation::Relu);
            last_dim = *layer_size;
        }
        Ok(Self::Mlp {
            net: nn,
            output_dim: last_dim,
        })
    }

    pub fn nature_cnn(height: usize, width: usize, stack: usize, vb: &VarBuilder) -> Result<Self> {
        assert!(
            height >= NATURE_CNN_MIN_INPUT && width >= NATURE_CNN_MIN_INPUT,
            "the nature cnn needs at least {NATURE_CNN_MIN_INPUT}x{NATURE_CNN_MIN_INPUT} observations"
        );
        let stride = |s| Conv2dConfig {
            stride: s,
            ..Default::default()
        };
        let conv1 = conv2d(stack, 32, 8, stride(4), vb.pp("conv1"))?;
        let conv2 = conv2d(32, 64, 4, stride(2), vb.pp("conv2"))?;
        let conv3 = conv2d(64, 64, 3, stride(1), vb.pp("conv3"))?;
        let h = conv_out(conv_out(conv_out(height, 8, 4), 4, 2), 3, 1);
        let w = conv_out(conv_out(conv_out(width, 8, 4), 4, 2), 3, 1);
        let fc = linear(64 * h * w, 512, vb.pp("fc"))?;
        Ok(Self::NatureCnn {
            conv1,
            conv2,
            conv3,
            fc,
            height,
            width,
            stack,
        })
    }

    pub fn output_dim(&self) -> usize {
        match self {
            Self::Mlp { output_dim, .. } => *output_dim,
            Self::NatureCnn { .. } => 512,
        }
    }

    pub fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        match self {
            Self::Mlp { net, .. } => net.forward(xs),
            Self::NatureCnn {
                conv1,
                conv2,
                conv3,
                fc,
                height,
                width,
                stack,
            } => {
                let batch = xs.dim(0)?;
                // frames are stored height x width x stack, convs want
                // the stack as channels
                let xs = xs
                    .reshape((batch, *height, *width, *stack))?
                    .permute((0, 3, 1, 2))?;
                let xs = conv1.forward(&xs)?.relu()?;
                let xs = conv2.forward(&xs)?.relu()?;
                let xs = conv3.forward(&xs)?.relu()?;
                fc.forward(&xs.flatten_from(1)?)?.relu()
            }
        }
    }
}
