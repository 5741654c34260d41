pub mod load;

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv1d, Conv1dConfig},
        pool::{AdaptiveAvgPool1d, AdaptiveAvgPool1dConfig, MaxPool1d, MaxPool1dConfig},
        BatchNorm, BatchNormConfig, Linear, LinearConfig, PaddingConfig1d,
    },
    tensor::{
        activation::{relu, tanh},
        backend::Backend,
        Tensor,
    },
};

use crate::loss::TaskType;

/// `(n_in_channel, n_embed_channel)` of the four residual stages.
pub const BLOCK_SCHEDULE: [(usize, usize); 4] = [(32, 32), (128, 64), (256, 128), (512, 256)];

/// Channels leaving the stem.
pub const STEM_CHANNELS: usize = 32;

/// Width of the pooled feature vector fed to the fully-connected stack.
pub const FEATURE_SIZE: usize = 4 * BLOCK_SCHEDULE[3].1;

/// Shortest signal the stem convolution accepts.
pub const MIN_SIGNAL_LENGTH: usize = 5;

#[derive(Config, Debug, PartialEq)]
pub struct ResNet1dConfig {
    pub in_channel: usize,
    #[config(default = "vec![64, 16]")]
    pub fc_size: Vec<usize>,
    #[config(default = 4)]
    pub label_size: usize,
    /// Task the predictor was trained for; selects the output activation.
    #[config(default = "None")]
    pub task: Option<TaskType>,
}

impl ResNet1dConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ResNet1d<B> {
        let conv = Conv1dConfig::new(self.in_channel, STEM_CHANNELS, 5)
            .with_stride(2)
            .with_padding(PaddingConfig1d::Explicit(0))
            .init(device);
        let norm = BatchNormConfig::new(STEM_CHANNELS).init(device);
        let pool = MaxPool1dConfig::new(5)
            .with_stride(2)
            .with_padding(PaddingConfig1d::Explicit(2))
            .init();

        let blocks: Vec<_> = BLOCK_SCHEDULE
            .iter()
            .map(|&(n_in, n_embed)| ResidualBlockConfig::new(n_in, n_embed).init(device))
            .collect();

        let gap = AdaptiveAvgPool1dConfig::new(1).init();

        let mut n_in = FEATURE_SIZE;
        let mut fc_layers = Vec::with_capacity(self.fc_size.len());
        for &n_out in &self.fc_size {
            fc_layers.push(LinearConfig::new(n_in, n_out).init(device));
            n_in = n_out;
        }
        let classifier = LinearConfig::new(n_in, self.label_size).init(device);

        ResNet1d {
            conv,
            norm,
            pool,
            blocks,
            gap,
            fc_layers,
            classifier,
        }
    }

    /// Temporal extent left after the stem and the four residual blocks,
    /// or `None` when `length` is too short for the stem convolution.
    pub fn feature_length(length: usize) -> Option<usize> {
        if length < MIN_SIGNAL_LENGTH {
            return None;
        }

        // conv k5 s2 p0, then max-pool k5 s2 p2
        let stem = (length - 5) / 2 + 1;
        let pooled = stem.div_ceil(2);

        Some(BLOCK_SCHEDULE.iter().fold(pooled, |n, _| n.div_ceil(2)))
    }
}

/// One-dimensional residual network mapping `[batch, in_channel, length]`
/// signals to `[batch, label_size]` logits.
#[derive(Module, Debug)]
pub struct ResNet1d<B: Backend> {
    conv: Conv1d<B>,
    norm: BatchNorm<B, 1>,
    pool: MaxPool1d,
    blocks: Vec<ResidualBlock<B>>,
    gap: AdaptiveAvgPool1d,
    fc_layers: Vec<Linear<B>>,
    classifier: Linear<B>,
}

impl<B: Backend> ResNet1d<B> {
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 2> {
        let x = self.features(x);

        let x = self.gap.forward(x).flatten::<2>(1, 2);
        let x = self
            .fc_layers
            .iter()
            .fold(x, |x, fc| tanh(fc.forward(x)));

        return self.classifier.forward(x);
    }

    /// Output of the last residual block, `[batch, 1024, feature_length]`.
    pub fn features(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let x = relu(self.norm.forward(self.conv.forward(x)));
        let x = self.pool.forward(x);

        self.blocks.iter().fold(x, |x, block| block.forward(x))
    }

    pub fn n_fc_layers(&self) -> usize {
        self.fc_layers.len()
    }

    /// Weight shapes of every convolution and linear layer, in forward order.
    pub fn signature(&self) -> Vec<Vec<usize>> {
        let mut shapes = vec![self.conv.weight.val().dims().to_vec()];
        for block in &self.blocks {
            shapes.extend(block.signature());
        }
        for fc in &self.fc_layers {
            shapes.push(fc.weight.val().dims().to_vec());
        }
        shapes.push(self.classifier.weight.val().dims().to_vec());

        shapes
    }
}

#[derive(Config, Debug)]
pub struct ResidualBlockConfig {
    n_in_channel: usize,
    n_embed_channel: usize,
}

impl ResidualBlockConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ResidualBlock<B> {
        let n_out_channel = 4 * self.n_embed_channel;

        let conv1 = Conv1dConfig::new(self.n_in_channel, self.n_embed_channel, 1)
            .with_stride(2)
            .init(device);
        let norm1 = BatchNormConfig::new(self.n_embed_channel).init(device);
        let conv2 = Conv1dConfig::new(self.n_embed_channel, self.n_embed_channel, 3)
            .with_padding(PaddingConfig1d::Explicit(1))
            .init(device);
        let norm2 = BatchNormConfig::new(self.n_embed_channel).init(device);
        let conv3 = Conv1dConfig::new(self.n_embed_channel, n_out_channel, 1).init(device);
        let norm3 = BatchNormConfig::new(n_out_channel).init(device);

        let shortcut = Conv1dConfig::new(self.n_in_channel, n_out_channel, 3)
            .with_stride(2)
            .with_padding(PaddingConfig1d::Explicit(1))
            .init(device);
        let shortcut_norm = BatchNormConfig::new(n_out_channel).init(device);

        ResidualBlock {
            conv1,
            norm1,
            conv2,
            norm2,
            conv3,
            norm3,
            shortcut,
            shortcut_norm,
        }
    }
}

/// Bottleneck block halving the temporal axis and expanding channels to
/// `4 * n_embed_channel`. The shortcut convolution matches both so the two
/// paths can be summed.
#[derive(Module, Debug)]
pub struct ResidualBlock<B: Backend> {
    conv1: Conv1d<B>,
    norm1: BatchNorm<B, 1>,
    conv2: Conv1d<B>,
    norm2: BatchNorm<B, 1>,
    conv3: Conv1d<B>,
    norm3: BatchNorm<B, 1>,
    shortcut: Conv1d<B>,
    shortcut_norm: BatchNorm<B, 1>,
}

impl<B: Backend> ResidualBlock<B> {
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let residual = self.shortcut_norm.forward(self.shortcut.forward(x.clone()));

        let x = relu(self.norm1.forward(self.conv1.forward(x)));
        let x = relu(self.norm2.forward(self.conv2.forward(x)));
        let x = self.norm3.forward(self.conv3.forward(x));

        relu(x + residual)
    }

    fn signature(&self) -> Vec<Vec<usize>> {
        [&self.conv1, &self.conv2, &self.conv3, &self.shortcut]
            .iter()
            .map(|conv| conv.weight.val().dims().to_vec())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn residual_block_halves_length_and_expands_channels() {
        let device = Default::default();

        for &(n_in, n_embed, length) in &[(32, 32, 50), (128, 64, 13), (3, 8, 1), (16, 4, 2)] {
            let block: ResidualBlock<TestBackend> =
                ResidualBlockConfig::new(n_in, n_embed).init(&device);
            let x = Tensor::<TestBackend, 3>::random(
                [2, n_in, length],
                burn::tensor::Distribution::Normal(0.0, 1.0),
                &device,
            );

            let out = block.forward(x);
            assert_eq!(out.dims(), [2, 4 * n_embed, length.div_ceil(2)]);
        }
    }

    #[test]
    fn residual_block_output_is_rectified() {
        let device = Default::default();
        let block: ResidualBlock<TestBackend> = ResidualBlockConfig::new(4, 2).init(&device);
        let x = Tensor::<TestBackend, 3>::random(
            [3, 4, 21],
            burn::tensor::Distribution::Normal(0.0, 5.0),
            &device,
        );

        let min = block
            .forward(x)
            .min()
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .unwrap()[0];
        assert!(min >= 0.0);
    }

    #[test]
    fn predictor_output_does_not_depend_on_length() {
        let device = Default::default();
        let config = ResNet1dConfig::new(2).with_label_size(3);
        let model: ResNet1d<TestBackend> = config.init(&device);

        for length in [MIN_SIGNAL_LENGTH, 64, 200, 517] {
            let x = Tensor::<TestBackend, 3>::zeros([2, 2, length], &device);
            assert_eq!(model.forward(x).dims(), [2, 3]);
        }
    }

    #[test]
    fn predictor_honours_fc_stack() {
        let device = Default::default();
        let config = ResNet1dConfig::new(1)
            .with_fc_size(vec![32, 8, 4])
            .with_label_size(5);
        let model: ResNet1d<TestBackend> = config.init(&device);

        assert_eq!(model.n_fc_layers(), 3);
        let signature = model.signature();
        assert_eq!(signature[0], vec![STEM_CHANNELS, 1, 5]);
        assert_eq!(signature[signature.len() - 1], vec![4, 5]);

        let x = Tensor::<TestBackend, 3>::zeros([1, 1, 100], &device);
        assert_eq!(model.forward(x).dims(), [1, 5]);
    }

    #[test]
    fn predictor_without_hidden_layers() {
        let device = Default::default();
        let config = ResNet1dConfig::new(3).with_fc_size(vec![]).with_label_size(2);
        let model: ResNet1d<TestBackend> = config.init(&device);

        let x = Tensor::<TestBackend, 3>::zeros([4, 3, 40], &device);
        assert_eq!(model.forward(x).dims(), [4, 2]);
    }

    #[test]
    fn feature_length_matches_forward() {
        let device = Default::default();
        let model: ResNet1d<TestBackend> = ResNet1dConfig::new(1).init(&device);

        for length in [5, 6, 31, 200, 333] {
            let x = Tensor::<TestBackend, 3>::zeros([1, 1, length], &device);
            let [_, channels, n] = model.features(x).dims();
            assert_eq!(channels, FEATURE_SIZE);
            assert_eq!(Some(n), ResNet1dConfig::feature_length(length));
        }

        assert_eq!(ResNet1dConfig::feature_length(4), None);
        assert_eq!(ResNet1dConfig::feature_length(200), Some(4));
    }
}
