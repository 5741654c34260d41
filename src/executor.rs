use burn::{
    module::Module,
    tensor::{backend::Backend, Tensor},
};

use crate::error::{Error, Result};
use crate::model::ResNet1d;

/// Runs the predictor over one or more devices. With several devices each
/// batch is split along its first axis, every shard runs on a replica placed
/// on its own device, and the logits are gathered on the primary device.
#[derive(Debug, Clone)]
pub struct ParallelExecutor<B: Backend> {
    devices: Vec<B::Device>,
}

impl<B: Backend> ParallelExecutor<B> {
    pub fn new(devices: Vec<B::Device>) -> Result<Self> {
        if devices.is_empty() {
            return Err(Error::config("gpu_ids", "at least one device ordinal"));
        }
        Ok(Self { devices })
    }

    pub fn primary(&self) -> &B::Device {
        &self.devices[0]
    }

    pub fn is_parallel(&self) -> bool {
        self.devices.len() > 1
    }

    pub fn forward(&self, model: &ResNet1d<B>, x: Tensor<B, 3>) -> Tensor<B, 2> {
        if !self.is_parallel() {
            return model.forward(x);
        }

        let [n_batch, _, _] = x.dims();
        let n_shards = self.devices.len().min(n_batch);

        // replicas keep the autodiff graph, so gradients reach the primary weights
        let outputs: Vec<_> = x
            .chunk(n_shards, 0)
            .into_iter()
            .zip(&self.devices)
            .map(|(shard, device)| {
                let replica = model.clone().to_device(device);
                replica.forward(shard.to_device(device)).to_device(self.primary())
            })
            .collect();

        Tensor::cat(outputs, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ResNet1dConfig;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn shards_and_gathers_across_devices() {
        let device = Default::default();
        let model: ResNet1d<TestBackend> = ResNet1dConfig::new(1).with_label_size(2).init(&device);
        let x = Tensor::<TestBackend, 3>::random(
            [5, 1, 40],
            burn::tensor::Distribution::Default,
            &device,
        );

        let single = ParallelExecutor::<TestBackend>::new(vec![device.clone()]).unwrap();
        let split =
            ParallelExecutor::<TestBackend>::new(vec![device.clone(), device.clone(), device]).unwrap();
        assert!(!single.is_parallel());
        assert!(split.is_parallel());

        let a = single.forward(&model, x.clone());
        let b = split.forward(&model, x);
        assert_eq!(b.dims(), [5, 2]);

        let a = a.into_data().convert::<f32>().to_vec::<f32>().unwrap();
        let b = b.into_data().convert::<f32>().to_vec::<f32>().unwrap();
        for (a, b) in a.iter().zip(&b) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn needs_at_least_one_device() {
        let err = ParallelExecutor::<TestBackend>::new(vec![]).unwrap_err();
        assert!(matches!(err, Error::Config { field: "gpu_ids", .. }));
    }
}
