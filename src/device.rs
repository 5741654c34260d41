use burn::backend::{ndarray::NdArrayDevice, Autodiff, NdArray};
use burn::tensor::backend::Backend;

/// Resolves the devices a run is placed on. The first device is primary:
/// the predictor's weights and the gathered outputs live there.
pub trait Placement: Backend {
    fn devices(use_gpu: bool, gpu_ids: &[usize]) -> Vec<Self::Device>;
}

impl Placement for NdArray {
    fn devices(use_gpu: bool, _gpu_ids: &[usize]) -> Vec<Self::Device> {
        if use_gpu {
            log::warn!("use_gpu is set but the ndarray backend only runs on the CPU");
        }
        vec![NdArrayDevice::Cpu]
    }
}

impl Placement for Autodiff<NdArray> {
    fn devices(use_gpu: bool, gpu_ids: &[usize]) -> Vec<Self::Device> {
        NdArray::devices(use_gpu, gpu_ids)
    }
}

#[cfg(feature = "tch")]
mod tch {
    use super::Placement;
    use burn::backend::{libtorch::LibTorchDevice, Autodiff, LibTorch};

    impl Placement for LibTorch {
        fn devices(use_gpu: bool, gpu_ids: &[usize]) -> Vec<Self::Device> {
            if !use_gpu {
                return vec![LibTorchDevice::Cpu];
            }
            if cfg!(target_os = "macos") {
                return vec![LibTorchDevice::Mps];
            }
            gpu_ids.iter().map(|&id| LibTorchDevice::Cuda(id)).collect()
        }
    }

    impl Placement for Autodiff<LibTorch> {
        fn devices(use_gpu: bool, gpu_ids: &[usize]) -> Vec<Self::Device> {
            LibTorch::devices(use_gpu, gpu_ids)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ndarray_always_places_on_cpu() {
        assert_eq!(NdArray::devices(false, &[0]), vec![NdArrayDevice::Cpu]);
        assert_eq!(
            <Autodiff<NdArray> as Placement>::devices(true, &[0, 2, 6]),
            vec![NdArrayDevice::Cpu]
        );
    }
}
