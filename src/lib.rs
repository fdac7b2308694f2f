#![recursion_limit = "256"]

pub mod dataset;
pub mod model;
pub mod preprocess;
pub mod util;
pub mod variant;

pub use dataset::{load_split, DatasetError, Sample, SplitSamples};
pub use model::ConvClassifier;
pub use preprocess::{one_hot, tensors_from_samples, PreprocessError, SplitTensors};
pub use util::{run_training, RunConfig, TrainArgs, VariantKind};
pub use variant::Variant;

/// Backend alias for training/eval (NdArray by default; WGPU if enabled).
#[cfg(feature = "backend-wgpu")]
pub type TrainBackend = burn_wgpu::Wgpu<f32>;
#[cfg(not(feature = "backend-wgpu"))]
pub type TrainBackend = burn_ndarray::NdArray<f32>;

/// Device every tensor op of the run is pinned to. The CPU backend has a
/// single device, so the index is accepted and ignored there.
#[cfg(feature = "backend-wgpu")]
pub fn device_for_index(index: usize) -> <TrainBackend as burn::tensor::backend::Backend>::Device {
    burn_wgpu::WgpuDevice::DiscreteGpu(index)
}
#[cfg(not(feature = "backend-wgpu"))]
pub fn device_for_index(_index: usize) -> <TrainBackend as burn::tensor::backend::Backend>::Device {
    burn_ndarray::NdArrayDevice::Cpu
}
