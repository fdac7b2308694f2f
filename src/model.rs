//! The fixed conv/pool/dense topology as a Burn module.
//!
//! All runs share the shape conv -> pool -> conv -> (dropout) -> flatten ->
//! dense -> dropout -> dense; the second convolution's kernel is sized so its
//! output collapses to (near) 1x1. The model emits logits; softmax lives in
//! the loss path, which is the same classifier as a softmax output layer.

use crate::variant::Variant;
use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d};
use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("{stage}: kernel {kernel:?} does not fit its {input:?} input")]
    KernelTooLarge {
        stage: &'static str,
        kernel: [usize; 2],
        input: [usize; 2],
    },
}

fn conv_output(
    input: [usize; 2],
    kernel: [usize; 2],
    stage: &'static str,
) -> Result<[usize; 2], ModelError> {
    if kernel[0] > input[0] || kernel[1] > input[1] {
        return Err(ModelError::KernelTooLarge {
            stage,
            kernel,
            input,
        });
    }
    Ok([input[0] - kernel[0] + 1, input[1] - kernel[1] + 1])
}

fn pool_output(
    input: [usize; 2],
    window: [usize; 2],
    stride: [usize; 2],
    stage: &'static str,
) -> Result<[usize; 2], ModelError> {
    if window[0] > input[0] || window[1] > input[1] {
        return Err(ModelError::KernelTooLarge {
            stage,
            kernel: window,
            input,
        });
    }
    Ok([
        (input[0] - window[0]) / stride[0] + 1,
        (input[1] - window[1]) / stride[1] + 1,
    ])
}

#[derive(Module, Debug)]
pub struct ConvClassifier<B: Backend> {
    conv1: Conv2d<B>,
    pool: MaxPool2d,
    conv2: Conv2d<B>,
    conv_dropout: Option<Dropout>,
    dense: Linear<B>,
    dropout: Dropout,
    output: Linear<B>,
}

impl<B: Backend> ConvClassifier<B> {
    pub fn new(variant: &Variant, device: &B::Device) -> Result<Self, ModelError> {
        let after_conv1 = conv_output(variant.input, variant.conv1.kernel, "conv1")?;
        let after_pool = pool_output(
            after_conv1,
            variant.pool.window,
            variant.pool.stride,
            "pool",
        )?;
        let after_conv2 = conv_output(after_pool, variant.conv2.kernel, "conv2")?;
        let flat = variant.conv2.filters * after_conv2[0] * after_conv2[1];

        let conv1 = Conv2dConfig::new([1, variant.conv1.filters], variant.conv1.kernel)
            .with_padding(PaddingConfig2d::Valid)
            .init(device);
        let pool = MaxPool2dConfig::new(variant.pool.window)
            .with_strides(variant.pool.stride)
            .init();
        let conv2 = Conv2dConfig::new(
            [variant.conv1.filters, variant.conv2.filters],
            variant.conv2.kernel,
        )
        .with_padding(PaddingConfig2d::Valid)
        .init(device);
        let conv_dropout = variant
            .conv2_dropout
            .map(|prob| DropoutConfig::new(prob).init());
        let dense = LinearConfig::new(flat, variant.dense.width).init(device);
        let dropout = DropoutConfig::new(variant.dense_dropout).init();
        let output = LinearConfig::new(variant.dense.width, variant.num_classes()).init(device);

        Ok(Self {
            conv1,
            pool,
            conv2,
            conv_dropout,
            dense,
            dropout,
            output,
        })
    }

    /// Images `[N, 1, H, W]` to class logits `[N, classes]`.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = relu(self.conv1.forward(images));
        let x = self.pool.forward(x);
        let x = relu(self.conv2.forward(x));
        let x = match &self.conv_dropout {
            Some(dropout) => dropout.forward(x),
            None => x,
        };
        let x: Tensor<B, 2> = x.flatten(1, 3);
        let x = relu(self.dense.forward(x));
        let x = self.dropout.forward(x);
        self.output.forward(x)
    }

    /// Summed L2 penalties on the four kernels, weighted by the variant's
    /// constants. Biases are not penalized.
    pub fn kernel_penalty(&self, variant: &Variant) -> Tensor<B, 1> {
        let conv1 = self
            .conv1
            .weight
            .val()
            .powf_scalar(2.0)
            .sum()
            .mul_scalar(variant.conv1.l2);
        let conv2 = self
            .conv2
            .weight
            .val()
            .powf_scalar(2.0)
            .sum()
            .mul_scalar(variant.conv2.l2);
        let dense = self
            .dense
            .weight
            .val()
            .powf_scalar(2.0)
            .sum()
            .mul_scalar(variant.dense.l2);
        let output = self
            .output
            .weight
            .val()
            .powf_scalar(2.0)
            .sum()
            .mul_scalar(variant.output_l2);
        conv1 + conv2 + dense + output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variant::Variant;

    #[test]
    fn spatial_dims_collapse_as_tuned() {
        // faces/motors: 150x227 -> conv 146x223 -> pool 24x37 -> conv2 1x1.
        assert_eq!(conv_output([150, 227], [5, 5], "conv1").unwrap(), [146, 223]);
        assert_eq!(
            pool_output([146, 223], [7, 7], [6, 6], "pool").unwrap(),
            [24, 37]
        );
        assert_eq!(conv_output([24, 37], [24, 37], "conv2").unwrap(), [1, 1]);

        // eth80: 128 -> 124 -> 30 -> 7 (x80 filters).
        assert_eq!(conv_output([128, 128], [5, 5], "conv1").unwrap(), [124, 124]);
        assert_eq!(
            pool_output([124, 124], [5, 5], [4, 4], "pool").unwrap(),
            [30, 30]
        );
        assert_eq!(conv_output([30, 30], [24, 24], "conv2").unwrap(), [7, 7]);

        // norb: 96 -> 92 -> 22 -> 1.
        assert_eq!(conv_output([96, 96], [5, 5], "conv1").unwrap(), [92, 92]);
        assert_eq!(
            pool_output([92, 92], [5, 5], [4, 4], "pool").unwrap(),
            [22, 22]
        );
        assert_eq!(conv_output([22, 22], [22, 22], "conv2").unwrap(), [1, 1]);
    }

    #[test]
    fn oversized_kernel_is_rejected() {
        let mut variant = Variant::faces_motors();
        variant.input = [10, 10];
        let device = burn_ndarray::NdArrayDevice::Cpu;
        assert!(matches!(
            ConvClassifier::<burn_ndarray::NdArray<f32>>::new(&variant, &device),
            Err(ModelError::KernelTooLarge { .. })
        ));
    }
}
