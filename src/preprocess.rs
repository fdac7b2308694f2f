//! Tensor assembly: stacking, range normalization, one-hot encoding.
//!
//! Normalization divides every element by the array's own `max - min` and
//! nothing else: no min subtraction, no shared constant between the splits.
//! The quirk is load-bearing since the tuned hyperparameters assume it. A
//! constant array is a hard error instead of silent NaN.

use crate::dataset::Sample;
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("cannot build tensors from an empty split")]
    EmptySplit,
    #[error("sample {index} has {got} pixels, expected {expected} ({h}x{w})")]
    ShapeMismatch {
        index: usize,
        got: usize,
        expected: usize,
        h: usize,
        w: usize,
    },
    #[error("cannot range-normalize a constant array (every element is {value})")]
    ZeroRange { value: f32 },
    #[error("label {label} out of range for {classes} classes")]
    LabelOutOfRange { label: usize, classes: usize },
}

/// Divide every element by `max - min` of the slice itself. Returns the range
/// that was divided by. Note the result is not rescaled to [0, 1]; only its
/// spread becomes exactly 1.
pub fn normalize_by_range(values: &mut [f32]) -> Result<f32, PreprocessError> {
    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    for &v in values.iter() {
        min = min.min(v);
        max = max.max(v);
    }
    if values.is_empty() {
        return Err(PreprocessError::EmptySplit);
    }
    let range = max - min;
    if range == 0.0 {
        return Err(PreprocessError::ZeroRange { value: max });
    }
    for v in values.iter_mut() {
        *v /= range;
    }
    Ok(range)
}

/// One-hot encode labels to width `classes`; argmax of a row recovers the
/// label.
pub fn one_hot(labels: &[usize], classes: usize) -> Result<Vec<f32>, PreprocessError> {
    let mut encoded = vec![0.0f32; labels.len() * classes];
    for (row, &label) in labels.iter().enumerate() {
        if label >= classes {
            return Err(PreprocessError::LabelOutOfRange { label, classes });
        }
        encoded[row * classes + label] = 1.0;
    }
    Ok(encoded)
}

/// One split, ready for the model: images as `[N, 1, H, W]`, targets one-hot
/// as `[N, classes]`, plus the raw labels for accuracy bookkeeping.
#[derive(Debug, Clone)]
pub struct SplitTensors<B: Backend> {
    pub images: Tensor<B, 4>,
    pub targets: Tensor<B, 2>,
    pub labels: Vec<usize>,
}

impl<B: Backend> SplitTensors<B> {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Stack one split into contiguous buffers, normalize by the split's own
/// range, and lift to device tensors. Images are channels-first: the single
/// grayscale channel makes `[N, 1, H, W]` byte-identical to an `(N, H, W, 1)`
/// layout.
pub fn tensors_from_samples<B: Backend>(
    samples: &[Sample],
    input: [usize; 2],
    classes: usize,
    device: &B::Device,
) -> Result<SplitTensors<B>, PreprocessError> {
    if samples.is_empty() {
        return Err(PreprocessError::EmptySplit);
    }
    let [h, w] = input;
    let expected = h * w;
    let mut buf = Vec::with_capacity(samples.len() * expected);
    let mut labels = Vec::with_capacity(samples.len());
    for (index, sample) in samples.iter().enumerate() {
        if sample.pixels.len() != expected {
            return Err(PreprocessError::ShapeMismatch {
                index,
                got: sample.pixels.len(),
                expected,
                h,
                w,
            });
        }
        buf.extend_from_slice(&sample.pixels);
        labels.push(sample.label);
    }
    normalize_by_range(&mut buf)?;
    let targets_buf = one_hot(&labels, classes)?;

    let images = Tensor::<B, 4>::from_data(TensorData::new(buf, [samples.len(), 1, h, w]), device);
    let targets = Tensor::<B, 2>::from_data(
        TensorData::new(targets_buf, [samples.len(), classes]),
        device,
    );
    Ok(SplitTensors {
        images,
        targets,
        labels,
    })
}
