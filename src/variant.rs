//! Declarative per-dataset configuration records.
//!
//! The three baseline runs (Caltech faces/motorcycles, ETH-80, NORB) share one
//! pipeline; everything that differs between them lives in a `Variant` record:
//! dataset layout, input shape, layer hyperparameters, regularization
//! strengths, and the training schedule. The constants were tuned per dataset
//! upstream and are reproduced exactly.

use serde::{Deserialize, Serialize};

/// One class of a dataset: directory name plus the filename prefix used by
/// numeric-range enumeration (the motorcycles files carry a leading space).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassSpec {
    pub name: String,
    pub file_prefix: String,
}

impl ClassSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            file_prefix: String::new(),
        }
    }

    pub fn with_prefix(name: &str, prefix: &str) -> Self {
        Self {
            name: name.to_string(),
            file_prefix: prefix.to_string(),
        }
    }
}

/// How the files of one class are found and split between train and
/// validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Enumeration {
    /// Files named `<prefix><i>.png` for `i` in `1..=last_index`; a fresh
    /// permutation per class sends the first `train_count` indices to train
    /// and the rest to validation.
    NumericRange { last_index: usize, train_count: usize },
    /// Directories named `<class><fold>` for folds `1..=fold_count`; a fresh
    /// permutation sends `train_folds` folds to train and the rest to
    /// validation.
    Folds { fold_count: usize, train_folds: usize },
    /// Pre-split `train/<class>/` and `test/<class>/` directories.
    TrainTestDirs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvSpec {
    pub filters: usize,
    pub kernel: [usize; 2],
    pub l2: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSpec {
    pub window: [usize; 2],
    pub stride: [usize; 2],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseSpec {
    pub width: usize,
    pub l2: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SgdSpec {
    pub learning_rate: f64,
    /// Per-iteration learning-rate decay: `lr_t = lr / (1 + decay * t)`.
    pub decay: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variant {
    pub name: String,
    /// Conventional dataset root, overridable from the CLI.
    pub data_root: String,
    pub classes: Vec<ClassSpec>,
    pub enumeration: Enumeration,
    /// Input image shape as [height, width]; a single grayscale channel.
    pub input: [usize; 2],
    pub conv1: ConvSpec,
    pub pool: PoolSpec,
    pub conv2: ConvSpec,
    /// Dropout after the second convolution; the faces/motors run ships
    /// without it.
    pub conv2_dropout: Option<f64>,
    pub dense: DenseSpec,
    pub dense_dropout: f64,
    /// L2 penalty on the output kernel.
    pub output_l2: f64,
    /// L1 penalty on the softmax activations of the output layer.
    pub output_activity_l1: f64,
    pub sgd: SgdSpec,
    pub epochs: usize,
    pub batch_size: usize,
}

impl Variant {
    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    /// Caltech faces vs. motorcycles: 435 numbered images per class,
    /// 200 train / 235 validation.
    pub fn faces_motors() -> Self {
        Self {
            name: "faces-motors".to_string(),
            data_root: "caltech/".to_string(),
            classes: vec![
                ClassSpec::new("faces"),
                // The motorcycle files are named " 1.png", " 2.png", ...
                ClassSpec::with_prefix("motors", " "),
            ],
            enumeration: Enumeration::NumericRange {
                last_index: 435,
                train_count: 200,
            },
            input: [150, 227],
            conv1: ConvSpec {
                filters: 4,
                kernel: [5, 5],
                l2: 0.001,
            },
            pool: PoolSpec {
                window: [7, 7],
                stride: [6, 6],
            },
            conv2: ConvSpec {
                filters: 20,
                kernel: [24, 37],
                l2: 0.001,
            },
            conv2_dropout: None,
            dense: DenseSpec {
                width: 70,
                l2: 0.005,
            },
            dense_dropout: 0.5,
            output_l2: 0.03,
            output_activity_l1: 1.0,
            sgd: SgdSpec {
                learning_rate: 0.01,
                decay: 0.0002,
            },
            epochs: 700,
            batch_size: 16,
        }
    }

    /// ETH-80 cropped-close 128x128: ten folds per class, nine train / one
    /// validation.
    pub fn eth80() -> Self {
        Self {
            name: "eth80".to_string(),
            data_root: "eth80-cropped-close128/".to_string(),
            classes: ["apple", "car", "cow", "cup", "dog", "horse", "pear", "tomato"]
                .into_iter()
                .map(ClassSpec::new)
                .collect(),
            enumeration: Enumeration::Folds {
                fold_count: 10,
                train_folds: 9,
            },
            input: [128, 128],
            conv1: ConvSpec {
                filters: 4,
                kernel: [5, 5],
                l2: 0.001,
            },
            pool: PoolSpec {
                window: [5, 5],
                stride: [4, 4],
            },
            conv2: ConvSpec {
                filters: 80,
                kernel: [24, 24],
                l2: 0.001,
            },
            conv2_dropout: Some(0.5),
            dense: DenseSpec {
                width: 70,
                l2: 0.005,
            },
            dense_dropout: 0.5,
            output_l2: 0.03,
            output_activity_l1: 1.0,
            sgd: SgdSpec {
                learning_rate: 0.01,
                decay: 0.0002,
            },
            epochs: 250,
            batch_size: 16,
        }
    }

    /// Small NORB 96x96 with a pre-existing train/test split. The hidden
    /// dense width was never fixed upstream, so it is a required parameter
    /// here.
    pub fn norb(dense_width: usize) -> Self {
        Self {
            name: "norb".to_string(),
            data_root: "norb/".to_string(),
            classes: ["0", "1", "2", "3", "4"]
                .into_iter()
                .map(ClassSpec::new)
                .collect(),
            enumeration: Enumeration::TrainTestDirs,
            input: [96, 96],
            conv1: ConvSpec {
                filters: 4,
                kernel: [5, 5],
                l2: 0.001,
            },
            pool: PoolSpec {
                window: [5, 5],
                stride: [4, 4],
            },
            conv2: ConvSpec {
                filters: 50,
                kernel: [22, 22],
                l2: 0.001,
            },
            conv2_dropout: Some(0.5),
            dense: DenseSpec {
                width: dense_width,
                l2: 0.001,
            },
            dense_dropout: 0.5,
            output_l2: 0.001,
            output_activity_l1: 1.0,
            sgd: SgdSpec {
                learning_rate: 0.05,
                decay: 0.0002,
            },
            epochs: 400,
            batch_size: 16,
        }
    }
}
