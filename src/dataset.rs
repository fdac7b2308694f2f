//! Dataset loading: directory enumeration, image decoding, grayscale
//! conversion, and the train/validation split.
//!
//! The whole dataset is read into memory up front; nothing streams. Any
//! missing or undecodable file aborts the run with a path-carrying error.

use crate::variant::{Enumeration, Variant};
use rand::seq::SliceRandom;
use rand::Rng;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub type DatasetResult<T> = Result<T, DatasetError>;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("image decode error at {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("image {path} is {got_w}x{got_h}, expected {want_w}x{want_h}")]
    ShapeMismatch {
        path: PathBuf,
        got_w: u32,
        got_h: u32,
        want_w: u32,
        want_h: u32,
    },
    #[error("no png files under {path}")]
    EmptyClassDir { path: PathBuf },
}

/// One grayscale image (row-major, 0..255 floating-point intensities) and its
/// class label.
#[derive(Debug, Clone)]
pub struct Sample {
    pub pixels: Vec<f32>,
    pub label: usize,
}

#[derive(Debug, Clone)]
pub struct SplitSamples {
    pub train: Vec<Sample>,
    pub val: Vec<Sample>,
}

/// Fixed luminance weights; already-gray inputs (R = G = B) pass through
/// unchanged up to rounding.
pub fn gray_from_rgb(r: u8, g: u8, b: u8) -> f32 {
    0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32
}

/// Decode one image, check it against the variant's input shape, and convert
/// it to a grayscale intensity buffer.
pub fn load_gray_image(path: &Path, input: [usize; 2]) -> DatasetResult<Vec<f32>> {
    let img = image::open(path)
        .map_err(|source| DatasetError::Image {
            path: path.to_path_buf(),
            source,
        })?
        .to_rgb8();
    let (width, height) = img.dimensions();
    if height as usize != input[0] || width as usize != input[1] {
        return Err(DatasetError::ShapeMismatch {
            path: path.to_path_buf(),
            got_w: width,
            got_h: height,
            want_w: input[1] as u32,
            want_h: input[0] as u32,
        });
    }
    let mut pixels = Vec::with_capacity(input[0] * input[1]);
    for y in 0..height {
        for x in 0..width {
            let p = img.get_pixel(x, y);
            pixels.push(gray_from_rgb(p[0], p[1], p[2]));
        }
    }
    Ok(pixels)
}

/// Permute `first..=last` and split after `train_count` entries. A fresh
/// permutation is drawn per class per run, so which files land in which split
/// changes between runs unless the caller seeds the rng.
pub fn permutation_split<R: Rng>(
    rng: &mut R,
    first: usize,
    last: usize,
    train_count: usize,
) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (first..=last).collect();
    indices.shuffle(rng);
    let val = indices.split_off(train_count.min(indices.len()));
    (indices, val)
}

/// Sorted png listing of one class directory. Sorting pins down an
/// enumeration order the filesystem would otherwise choose.
fn list_pngs(dir: &Path) -> DatasetResult<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|source| DatasetError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| DatasetError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) == Some("png") {
            paths.push(path);
        }
    }
    if paths.is_empty() {
        return Err(DatasetError::EmptyClassDir {
            path: dir.to_path_buf(),
        });
    }
    paths.sort();
    Ok(paths)
}

fn load_dir(dir: &Path, label: usize, input: [usize; 2], out: &mut Vec<Sample>) -> DatasetResult<()> {
    for path in list_pngs(dir)? {
        out.push(Sample {
            pixels: load_gray_image(&path, input)?,
            label,
        });
    }
    Ok(())
}

/// Walk the variant's directory convention under `root` and produce the two
/// splits, samples in permutation/traversal order.
pub fn load_split<R: Rng>(
    variant: &Variant,
    root: &Path,
    rng: &mut R,
) -> DatasetResult<SplitSamples> {
    let mut train = Vec::new();
    let mut val = Vec::new();

    for (label, class) in variant.classes.iter().enumerate() {
        match variant.enumeration {
            Enumeration::NumericRange {
                last_index,
                train_count,
            } => {
                let (train_idx, val_idx) = permutation_split(rng, 1, last_index, train_count);
                for (indices, out) in [(train_idx, &mut train), (val_idx, &mut val)] {
                    for i in indices {
                        let path = root
                            .join(&class.name)
                            .join(format!("{}{}.png", class.file_prefix, i));
                        out.push(Sample {
                            pixels: load_gray_image(&path, variant.input)?,
                            label,
                        });
                    }
                }
            }
            Enumeration::Folds {
                fold_count,
                train_folds,
            } => {
                let (train_f, val_f) = permutation_split(rng, 1, fold_count, train_folds);
                for (folds, out) in [(train_f, &mut train), (val_f, &mut val)] {
                    for fold in folds {
                        let dir = root.join(format!("{}{}", class.name, fold));
                        load_dir(&dir, label, variant.input, out)?;
                    }
                }
            }
            Enumeration::TrainTestDirs => {
                load_dir(&root.join("train").join(&class.name), label, variant.input, &mut train)?;
                load_dir(&root.join("test").join(&class.name), label, variant.input, &mut val)?;
            }
        }
    }

    Ok(SplitSamples { train, val })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    #[test]
    fn grayscale_is_the_fixed_linear_combination() {
        assert_eq!(gray_from_rgb(0, 0, 0), 0.0);
        assert_eq!(gray_from_rgb(255, 255, 255), 255.0 * (0.299 + 0.587 + 0.114));
        let gray = gray_from_rgb(10, 20, 30);
        assert!((gray - (0.299 * 10.0 + 0.587 * 20.0 + 0.114 * 30.0)).abs() < 1e-5);
        // Gray inputs pass through.
        assert!((gray_from_rgb(77, 77, 77) - 77.0).abs() < 1e-3);
    }

    #[test]
    fn caltech_split_counts_hold_for_any_seed() {
        for seed in [0u64, 1, 42, 12345] {
            let mut rng = StdRng::seed_from_u64(seed);
            let (train, val) = permutation_split(&mut rng, 1, 435, 200);
            assert_eq!(train.len(), 200);
            assert_eq!(val.len(), 235);
            let all: HashSet<usize> = train.iter().chain(val.iter()).copied().collect();
            assert_eq!(all.len(), 435, "split must be disjoint and covering");
            assert_eq!(*all.iter().min().unwrap(), 1);
            assert_eq!(*all.iter().max().unwrap(), 435);
        }
    }

    #[test]
    fn fold_split_is_nine_to_one() {
        let mut rng = StdRng::seed_from_u64(3);
        let (train, val) = permutation_split(&mut rng, 1, 10, 9);
        assert_eq!(train.len(), 9);
        assert_eq!(val.len(), 1);
        assert!(!train.contains(&val[0]));
    }

    #[test]
    fn split_is_reproducible_under_a_fixed_seed() {
        let (a, _) = permutation_split(&mut StdRng::seed_from_u64(9), 1, 435, 200);
        let (b, _) = permutation_split(&mut StdRng::seed_from_u64(9), 1, 435, 200);
        assert_eq!(a, b);
    }
}
