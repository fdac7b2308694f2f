use burn::backend::{ndarray::NdArray, Autodiff};
use burn::optim::momentum::MomentumConfig;
use burn::optim::{GradientsParams, Optimizer, SgdConfig};
use burn::tensor::{Tensor, TensorData};
use conv_baselines::model::ConvClassifier;
use conv_baselines::preprocess::one_hot;
use conv_baselines::util::{composite_loss, run_training, RunConfig};
use conv_baselines::variant::{
    ClassSpec, ConvSpec, DenseSpec, Enumeration, PoolSpec, SgdSpec, Variant,
};
use image::{Rgb, RgbImage};
use std::fs;

type ADBackend = Autodiff<NdArray<f32>>;

fn tiny_variant() -> Variant {
    Variant {
        name: "tiny".to_string(),
        data_root: "tiny/".to_string(),
        classes: vec![
            ClassSpec::new("a"),
            ClassSpec::new("b"),
            ClassSpec::new("c"),
        ],
        enumeration: Enumeration::NumericRange {
            last_index: 10,
            train_count: 6,
        },
        input: [12, 12],
        conv1: ConvSpec {
            filters: 2,
            kernel: [5, 5],
            l2: 0.001,
        },
        pool: PoolSpec {
            window: [2, 2],
            stride: [2, 2],
        },
        conv2: ConvSpec {
            filters: 4,
            kernel: [4, 4],
            l2: 0.001,
        },
        conv2_dropout: Some(0.5),
        dense: DenseSpec {
            width: 8,
            l2: 0.005,
        },
        dense_dropout: 0.5,
        output_l2: 0.03,
        output_activity_l1: 1.0,
        sgd: SgdSpec {
            learning_rate: 0.01,
            decay: 0.0002,
        },
        epochs: 1,
        batch_size: 16,
    }
}

fn write_synthetic_dataset(root: &std::path::Path, variant: &Variant) {
    for class in &variant.classes {
        let dir = root.join(&class.name);
        fs::create_dir_all(&dir).unwrap();
        for i in 1..=10u32 {
            let img = RgbImage::from_fn(12, 12, |x, y| {
                Rgb([(x * 21) as u8, (y * 21) as u8, (i * 20) as u8])
            });
            img.save(dir.join(format!("{i}.png"))).unwrap();
        }
    }
}

#[test]
fn one_epoch_writes_one_csv_row() {
    let data = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let variant = tiny_variant();
    write_synthetic_dataset(data.path(), &variant);

    let cfg = RunConfig {
        variant,
        data_root: data.path().to_path_buf(),
        output_dir: out.path().join("run"),
        device_index: 0,
        seed: Some(42),
    };
    run_training(&cfg).unwrap();

    let csv = fs::read_to_string(out.path().join("run").join("result.csv")).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 2, "header plus exactly one epoch row");
    assert_eq!(lines[0], "epoch,loss,acc,val_loss,val_acc");

    let fields: Vec<&str> = lines[1].split(',').collect();
    assert_eq!(fields.len(), 5);
    assert_eq!(fields[0], "0");
    for field in &fields[1..] {
        let value: f64 = field.parse().unwrap();
        assert!(value.is_finite(), "degenerate metric {field}");
    }
}

#[test]
fn forward_shapes_and_one_sgd_step() {
    let variant = tiny_variant();
    let device = <ADBackend as burn::tensor::backend::Backend>::Device::default();
    let mut model = ConvClassifier::<ADBackend>::new(&variant, &device).unwrap();

    let images = Tensor::<ADBackend, 4>::random(
        [4, 1, 12, 12],
        burn::tensor::Distribution::Uniform(0.0, 1.0),
        &device,
    );
    let targets_buf = one_hot(&[0, 1, 2, 1], 3).unwrap();
    let targets = Tensor::<ADBackend, 2>::from_data(TensorData::new(targets_buf, [4, 3]), &device);

    let logits = model.forward(images);
    assert_eq!(logits.dims(), [4, 3]);

    let loss = composite_loss(logits, targets, &model, &variant);
    let loss_val: f32 = loss
        .clone()
        .into_data()
        .to_vec::<f32>()
        .unwrap_or_default()
        .first()
        .copied()
        .unwrap_or(f32::NAN);
    assert!(loss_val.is_finite());

    let mut optim = SgdConfig::new()
        .with_momentum(Some(
            MomentumConfig::new()
                .with_momentum(0.0)
                .with_dampening(0.0)
                .with_nesterov(true),
        ))
        .init();
    let grads = GradientsParams::from_grads(loss.backward(), &model);
    model = optim.step(0.01, model, grads);

    // A second forward on the stepped model still produces sane logits.
    let images = Tensor::<ADBackend, 4>::zeros([1, 1, 12, 12], &device);
    assert_eq!(model.forward(images).dims(), [1, 3]);
}
