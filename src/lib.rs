//! 英数字38クラスの手書き文字分類器を学習する
//!
//! 手書き文字データセットとMNISTを結合してCNNを学習し、
//! 評価結果とグラフ、学習済みモデルを出力する。

pub mod backend;
pub mod dataset;
pub mod labels;
pub mod logging;
pub mod ml;
pub mod model;
pub mod plots;

use anyhow::{Context, Result};
use burn::module::{AutodiffModule, Module};
use burn::tensor::backend::AutodiffBackend;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Instant;

use dataset::{load_mnist, load_nist, DatasetSplit};
use labels::{class_labels, NUM_CLASSES};
use ml::{accuracy_score, model_to_bytes, predict_classes, train_model, ClassificationReport, ModelConfig};
use model::{save_model_with_metadata, AppConfig, DeviceType, ModelMetadata};

/// 設定を読み込み、選択されたバックエンドで学習パイプライン全体を実行する
pub fn run() -> Result<()> {
    let (config, load_status) = AppConfig::load_or_default();
    logging::init_logging(&config.log_level)?;
    load_status.log();

    config.validate()?;
    config.display();

    tracing::info!("バックエンド: {}", backend::backend_name(config.device_type));
    match config.device_type {
        DeviceType::Wgpu => run_pipeline::<backend::GpuBackend>(&config, &backend::gpu_device()),
        DeviceType::Cpu => run_pipeline::<backend::CpuBackend>(&config, &backend::cpu_device()),
    }
}

/// データ読み込みからモデル保存までの一連の処理
pub fn run_pipeline<B: AutodiffBackend>(config: &AppConfig, device: &B::Device) -> Result<()> {
    let started = Instant::now();
    let settings = &config.training;
    let mut rng = StdRng::seed_from_u64(settings.seed);

    tracing::info!("手書き文字データを読み込み中: {}", config.paths.data_dir.display());
    let nist = load_nist(&config.paths.data_dir, config.image_size, settings.test_ratio, &mut rng)
        .context("手書き文字データの読み込みに失敗しました")?;

    tracing::info!("MNISTを読み込み中: {}", config.paths.mnist_dir.display());
    let mnist = load_mnist(&config.paths.mnist_dir, config.image_size)
        .context("MNISTの読み込みに失敗しました")?;

    let DatasetSplit { mut train, test } = nist.merge(mnist)?;
    train.shuffle(&mut rng);
    tracing::info!("結合後: 学習 {} 枚 / テスト {} 枚", train.len(), test.len());

    let train_samples = train.len();
    let (train, valid) = train.split_validation(settings.validation_split);

    let model_config = ModelConfig::new(NUM_CLASSES).with_image_size(config.image_size);
    let model = model_config.init::<B>(device)?;

    tracing::info!("=== モデル構成 ===");
    for (layer, shape) in model_config.layer_summary() {
        tracing::info!("{:<14} {}", layer, shape);
    }
    tracing::info!("パラメータ数: {}", model.num_params());

    let (model, history) = train_model(model, &train, &valid, settings, device)?;
    let model = model.valid();

    let truth = test.labels();
    let predictions = predict_classes(&model, &test, settings.batch_size, device)?;
    let test_accuracy = accuracy_score(&truth, &predictions);
    tracing::info!("Test Accuracy: {:.4}", test_accuracy);

    let report = ClassificationReport::from_predictions(&truth, &predictions, NUM_CLASSES)?;
    tracing::info!("分類レポート:\n{}", report.to_text(3));

    plots::plot_classification_report(&report, &config.paths.bar_plot_path, config.plot.bar_figure_size)?;
    plots::plot_training_history(
        &history,
        &config.paths.accuracy_plot_path,
        &config.paths.loss_plot_path,
        config.plot.line_figure_size,
    )?;

    let metadata = ModelMetadata::new(
        class_labels(),
        config.image_size as u32,
        settings.num_epochs as u32,
        settings.batch_size,
        settings.learning_rate,
        train_samples,
        test.len(),
        test_accuracy,
    );
    let binary = model_to_bytes(model)?;
    let written = save_model_with_metadata(&config.paths.model_path, &metadata, &binary)?;
    tracing::info!("モデルを保存しました: {}", written.display());

    tracing::info!("完了 ({:.1}秒)", started.elapsed().as_secs_f64());
    Ok(())
}
