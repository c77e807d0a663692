//! モデル学習
//!
//! 学習データをエポックごとにシャッフルしてミニバッチで学習し、
//! エポックごとの学習/検証の精度と損失を履歴として記録します。

use anyhow::Result;
use burn::{
    data::dataloader::batcher::Batcher,
    module::{AutodiffModule, Module},
    optim::{AdamConfig, GradientsParams, Optimizer},
    tensor::{
        backend::{AutodiffBackend, Backend},
        ElementConversion, Int, Tensor,
    },
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::dataset::{GlyphItem, GlyphSet};
use crate::ml::CharClassifier;
use crate::model::TrainingSettings;

/// バッチャー
///
/// 画像はすでにメモリ上にあるので、連結してテンソルに変換するだけ
#[derive(Clone, Debug)]
pub struct GlyphBatcher {
    image_size: usize,
}

impl GlyphBatcher {
    pub fn new(image_size: usize) -> Self {
        Self { image_size }
    }
}

/// バッチデータ
#[derive(Clone, Debug)]
pub struct GlyphBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> Batcher<B, GlyphItem, GlyphBatch<B>> for GlyphBatcher {
    fn batch(&self, items: Vec<GlyphItem>, device: &B::Device) -> GlyphBatch<B> {
        let batch_size = items.len();
        let image_size = self.image_size;
        let mut all_pixels = Vec::with_capacity(batch_size * image_size * image_size);
        let mut targets_vec = Vec::with_capacity(batch_size);

        for item in items {
            all_pixels.extend_from_slice(&item.pixels);
            targets_vec.push(item.label as i64);
        }

        // 1回の転送でバッチ全体をデバイスへ
        let images = Tensor::<B, 1>::from_floats(all_pixels.as_slice(), device)
            .reshape([batch_size, 1, image_size, image_size]);
        let targets = Tensor::<B, 1, Int>::from_ints(targets_vec.as_slice(), device);

        GlyphBatch { images, targets }
    }
}

/// エポックごとの学習履歴
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub train_accuracy: Vec<f64>,
    pub valid_accuracy: Vec<f64>,
    pub train_loss: Vec<f64>,
    pub valid_loss: Vec<f64>,
}

impl TrainingHistory {
    pub fn num_epochs(&self) -> usize {
        self.train_loss.len()
    }

    fn push(&mut self, train: EpochStats, valid: EpochStats) {
        self.train_accuracy.push(train.accuracy);
        self.train_loss.push(train.loss);
        self.valid_accuracy.push(valid.accuracy);
        self.valid_loss.push(valid.loss);
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct EpochStats {
    loss: f64,
    accuracy: f64,
}

/// モデル学習を実行
///
/// # 引数
/// - `model`: 初期化済みモデル
/// - `train`: 学習データ
/// - `valid`: 検証データ（重み更新には使わない）
/// - `settings`: エポック数、バッチサイズ、学習率、シード
/// - `device`: 学習デバイス
///
/// # 戻り値
/// - (学習済みモデル, 学習履歴)
pub fn train_model<B: AutodiffBackend>(
    mut model: CharClassifier<B>,
    train: &GlyphSet,
    valid: &GlyphSet,
    settings: &TrainingSettings,
    device: &B::Device,
) -> Result<(CharClassifier<B>, TrainingHistory)> {
    if train.is_empty() {
        anyhow::bail!("学習データがありません");
    }
    if settings.batch_size == 0 {
        anyhow::bail!("バッチサイズは1以上が必要です");
    }

    let batcher = GlyphBatcher::new(train.image_size());
    let mut optimizer = AdamConfig::new().init();
    let mut rng = StdRng::seed_from_u64(settings.seed);
    let mut history = TrainingHistory::default();

    let batch_size = settings.batch_size;
    let num_batches = train.len().div_ceil(batch_size);

    tracing::info!(
        "学習を開始します: {} 枚で学習, {} 枚で検証 (エポック数: {}, バッチサイズ: {}, 学習率: {})",
        train.len(),
        valid.len(),
        settings.num_epochs,
        batch_size,
        settings.learning_rate
    );

    for epoch in 0..settings.num_epochs {
        let mut indices: Vec<usize> = (0..train.len()).collect();
        indices.shuffle(&mut rng);

        let mut loss_sum = 0.0f64;
        let mut correct = 0usize;
        let mut seen = 0usize;

        for (batch_idx, chunk) in indices.chunks(batch_size).enumerate() {
            let items: Vec<GlyphItem> = chunk.iter().map(|&i| train.items()[i].clone()).collect();
            let batch: GlyphBatch<B> = batcher.batch(items, device);
            let count = chunk.len();

            let output = model.forward_classification(batch.images, batch.targets);

            let loss_value: f64 = output.loss.clone().into_scalar().elem();
            loss_sum += loss_value * count as f64;
            correct += count_correct(output.output, output.targets);
            seen += count;

            let grads = output.loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optimizer.step(settings.learning_rate, model, grads);

            if (batch_idx + 1) % 100 == 0 || batch_idx + 1 == num_batches {
                tracing::debug!(
                    "  Batch {:>5}/{}: loss = {:.4}, acc = {:.4}",
                    batch_idx + 1,
                    num_batches,
                    loss_value,
                    correct as f64 / seen as f64
                );
            }
        }

        let train_stats = EpochStats {
            loss: loss_sum / seen as f64,
            accuracy: correct as f64 / seen as f64,
        };
        let valid_stats = evaluate(&model.valid(), valid, batch_size);

        tracing::info!(
            "Epoch {}/{} - loss: {:.4} - acc: {:.4} - val_loss: {:.4} - val_acc: {:.4}",
            epoch + 1,
            settings.num_epochs,
            train_stats.loss,
            train_stats.accuracy,
            valid_stats.loss,
            valid_stats.accuracy
        );

        history.push(train_stats, valid_stats);
    }

    Ok((model, history))
}

/// 検証データの損失と精度（勾配なし）
fn evaluate<B: Backend>(model: &CharClassifier<B>, set: &GlyphSet, batch_size: usize) -> EpochStats {
    if set.is_empty() {
        return EpochStats::default();
    }

    let device = model.devices().into_iter().next().unwrap_or_default();
    let batcher = GlyphBatcher::new(set.image_size());

    let mut loss_sum = 0.0f64;
    let mut correct = 0usize;

    for chunk in set.items().chunks(batch_size) {
        let batch: GlyphBatch<B> = batcher.batch(chunk.to_vec(), &device);
        let output = model.forward_classification(batch.images, batch.targets);

        let loss_value: f64 = output.loss.into_scalar().elem();
        loss_sum += loss_value * chunk.len() as f64;
        correct += count_correct(output.output, output.targets);
    }

    EpochStats {
        loss: loss_sum / set.len() as f64,
        accuracy: correct as f64 / set.len() as f64,
    }
}

/// ロジットとターゲットから正解数を数える
fn count_correct<B: Backend>(output: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    let [batch_size, _] = output.dims();
    let predictions = output.argmax(1).reshape([batch_size]);
    let correct: i64 = predictions.equal(targets).int().sum().into_scalar().elem();
    correct as usize
}
