//! 機械学習モデルの共通定義
//!
//! 英数字分類用のCNNモデルと画像の前処理を提供します。

use anyhow::{Context, Result};
use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        loss::CrossEntropyLossConfig,
        pool::{MaxPool2d, MaxPool2dConfig},
        Linear, LinearConfig, Relu,
    },
    record::{BinBytesRecorder, FullPrecisionSettings, Recorder},
    tensor::{backend::Backend, Int, Tensor},
    train::ClassificationOutput,
};
use image::{
    imageops::{self, FilterType},
    ImageBuffer, Luma,
};
use std::path::Path;

/// 画像サイズ（正方形）
pub const IMAGE_SIZE: usize = 28;

/// 最小入力サイズ（これ未満だとConv3後の特徴マップが消える）
pub const MIN_IMAGE_SIZE: usize = 18;

/// 全結合層の隠れユニット数
const HIDDEN_UNITS: usize = 64;

/// モデル設定
#[derive(Config, Debug)]
pub struct ModelConfig {
    /// 分類クラス数
    pub num_classes: usize,
    /// 入力画像サイズ（正方形）
    #[config(default = 28)]
    pub image_size: usize,
}

impl ModelConfig {
    /// Conv3後の特徴マップの一辺
    ///
    /// Conv (3x3, no padding): size -> size - 2
    /// Pool (2x2, stride 2): size -> size / 2 (切り捨て)
    pub fn feature_map_size(&self) -> Option<usize> {
        let after_conv1 = self.image_size.checked_sub(2)?;
        let after_pool1 = after_conv1 / 2;
        let after_conv2 = after_pool1.checked_sub(2)?;
        let after_pool2 = after_conv2 / 2;
        let feature_map_size = after_pool2.checked_sub(2)?;

        (feature_map_size > 0).then_some(feature_map_size)
    }

    /// モデルを初期化
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<CharClassifier<B>> {
        let feature_map_size = self.feature_map_size().ok_or_else(|| {
            anyhow::anyhow!(
                "入力サイズが小さすぎます: {} (最小{}x{}が必要)",
                self.image_size,
                MIN_IMAGE_SIZE,
                MIN_IMAGE_SIZE
            )
        })?;

        // 特徴次元 d = 64チャネル * feature_map_size * feature_map_size
        let d = 64 * feature_map_size * feature_map_size;

        tracing::debug!("[Model] 入力サイズ: 1 x {}x{}", self.image_size, self.image_size);
        tracing::debug!("[Model] Conv3後: 64 x {}x{}", feature_map_size, feature_map_size);
        tracing::debug!("[Model] FC1: {} -> {}", d, HIDDEN_UNITS);
        tracing::debug!("[Model] FC2: {} -> {}", HIDDEN_UNITS, self.num_classes);

        Ok(CharClassifier {
            conv1: Conv2dConfig::new([1, 32], [3, 3])
                .with_stride([1, 1])
                .init(device),
            pool1: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),

            conv2: Conv2dConfig::new([32, 64], [3, 3])
                .with_stride([1, 1])
                .init(device),
            pool2: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),

            conv3: Conv2dConfig::new([64, 64], [3, 3])
                .with_stride([1, 1])
                .init(device),

            fc1: LinearConfig::new(d, HIDDEN_UNITS).init(device),
            fc2: LinearConfig::new(HIDDEN_UNITS, self.num_classes).init(device),

            activation: Relu::new(),
        })
    }

    /// 各層の出力形状（モデルサマリー表示用）
    pub fn layer_summary(&self) -> Vec<(&'static str, String)> {
        let s = self.image_size;
        let c1 = s.saturating_sub(2);
        let p1 = c1 / 2;
        let c2 = p1.saturating_sub(2);
        let p2 = c2 / 2;
        let c3 = p2.saturating_sub(2);

        vec![
            ("conv2d_1", format!("(32, {}, {})", c1, c1)),
            ("max_pooling2d_1", format!("(32, {}, {})", p1, p1)),
            ("conv2d_2", format!("(64, {}, {})", c2, c2)),
            ("max_pooling2d_2", format!("(64, {}, {})", p2, p2)),
            ("conv2d_3", format!("(64, {}, {})", c3, c3)),
            ("flatten", format!("({})", 64 * c3 * c3)),
            ("dense_1", format!("({})", HIDDEN_UNITS)),
            ("dense_2", format!("({})", self.num_classes)),
        ]
    }
}

/// 英数字分類用CNNモデル
///
/// # アーキテクチャ
/// - {Conv 3x3 + ReLU + MaxPool 2x2} x 2層
/// - Conv 3x3 + ReLU
/// - Flatten
/// - FC: d -> 64 + ReLU
/// - FC: 64 -> num_classes
/// - Softmax (損失計算・分類時)
#[derive(Module, Debug)]
pub struct CharClassifier<B: Backend> {
    conv1: Conv2d<B>, // 1 -> 32
    pool1: MaxPool2d,
    conv2: Conv2d<B>, // 32 -> 64
    pool2: MaxPool2d,
    conv3: Conv2d<B>, // 64 -> 64

    fc1: Linear<B>, // d -> 64
    fc2: Linear<B>, // 64 -> num_classes

    activation: Relu,
}

impl<B: Backend> CharClassifier<B> {
    /// 順伝播
    ///
    /// # 引数
    /// - `images`: バッチ画像 [batch_size, 1, size, size]
    ///
    /// # 戻り値
    /// - クラスごとのロジット [batch_size, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch_size, _, _, _] = images.dims();

        let x = self.conv1.forward(images);
        let x = self.activation.forward(x);
        let x = self.pool1.forward(x);

        let x = self.conv2.forward(x);
        let x = self.activation.forward(x);
        let x = self.pool2.forward(x);

        let x = self.conv3.forward(x);
        let x = self.activation.forward(x);

        // Flatten
        let [_, c, h, w] = x.dims();
        let x = x.reshape([batch_size, c * h * w]);

        let x = self.fc1.forward(x);
        let x = self.activation.forward(x);

        self.fc2.forward(x)
    }

    /// 予測クラスIDを返す [batch_size]
    pub fn predict(&self, images: Tensor<B, 4>) -> Tensor<B, 1, Int> {
        let [batch_size, _, _, _] = images.dims();
        self.forward(images).argmax(1).reshape([batch_size])
    }

    /// 順伝播と損失計算
    ///
    /// # 戻り値
    /// - ClassificationOutput（損失、出力、ターゲット）
    pub fn forward_classification(
        &self,
        images: Tensor<B, 4>,
        targets: Tensor<B, 1, Int>,
    ) -> ClassificationOutput<B> {
        let output = self.forward(images);
        let loss = CrossEntropyLossConfig::new()
            .init(&output.device())
            .forward(output.clone(), targets.clone());

        ClassificationOutput::new(loss, output, targets)
    }
}

/// モデルの重みをバイト列に変換
///
/// CompactRecorderはf16で保存してしまうため、FullPrecisionSettingsでf32のまま保存する
pub fn model_to_bytes<B: Backend>(model: CharClassifier<B>) -> Result<Vec<u8>> {
    let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
    <BinBytesRecorder<FullPrecisionSettings> as Recorder<B>>::record(
        &recorder,
        model.into_record(),
        (),
    )
    .map_err(|e| anyhow::anyhow!("モデル重みの書き出しエラー: {:?}", e))
}

/// バイト列から重みを復元したモデルを生成
pub fn model_from_bytes<B: Backend>(
    config: &ModelConfig,
    model_binary: Vec<u8>,
    device: &B::Device,
) -> Result<CharClassifier<B>> {
    let model = config.init::<B>(device)?;

    let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
    let record = recorder
        .load(model_binary, device)
        .map_err(|e| anyhow::anyhow!("モデル重みの読み込みエラー: {:?}", e))?;

    Ok(model.load_record(record))
}

/// 画像を読み込んでグレースケール化・リサイズ
///
/// # 戻り値
/// - 0.0〜1.0の輝度値 (H, W) の順で平坦化
pub fn load_grayscale_image(path: &Path, image_size: usize) -> Result<Vec<f32>> {
    let img = image::open(path)
        .with_context(|| format!("画像の読み込みに失敗しました: {}", path.display()))?
        .to_luma32f();

    Ok(resize_luma(&img, image_size))
}

/// 輝度画像を `image_size x image_size` にリサイズ（バイリニア）
pub fn resize_luma(img: &ImageBuffer<Luma<f32>, Vec<f32>>, image_size: usize) -> Vec<f32> {
    let size = image_size as u32;
    if img.dimensions() == (size, size) {
        return img.as_raw().clone();
    }

    imageops::resize(img, size, size, FilterType::Triangle)
        .into_raw()
        .into_iter()
        .map(|v| v.clamp(0.0, 1.0))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::{NdArray, NdArrayDevice};

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_feature_map_size() {
        assert_eq!(ModelConfig::new(38).feature_map_size(), Some(3));
        assert_eq!(ModelConfig::new(38).with_image_size(18).feature_map_size(), Some(1));
        assert_eq!(ModelConfig::new(38).with_image_size(17).feature_map_size(), None);
        assert_eq!(ModelConfig::new(38).with_image_size(1).feature_map_size(), None);
    }

    #[test]
    fn test_init_rejects_small_input() {
        let device = NdArrayDevice::Cpu;
        let config = ModelConfig::new(38).with_image_size(10);
        assert!(config.init::<TestBackend>(&device).is_err());
    }

    #[test]
    fn test_forward_shape() {
        let device = NdArrayDevice::Cpu;
        let model = ModelConfig::new(38).init::<TestBackend>(&device).unwrap();

        let images = Tensor::<TestBackend, 4>::zeros([2, 1, IMAGE_SIZE, IMAGE_SIZE], &device);
        let output = model.forward(images.clone());
        assert_eq!(output.dims(), [2, 38]);

        let predicted = model.predict(images);
        assert_eq!(predicted.dims(), [2]);
    }

    #[test]
    fn test_parameter_count() {
        let device = NdArrayDevice::Cpu;
        let model = ModelConfig::new(38).init::<TestBackend>(&device).unwrap();

        // conv1 320 + conv2 18496 + conv3 36928 + fc1 36928 + fc2 2470
        assert_eq!(model.num_params(), 95_142);
    }

    #[test]
    fn test_bytes_round_trip_keeps_outputs() {
        let device = NdArrayDevice::Cpu;
        let config = ModelConfig::new(38);
        let model = config.init::<TestBackend>(&device).unwrap();

        let images = Tensor::<TestBackend, 4>::ones([1, 1, IMAGE_SIZE, IMAGE_SIZE], &device);
        let before = model.forward(images.clone()).into_data().to_vec::<f32>().unwrap();

        let bytes = model_to_bytes(model).unwrap();
        let restored = model_from_bytes::<TestBackend>(&config, bytes, &device).unwrap();
        let after = restored.forward(images).into_data().to_vec::<f32>().unwrap();

        assert_eq!(before.len(), after.len());
        for (a, b) in before.iter().zip(after.iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_resize_luma() {
        let img: ImageBuffer<Luma<f32>, Vec<f32>> = ImageBuffer::from_pixel(40, 40, Luma([0.5]));
        let pixels = resize_luma(&img, IMAGE_SIZE);
        assert_eq!(pixels.len(), IMAGE_SIZE * IMAGE_SIZE);
        assert!(pixels.iter().all(|v| (*v - 0.5).abs() < 1e-4));
    }
}
