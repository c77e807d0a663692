//! モデル推論機能

use anyhow::Result;
use burn::tensor::{backend::Backend, Tensor};
use std::path::Path;

use crate::ml::{load_grayscale_image, model_from_bytes, CharClassifier, ModelConfig};
use crate::model::{load_model_with_metadata, InferenceConfig};

/// 推論エンジン
pub struct InferenceEngine<B: Backend> {
    model: CharClassifier<B>,
    config: InferenceConfig,
    device: B::Device,
}

impl<B: Backend> InferenceEngine<B> {
    /// モデルアーカイブを読み込んで推論エンジンを初期化
    pub fn load<P: AsRef<Path>>(model_path: P, device: &B::Device) -> Result<Self> {
        let (metadata, model_binary) = load_model_with_metadata(model_path.as_ref())?;
        let config = InferenceConfig::from_metadata(&metadata);

        let model_config = ModelConfig::new(config.num_total_classes())
            .with_image_size(config.model_input_size as usize);
        let model = model_from_bytes::<B>(&model_config, model_binary, device)?;

        Ok(Self {
            model,
            config,
            device: device.clone(),
        })
    }

    /// 単一画像を分類して記号を返す
    pub fn classify_image<P: AsRef<Path>>(&self, image_path: P) -> Result<String> {
        let size = self.config.model_input_size as usize;
        let image_data = load_grayscale_image(image_path.as_ref(), size)?;
        let class_idx = self.classify_pixels(&image_data)?;

        self.config
            .class_index_to_label(class_idx)
            .ok_or_else(|| anyhow::anyhow!("クラスインデックス {} は範囲外です", class_idx))
    }

    /// 前処理済みの画素列を分類してクラスIDを返す
    pub fn classify_pixels(&self, pixels: &[f32]) -> Result<usize> {
        let size = self.config.model_input_size as usize;
        if pixels.len() != size * size {
            anyhow::bail!(
                "画素数が不正です: {} (期待: {}x{})",
                pixels.len(),
                size,
                size
            );
        }

        // Tensorに変換 [1, 1, size, size]
        let tensor = Tensor::<B, 1>::from_floats(pixels, &self.device).reshape([1, 1, size, size]);

        let predicted = self
            .model
            .predict(tensor)
            .into_data()
            .convert::<i64>()
            .to_vec::<i64>()
            .map_err(|e| anyhow::anyhow!("推論結果の取得エラー: {:?}", e))?;

        predicted
            .first()
            .map(|&idx| idx as usize)
            .ok_or_else(|| anyhow::anyhow!("推論結果が空です"))
    }

    /// 複数画像をバッチ分類
    pub fn classify_batch(&self, image_paths: &[impl AsRef<Path>]) -> Result<Vec<String>> {
        image_paths
            .iter()
            .map(|path| self.classify_image(path))
            .collect()
    }

    /// InferenceConfigへの参照を取得
    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }
}
