//! モデルメタデータから推論用情報を取得

use anyhow::{Context, Result};
use std::path::Path;

use crate::model::model_metadata::ModelMetadata;
use crate::model::model_storage;

/// 推論に必要な情報
pub struct InferenceConfig {
    /// クラスID順の記号
    pub class_labels: Vec<String>,

    /// モデル入力解像度
    pub model_input_size: u32,
}

impl InferenceConfig {
    /// メタデータからInferenceConfigを作成
    pub fn from_metadata(metadata: &ModelMetadata) -> Self {
        Self {
            class_labels: metadata.class_labels.clone(),
            model_input_size: metadata.model_input_size,
        }
    }

    /// モデルファイルから推論設定を読み込む
    pub fn load_from_model(model_path: &Path) -> Result<Self> {
        let metadata =
            model_storage::load_metadata(model_path).context("Failed to load model metadata")?;
        Ok(Self::from_metadata(&metadata))
    }

    pub fn num_total_classes(&self) -> usize {
        self.class_labels.len()
    }

    /// クラスインデックスから記号を取得
    pub fn class_index_to_label(&self, index: usize) -> Option<String> {
        self.class_labels.get(index).cloned()
    }

    /// 記号からクラスインデックスを取得
    pub fn label_to_index(&self, label: &str) -> Option<usize> {
        self.class_labels.iter().position(|l| l == label)
    }

    /// 設定情報を表示
    pub fn print_info(&self) {
        tracing::info!("=== 推論設定 ===");
        tracing::info!("総クラス数: {}", self.num_total_classes());
        tracing::info!("モデル入力サイズ: {}x{}", self.model_input_size, self.model_input_size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::{class_labels, NUM_CLASSES};

    #[test]
    fn test_index_label_lookup() {
        let metadata = ModelMetadata::new(class_labels(), 28, 14, 32, 1e-3, 0, 0, 0.0);
        let config = InferenceConfig::from_metadata(&metadata);

        assert_eq!(config.num_total_classes(), NUM_CLASSES);
        assert_eq!(config.class_index_to_label(19).as_deref(), Some("i"));
        assert_eq!(config.label_to_index("l"), Some(23));
        assert_eq!(config.class_index_to_label(NUM_CLASSES), None);
        assert_eq!(config.label_to_index("?"), None);
    }

    #[test]
    fn test_load_from_model() {
        let tmp = tempfile::tempdir().unwrap();
        let metadata = ModelMetadata::new(class_labels(), 32, 2, 16, 1e-3, 0, 0, 0.0);
        let path =
            model_storage::save_model_with_metadata(&tmp.path().join("m"), &metadata, &[1, 2, 3])
                .unwrap();

        let config = InferenceConfig::load_from_model(&path).unwrap();
        assert_eq!(config.model_input_size, 32);
    }
}
