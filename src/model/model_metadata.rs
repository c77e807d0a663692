//! モデルメタデータの定義
//!
//! 学習済みモデルと一緒に保存し、推論時のモデル復元とクラス名の解決に使います。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// モデルメタデータ
///
/// tar.gz形式で保存される情報：
/// - metadata.json: このメタデータ（JSON形式）
/// - model.bin: モデルの重み（バイナリ）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// クラスID順の記号
    /// 例: ["0", "1", ..., "A", ..., "Z"]
    pub class_labels: Vec<String>,

    /// モデル入力サイズ（正方形、通常28）
    pub model_input_size: u32,

    /// 学習エポック数
    pub num_epochs: u32,

    /// バッチサイズ
    #[serde(default)]
    pub batch_size: usize,

    /// 学習率
    #[serde(default)]
    pub learning_rate: f64,

    /// 学習に使ったサンプル数（検証用を含む）
    #[serde(default)]
    pub train_samples: usize,

    /// テストサンプル数
    #[serde(default)]
    pub test_samples: usize,

    /// テストデータでの正解率
    #[serde(default)]
    pub test_accuracy: f64,

    /// モデルの学習時刻（ISO8601形式）
    pub trained_at: String,
}

impl ModelMetadata {
    /// 新しいメタデータを作成
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        class_labels: Vec<String>,
        model_input_size: u32,
        num_epochs: u32,
        batch_size: usize,
        learning_rate: f64,
        train_samples: usize,
        test_samples: usize,
        test_accuracy: f64,
    ) -> Self {
        let trained_at = chrono::Local::now().to_rfc3339();

        Self {
            class_labels,
            model_input_size,
            num_epochs,
            batch_size,
            learning_rate,
            train_samples,
            test_samples,
            test_accuracy,
            trained_at,
        }
    }

    /// メタデータをJSON文字列に変換
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize metadata to JSON")
    }

    /// JSON文字列からメタデータを生成
    pub fn from_json_string(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to deserialize metadata from JSON")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trained_at_is_rfc3339() {
        let metadata = ModelMetadata::new(vec!["0".into()], 28, 14, 32, 1e-3, 100, 20, 0.9);
        assert!(chrono::DateTime::parse_from_rfc3339(&metadata.trained_at).is_ok());
    }

    #[test]
    fn test_optional_fields_default() {
        let json = r#"{
            "class_labels": ["0", "1"],
            "model_input_size": 28,
            "num_epochs": 3,
            "trained_at": "2024-01-01T00:00:00+00:00"
        }"#;
        let metadata = ModelMetadata::from_json_string(json).unwrap();
        assert_eq!(metadata.class_labels.len(), 2);
        assert_eq!(metadata.batch_size, 0);
        assert_eq!(metadata.test_accuracy, 0.0);
    }

    #[test]
    fn test_invalid_json_fails() {
        assert!(ModelMetadata::from_json_string("{").is_err());
    }
}
