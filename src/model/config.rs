//! アプリケーション設定管理モジュール
//!
//! 計算デバイスや入出力パス、学習条件をJSON形式で読み込みます。
//! 設定ファイルが無い場合はすべてデフォルト値で動作します。

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::ml::MIN_IMAGE_SIZE;

/// 計算デバイスの種類
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum DeviceType {
    /// WGPU (GPU) バックエンド
    #[default]
    Wgpu,
    /// NdArray (CPU) バックエンド
    Cpu,
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceType::Wgpu => write!(f, "WGPU (GPU)"),
            DeviceType::Cpu => write!(f, "CPU (NdArray)"),
        }
    }
}

/// 入出力パス
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    /// 手書き文字データセットのルート（サブディレクトリ名 = クラス記号）
    pub data_dir: PathBuf,
    /// MNISTのIDXファイルを置いたディレクトリ
    pub mnist_dir: PathBuf,
    /// 学習済みモデルの保存先（.tar.gz）
    pub model_path: PathBuf,
    /// クラスごとの適合率の棒グラフ
    pub bar_plot_path: PathBuf,
    /// 精度の推移グラフ
    pub accuracy_plot_path: PathBuf,
    /// 損失の推移グラフ
    pub loss_plot_path: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("../data"),
            mnist_dir: PathBuf::from("./mnist"),
            model_path: PathBuf::from("./cnn.tar.gz"),
            bar_plot_path: PathBuf::from("Barplot.png"),
            accuracy_plot_path: PathBuf::from("EpochsVSAccuracy.png"),
            loss_plot_path: PathBuf::from("EpochsVSLoss.png"),
        }
    }
}

/// トレーニング設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSettings {
    /// エポック数
    pub num_epochs: usize,
    /// バッチサイズ
    pub batch_size: usize,
    /// 学習率 (Adam)
    pub learning_rate: f64,
    /// ランダムシード
    pub seed: u64,
    /// 手書き文字データのうちテストに回す割合
    pub test_ratio: f64,
    /// 学習データ末尾のうち検証に回す割合
    pub validation_split: f64,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            num_epochs: 14,
            batch_size: 32,
            learning_rate: 1e-3,
            seed: 42,
            test_ratio: 0.2,
            validation_split: 0.2,
        }
    }
}

/// グラフ画像のサイズ（ピクセル）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotSettings {
    pub line_figure_size: (u32, u32),
    pub bar_figure_size: (u32, u32),
}

impl Default for PlotSettings {
    fn default() -> Self {
        Self {
            line_figure_size: (500, 500),
            bar_figure_size: (600, 500),
        }
    }
}

/// 設定ファイルの読み込み結果
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigLoadStatus {
    /// 設定ファイルを読み込んだ
    Loaded(PathBuf),
    /// 設定ファイルが無いのでデフォルト設定
    NotFound,
    /// 読み込みに失敗したのでデフォルト設定
    Fallback { path: PathBuf, error: String },
}

impl ConfigLoadStatus {
    /// 読み込み結果をログに出力（失敗時は警告）
    pub fn log(&self) {
        match self {
            ConfigLoadStatus::Loaded(path) => {
                tracing::info!("設定ファイルを読み込みました: {}", path.display())
            }
            ConfigLoadStatus::NotFound => {
                tracing::info!("設定ファイルが存在しません。デフォルト設定を使用します")
            }
            ConfigLoadStatus::Fallback { path, error } => tracing::warn!(
                "設定ファイルの読み込みに失敗しました ({}): {}。デフォルト設定を使用します",
                path.display(),
                error
            ),
        }
    }
}

/// アプリケーション設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// 計算デバイスの種類
    pub device_type: DeviceType,
    /// 入出力パス
    pub paths: PathSettings,
    /// トレーニング設定
    pub training: TrainingSettings,
    /// 入力画像サイズ（正方形、ピクセル）
    pub image_size: usize,
    /// グラフ設定
    pub plot: PlotSettings,
    /// ログレベル (trace / debug / info / warn / error)
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            device_type: DeviceType::default(),
            paths: PathSettings::default(),
            training: TrainingSettings::default(),
            image_size: 28,
            plot: PlotSettings::default(),
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// 設定ファイルのデフォルトパス
    pub fn default_path() -> PathBuf {
        PathBuf::from("./train_config.json")
    }

    /// 設定を読み込む
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// デフォルトパスから設定を読み込む、存在しない場合はデフォルト設定を返す
    ///
    /// ログ初期化前に呼ばれるため、読み込み結果も一緒に返す
    pub fn load_or_default() -> (Self, ConfigLoadStatus) {
        Self::load_path_or_default(&Self::default_path())
    }

    /// 指定パスから設定を読み込む、存在しないか壊れている場合はデフォルト設定を返す
    pub fn load_path_or_default(path: &Path) -> (Self, ConfigLoadStatus) {
        if !path.exists() {
            return (Self::default(), ConfigLoadStatus::NotFound);
        }
        match Self::load(path) {
            Ok(config) => (config, ConfigLoadStatus::Loaded(path.to_path_buf())),
            Err(e) => (
                Self::default(),
                ConfigLoadStatus::Fallback {
                    path: path.to_path_buf(),
                    error: e.to_string(),
                },
            ),
        }
    }

    /// 値の範囲チェック
    pub fn validate(&self) -> anyhow::Result<()> {
        let t = &self.training;
        if t.num_epochs == 0 {
            anyhow::bail!("エポック数は1以上が必要です");
        }
        if t.batch_size == 0 {
            anyhow::bail!("バッチサイズは1以上が必要です");
        }
        if !(t.learning_rate > 0.0) {
            anyhow::bail!("学習率は正の値が必要です: {}", t.learning_rate);
        }
        if !(0.0..1.0).contains(&t.test_ratio) {
            anyhow::bail!("test_ratioは0以上1未満が必要です: {}", t.test_ratio);
        }
        if !(0.0..1.0).contains(&t.validation_split) {
            anyhow::bail!("validation_splitは0以上1未満が必要です: {}", t.validation_split);
        }
        if self.image_size < MIN_IMAGE_SIZE {
            anyhow::bail!(
                "画像サイズが小さすぎます: {} (最小{})",
                self.image_size,
                MIN_IMAGE_SIZE
            );
        }
        let (w, h) = self.plot.line_figure_size;
        let (bw, bh) = self.plot.bar_figure_size;
        if w == 0 || h == 0 || bw == 0 || bh == 0 {
            anyhow::bail!("グラフサイズは1ピクセル以上が必要です");
        }
        Ok(())
    }

    /// 設定情報を表示
    pub fn display(&self) {
        tracing::info!("=== アプリケーション設定 ===");
        tracing::info!("計算デバイス: {}", self.device_type);
        tracing::info!("データセット: {}", self.paths.data_dir.display());
        tracing::info!("MNIST: {}", self.paths.mnist_dir.display());
        tracing::info!("モデル保存先: {}", self.paths.model_path.display());
        tracing::info!("画像サイズ: {}x{}", self.image_size, self.image_size);
        tracing::info!(
            "エポック数: {}, バッチサイズ: {}, 学習率: {}, シード: {}",
            self.training.num_epochs,
            self.training.batch_size,
            self.training.learning_rate,
            self.training.seed
        );
        tracing::info!(
            "テスト割合: {}, 検証割合: {}",
            self.training.test_ratio,
            self.training.validation_split
        );
    }
}
