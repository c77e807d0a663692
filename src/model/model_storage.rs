//! モデルとメタデータの永続化
//!
//! Tar.gz形式でモデルとメタデータを1ファイルに統合して保存・読み込みします。
//!
//! ファイル構成（tar.gz内部）:
//! - metadata.json   - メタデータ（クラス記号、入力サイズ、学習条件など）
//! - model.bin       - モデルの重み（バイナリ）

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tar::{Archive, Builder};

use crate::model::model_metadata::ModelMetadata;

const METADATA_ENTRY: &str = "metadata.json";
const MODEL_ENTRY: &str = "model.bin";

/// 保存先パスを `.tar.gz` に揃える
pub fn archive_path(output_path: &Path) -> PathBuf {
    if output_path.extension().and_then(|s| s.to_str()) == Some("gz") {
        output_path.to_path_buf()
    } else {
        output_path.with_extension("tar.gz")
    }
}

/// メタデータと共にモデルをTar.gz形式で保存
///
/// # 戻り値
/// - 実際に書き込んだパス
pub fn save_model_with_metadata(
    output_path: &Path,
    metadata: &ModelMetadata,
    model_binary: &[u8],
) -> Result<PathBuf> {
    let tar_gz_path = archive_path(output_path);

    if let Some(parent) = tar_gz_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create parent directory: {:?}", parent))?;
        }
    }

    let tar_gz_file = File::create(&tar_gz_path)
        .with_context(|| format!("Failed to create tar.gz file: {:?}", tar_gz_path))?;

    let encoder = GzEncoder::new(tar_gz_file, Compression::default());
    let mut tar_builder = Builder::new(encoder);

    let json_str = metadata.to_json_string()?;
    append_entry(&mut tar_builder, METADATA_ENTRY, json_str.as_bytes())?;
    append_entry(&mut tar_builder, MODEL_ENTRY, model_binary)?;

    tar_builder
        .into_inner()
        .context("Failed to finalize tar.gz archive")?
        .finish()
        .context("Failed to finish gzip stream")?;

    Ok(tar_gz_path)
}

fn append_entry<W: std::io::Write>(builder: &mut Builder<W>, name: &str, data: &[u8]) -> Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_path(name)?;
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append(&header, data)
        .with_context(|| format!("Failed to add {} to tar", name))
}

/// アーカイブ内の指定エントリを読み出す
fn read_entry(tar_gz_path: &Path, name: &str) -> Result<Vec<u8>> {
    let tar_gz_file = File::open(tar_gz_path)
        .with_context(|| format!("Failed to open tar.gz file: {:?}", tar_gz_path))?;
    let mut archive = Archive::new(GzDecoder::new(tar_gz_file));

    for entry in archive.entries()? {
        let mut entry = entry?;
        if entry.path()?.to_str() == Some(name) {
            let mut buffer = Vec::new();
            entry.read_to_end(&mut buffer)?;
            return Ok(buffer);
        }
    }

    Err(anyhow::anyhow!("{} not found in tar.gz archive", name))
}

/// Tar.gzからモデルメタデータを読み込む
pub fn load_metadata(tar_gz_path: &Path) -> Result<ModelMetadata> {
    let bytes = read_entry(tar_gz_path, METADATA_ENTRY)?;
    let json_str = String::from_utf8(bytes).context("metadata.json is not valid UTF-8")?;
    ModelMetadata::from_json_string(&json_str)
}

/// Tar.gzからモデルバイナリを読み込む
pub fn load_model_binary(tar_gz_path: &Path) -> Result<Vec<u8>> {
    read_entry(tar_gz_path, MODEL_ENTRY)
}

/// メタデータとモデルバイナリを共に読み込む
pub fn load_model_with_metadata(tar_gz_path: &Path) -> Result<(ModelMetadata, Vec<u8>)> {
    let metadata = load_metadata(tar_gz_path)?;
    let binary = load_model_binary(tar_gz_path)?;
    Ok((metadata, binary))
}

/// メタデータをログに出力
pub fn print_metadata_info(metadata: &ModelMetadata) {
    tracing::info!("=== モデルメタデータ ===");
    tracing::info!("クラス数: {}", metadata.class_labels.len());
    tracing::info!("クラス記号: {}", metadata.class_labels.join(" "));
    tracing::info!(
        "モデル入力サイズ: {}x{}",
        metadata.model_input_size,
        metadata.model_input_size
    );
    tracing::info!(
        "学習条件: {} エポック, バッチサイズ {}, 学習率 {}",
        metadata.num_epochs,
        metadata.batch_size,
        metadata.learning_rate
    );
    tracing::info!(
        "サンプル数: 学習 {} / テスト {}",
        metadata.train_samples,
        metadata.test_samples
    );
    tracing::info!("テスト正解率: {:.4}", metadata.test_accuracy);
    tracing::info!("学習日時: {}", metadata.trained_at);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_metadata() -> ModelMetadata {
        ModelMetadata::new(
            vec!["0".into(), "A".into(), "l".into()],
            28,
            14,
            32,
            1e-3,
            1000,
            250,
            0.875,
        )
    }

    #[test]
    fn test_archive_path_extension() {
        assert_eq!(archive_path(Path::new("out/cnn")), PathBuf::from("out/cnn.tar.gz"));
        assert_eq!(archive_path(Path::new("cnn.h5")), PathBuf::from("cnn.tar.gz"));
        assert_eq!(archive_path(Path::new("cnn.tar.gz")), PathBuf::from("cnn.tar.gz"));
    }

    #[test]
    fn test_save_and_load_archive() {
        let tmp = tempfile::tempdir().unwrap();
        let binary: Vec<u8> = (0..=255u8).cycle().take(4096).collect();

        let written =
            save_model_with_metadata(&tmp.path().join("nested/cnn"), &sample_metadata(), &binary)
                .unwrap();
        assert!(written.ends_with("nested/cnn.tar.gz"));

        let (metadata, loaded) = load_model_with_metadata(&written).unwrap();
        assert_eq!(loaded, binary);
        assert_eq!(metadata.class_labels, vec!["0", "A", "l"]);
        assert_eq!(metadata.test_samples, 250);
        assert_eq!(load_model_binary(&written).unwrap().len(), 4096);
    }

    #[test]
    fn test_missing_entry_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("empty.tar.gz");

        let encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        let builder = Builder::new(encoder);
        builder.into_inner().unwrap().finish().unwrap();

        let err = load_metadata(&path).unwrap_err();
        assert!(err.to_string().contains(METADATA_ENTRY));
    }
}
