//! 保存済みモデルの確認用バイナリ
//!
//! 使い方: inspect_model <model.tar.gz> [画像...]

use anyhow::Result;
use char_trainer_lib::backend::{cpu_device, CpuInferenceBackend};
use char_trainer_lib::logging::init_logging;
use char_trainer_lib::ml::InferenceEngine;
use char_trainer_lib::model::{load_metadata, print_metadata_info, AppConfig, InferenceConfig};
use std::path::PathBuf;

fn main() -> Result<()> {
    init_logging("info")?;

    let mut args = std::env::args().skip(1);
    let model_path = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| AppConfig::default().paths.model_path);
    let images: Vec<PathBuf> = args.map(PathBuf::from).collect();

    let metadata = load_metadata(&model_path)?;
    print_metadata_info(&metadata);

    let inference_config = InferenceConfig::load_from_model(&model_path)?;
    inference_config.print_info();

    if images.is_empty() {
        return Ok(());
    }

    let engine = InferenceEngine::<CpuInferenceBackend>::load(&model_path, &cpu_device())?;
    for image in &images {
        match engine.classify_image(image) {
            Ok(symbol) => tracing::info!("{} -> {}", image.display(), symbol),
            Err(e) => tracing::error!("{}: {}", image.display(), e),
        }
    }

    Ok(())
}
