//! 手書き文字ディレクトリの読み込み
//!
//! データセットルート直下のサブディレクトリ名がクラス記号、
//! その中のファイルがそのクラスの画像です。
//!
//! ```text
//! data/
//!   0/ img001.png ...
//!   A/ ...
//!   l/ ...
//! ```

use anyhow::{Context, Result};
use rand::Rng;
use std::path::{Path, PathBuf};

use crate::dataset::{DatasetSplit, GlyphItem, GlyphSet};
use crate::labels::{label_for_symbol, symbol_for_label};
use crate::ml::load_grayscale_image;

/// ディレクトリからデータを読み込み、シャッフルして学習用/テスト用に分割する
///
/// # 引数
/// - `root`: データセットルート
/// - `image_size`: リサイズ後の一辺のピクセル数
/// - `test_ratio`: テスト用の割合（末尾 `ceil(n * test_ratio)` 件）
/// - `rng`: シャッフル用の乱数生成器
pub fn load_nist<R: Rng + ?Sized>(
    root: &Path,
    image_size: usize,
    test_ratio: f64,
    rng: &mut R,
) -> Result<DatasetSplit> {
    let mut set = GlyphSet::new(image_size);

    for (class_dir, label) in class_directories(root)? {
        let mut image_count = 0;

        for path in sorted_files(&class_dir)? {
            let pixels = load_grayscale_image(&path, image_size)?;
            set.push(GlyphItem { pixels, label });
            image_count += 1;
        }

        tracing::debug!(
            "  クラス '{}': {} 枚",
            symbol_for_label(label).unwrap_or("?"),
            image_count
        );
    }

    if set.is_empty() {
        anyhow::bail!("No training samples found in {}", root.display());
    }

    let counts = set.class_counts();
    let num_present = counts.iter().filter(|c| **c > 0).count();
    tracing::info!(
        "手書き文字データ: {} 枚 ({} クラス) を {} から読み込みました",
        set.len(),
        num_present,
        root.display()
    );

    set.shuffle(rng);
    let (train, test) = set.split_test(test_ratio);

    tracing::info!("  学習データ: {} 枚 / テストデータ: {} 枚", train.len(), test.len());

    Ok(DatasetSplit { train, test })
}

/// クラスディレクトリを名前順に列挙する
///
/// 定義されていない名前のディレクトリがあればエラー
fn class_directories(root: &Path) -> Result<Vec<(PathBuf, usize)>> {
    let entries = std::fs::read_dir(root)
        .with_context(|| format!("データセットディレクトリを開けません: {}", root.display()))?;

    let mut dirs = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if !path.is_dir() {
            continue;
        }

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow::anyhow!("Invalid directory name: {}", path.display()))?;
        let label = label_for_symbol(name)
            .ok_or_else(|| anyhow::anyhow!("未定義のクラスディレクトリです: {}", path.display()))?;

        dirs.push((path, label));
    }

    dirs.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(dirs)
}

/// ディレクトリ内のファイルを名前順に列挙する（ドットファイルは除外）
fn sorted_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("クラスディレクトリを開けません: {}", dir.display()))?
    {
        let path = entry?.path();
        let hidden = path
            .file_name()
            .map(|n| n.to_string_lossy().starts_with('.'))
            .unwrap_or(true);

        if path.is_file() && !hidden {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::NUM_CLASSES;
    use image::{GrayImage, Luma};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn write_glyph(dir: &Path, name: &str, size: u32, value: u8) {
        let img = GrayImage::from_pixel(size, size, Luma([value]));
        img.save(dir.join(name)).unwrap();
    }

    fn make_tree(root: &Path, classes: &[&str], per_class: usize) {
        for class in classes {
            let dir = root.join(class);
            std::fs::create_dir_all(&dir).unwrap();
            for i in 0..per_class {
                // 元画像のサイズはまちまちでもよい
                write_glyph(&dir, &format!("{}.png", i), 20 + i as u32 * 7, 255);
            }
        }
    }

    #[test]
    fn test_load_nist_shapes() {
        let tmp = tempfile::tempdir().unwrap();
        make_tree(tmp.path(), &["0", "A", "l", "Z"], 5);

        let mut rng = StdRng::seed_from_u64(42);
        let split = load_nist(tmp.path(), 28, 0.2, &mut rng).unwrap();

        assert_eq!(split.total_len(), 20);
        assert_eq!(split.test.len(), 4);
        assert_eq!(split.train.len(), 16);

        for item in split.train.items().iter().chain(split.test.items()) {
            assert_eq!(item.pixels.len(), 28 * 28);
            assert!(item.label < NUM_CLASSES);
            assert!(item.pixels.iter().all(|v| (0.0..=1.0).contains(v)));
        }

        let mut labels = split.train.labels();
        labels.extend(split.test.labels());
        labels.sort();
        labels.dedup();
        assert_eq!(labels, vec![0, 10, 23, 37]);
    }

    #[test]
    fn test_white_background_stays_white() {
        let tmp = tempfile::tempdir().unwrap();
        make_tree(tmp.path(), &["B"], 1);

        let mut rng = StdRng::seed_from_u64(1);
        let split = load_nist(tmp.path(), 28, 0.0, &mut rng).unwrap();

        assert_eq!(split.test.len(), 0);
        let item = &split.train.items()[0];
        assert!(item.pixels.iter().all(|v| (*v - 1.0).abs() < 1e-4));
    }

    #[test]
    fn test_unknown_class_directory_fails() {
        let tmp = tempfile::tempdir().unwrap();
        make_tree(tmp.path(), &["A", "not_a_class"], 1);

        let mut rng = StdRng::seed_from_u64(1);
        let err = load_nist(tmp.path(), 28, 0.2, &mut rng).unwrap_err();
        assert!(err.to_string().contains("not_a_class"));
    }

    #[test]
    fn test_unreadable_image_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("7");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("broken.png"), b"not an image").unwrap();

        let mut rng = StdRng::seed_from_u64(1);
        assert!(load_nist(tmp.path(), 28, 0.2, &mut rng).is_err());
    }

    #[test]
    fn test_hidden_files_skipped_and_empty_root_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("3");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(".DS_Store"), b"junk").unwrap();

        let mut rng = StdRng::seed_from_u64(1);
        let err = load_nist(tmp.path(), 28, 0.2, &mut rng).unwrap_err();
        assert!(err.to_string().contains("No training samples"));
    }

    #[test]
    fn test_missing_root_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(load_nist(&tmp.path().join("missing"), 28, 0.2, &mut rng).is_err());
    }
}
