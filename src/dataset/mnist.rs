//! MNISTデータの読み込み
//!
//! IDX形式（`*-idx3-ubyte` / `*-idx1-ubyte`、gzip圧縮版も可）を読み込み、
//! 手書き文字データに合わせて「白背景に黒い文字」へ反転します。

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use image::{ImageBuffer, Luma};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::dataset::{DatasetSplit, GlyphItem, GlyphSet};
use crate::labels::NUM_CLASSES;
use crate::ml::resize_luma;

pub const TRAIN_IMAGES: &str = "train-images-idx3-ubyte";
pub const TRAIN_LABELS: &str = "train-labels-idx1-ubyte";
pub const TEST_IMAGES: &str = "t10k-images-idx3-ubyte";
pub const TEST_LABELS: &str = "t10k-labels-idx1-ubyte";

const IMAGES_MAGIC: u32 = 0x0000_0803;
const LABELS_MAGIC: u32 = 0x0000_0801;

/// IDX画像ファイルの中身
#[derive(Debug)]
pub struct IdxImages<'a> {
    pub count: usize,
    pub rows: usize,
    pub cols: usize,
    pub pixels: &'a [u8],
}

/// MNISTの学習用・テスト用データを読み込む
///
/// 画素値は `1 - x / 255` に変換される
pub fn load_mnist(dir: &Path, image_size: usize) -> Result<DatasetSplit> {
    let train = load_idx_pair(dir, TRAIN_IMAGES, TRAIN_LABELS, image_size)?;
    let test = load_idx_pair(dir, TEST_IMAGES, TEST_LABELS, image_size)?;

    tracing::info!(
        "MNISTデータ: 学習 {} 枚 / テスト {} 枚 を {} から読み込みました",
        train.len(),
        test.len(),
        dir.display()
    );

    Ok(DatasetSplit { train, test })
}

fn load_idx_pair(
    dir: &Path,
    images_name: &str,
    labels_name: &str,
    image_size: usize,
) -> Result<GlyphSet> {
    let image_bytes = read_idx_file(dir, images_name)?;
    let label_bytes = read_idx_file(dir, labels_name)?;

    let images = parse_idx_images(&image_bytes)
        .with_context(|| format!("IDX画像ファイルが不正です: {}", images_name))?;
    let labels = parse_idx_labels(&label_bytes)
        .with_context(|| format!("IDXラベルファイルが不正です: {}", labels_name))?;

    if images.count != labels.len() {
        anyhow::bail!(
            "画像数とラベル数が一致しません: {} ({}) / {} ({})",
            images.count,
            images_name,
            labels.len(),
            labels_name
        );
    }

    let needs_resize = images.rows != image_size || images.cols != image_size;
    let pixels_per_image = images.rows * images.cols;
    let mut items = Vec::with_capacity(images.count);

    for (raw, &label) in images.pixels.chunks_exact(pixels_per_image).zip(labels.iter()) {
        let label = label as usize;
        if label >= NUM_CLASSES {
            anyhow::bail!("範囲外のラベルです: {} ({})", label, labels_name);
        }

        // 黒背景の白文字を白背景の黒文字へ反転
        let inverted: Vec<f32> = raw.iter().map(|&p| 1.0 - p as f32 / 255.0).collect();

        let pixels = if needs_resize {
            let img: ImageBuffer<Luma<f32>, Vec<f32>> =
                ImageBuffer::from_raw(images.cols as u32, images.rows as u32, inverted)
                    .ok_or_else(|| anyhow::anyhow!("画像バッファの生成に失敗しました"))?;
            resize_luma(&img, image_size)
        } else {
            inverted
        };

        items.push(GlyphItem { pixels, label });
    }

    Ok(GlyphSet::from_items(items, image_size))
}

/// IDXファイルを読み込む（無ければ `.gz` を試す）
fn read_idx_file(dir: &Path, name: &str) -> Result<Vec<u8>> {
    let plain = dir.join(name);
    if plain.is_file() {
        return std::fs::read(&plain)
            .with_context(|| format!("Failed to read {}", plain.display()));
    }

    let gz = dir.join(format!("{}.gz", name));
    if gz.is_file() {
        let file = File::open(&gz).with_context(|| format!("Failed to open {}", gz.display()))?;
        let mut buffer = Vec::new();
        GzDecoder::new(file)
            .read_to_end(&mut buffer)
            .with_context(|| format!("Failed to decompress {}", gz.display()))?;
        return Ok(buffer);
    }

    anyhow::bail!(
        "MNISTファイルが見つかりません: {} (または {})",
        plain.display(),
        gz.display()
    )
}

fn read_u32_be(bytes: &[u8], offset: usize) -> Result<u32> {
    let chunk = bytes
        .get(offset..offset + 4)
        .ok_or_else(|| anyhow::anyhow!("ヘッダーが途中で切れています"))?;
    Ok(u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
}

/// IDX画像ファイル (magic 0x0803) を解析
pub fn parse_idx_images(bytes: &[u8]) -> Result<IdxImages<'_>> {
    let magic = read_u32_be(bytes, 0)?;
    if magic != IMAGES_MAGIC {
        anyhow::bail!("magic numberが不正です: {:#010x}", magic);
    }

    let count = read_u32_be(bytes, 4)? as usize;
    let rows = read_u32_be(bytes, 8)? as usize;
    let cols = read_u32_be(bytes, 12)? as usize;

    if rows == 0 || cols == 0 {
        anyhow::bail!("画像サイズが不正です: {}x{}", cols, rows);
    }

    let expected = count
        .checked_mul(rows)
        .and_then(|n| n.checked_mul(cols))
        .ok_or_else(|| anyhow::anyhow!("ヘッダーの画像数・サイズが大きすぎます: {} x {}x{}", count, cols, rows))?;
    let end = 16usize
        .checked_add(expected)
        .ok_or_else(|| anyhow::anyhow!("画素データ長が大きすぎます: {} バイト", expected))?;
    let pixels = bytes
        .get(16..end)
        .ok_or_else(|| anyhow::anyhow!("画素データが不足しています (期待: {} バイト)", expected))?;

    Ok(IdxImages {
        count,
        rows,
        cols,
        pixels,
    })
}

/// IDXラベルファイル (magic 0x0801) を解析
pub fn parse_idx_labels(bytes: &[u8]) -> Result<&[u8]> {
    let magic = read_u32_be(bytes, 0)?;
    if magic != LABELS_MAGIC {
        anyhow::bail!("magic numberが不正です: {:#010x}", magic);
    }

    let count = read_u32_be(bytes, 4)? as usize;
    let end = 8usize
        .checked_add(count)
        .ok_or_else(|| anyhow::anyhow!("ラベル数が大きすぎます: {}", count))?;
    bytes
        .get(8..end)
        .ok_or_else(|| anyhow::anyhow!("ラベルデータが不足しています (期待: {} 件)", count))
}
