//! 学習データセット
//!
//! 手書き文字ディレクトリとMNISTの2系統のデータを、同じ形式（リサイズ済み
//! グレースケール画像 + クラスID）で保持します。

pub mod char_folder;
pub mod mnist;

pub use char_folder::load_nist;
pub use mnist::load_mnist;

use anyhow::Result;
use burn::data::dataset::Dataset;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::labels::NUM_CLASSES;

/// 1サンプル（画像 + ラベル）
///
/// `pixels` は `image_size * image_size` 個の輝度値（0.0〜1.0、行優先）
#[derive(Clone, Debug)]
pub struct GlyphItem {
    pub pixels: Vec<f32>,
    pub label: usize,
}

/// サンプル集合
///
/// 画像とラベルを1つのアイテムとして保持するため、両者の件数は常に一致する
#[derive(Clone, Debug, Default)]
pub struct GlyphSet {
    items: Vec<GlyphItem>,
    image_size: usize,
}

/// 学習用とテスト用に分割されたデータ
#[derive(Debug)]
pub struct DatasetSplit {
    pub train: GlyphSet,
    pub test: GlyphSet,
}

impl GlyphSet {
    pub fn new(image_size: usize) -> Self {
        Self {
            items: Vec::new(),
            image_size,
        }
    }

    pub fn from_items(items: Vec<GlyphItem>, image_size: usize) -> Self {
        Self { items, image_size }
    }

    pub fn push(&mut self, item: GlyphItem) {
        self.items.push(item);
    }

    pub fn image_size(&self) -> usize {
        self.image_size
    }

    pub fn items(&self) -> &[GlyphItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// ラベルのみを取り出す
    pub fn labels(&self) -> Vec<usize> {
        self.items.iter().map(|item| item.label).collect()
    }

    /// クラスごとのサンプル数
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; NUM_CLASSES];
        for item in &self.items {
            if let Some(count) = counts.get_mut(item.label) {
                *count += 1;
            }
        }
        counts
    }

    /// 画像とラベルの組を保ったままシャッフル
    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.items.shuffle(rng);
    }

    /// 末尾 `ceil(n * test_ratio)` 件をテスト用に切り出す
    ///
    /// 戻り値: (学習用, テスト用)
    pub fn split_test(mut self, test_ratio: f64) -> (Self, Self) {
        let total_len = self.items.len();
        let test_len = ((total_len as f64 * test_ratio).ceil() as usize).min(total_len);
        let test_items = self.items.split_off(total_len - test_len);

        let test = Self::from_items(test_items, self.image_size);
        (self, test)
    }

    /// 末尾を検証用に切り出す
    ///
    /// 先頭 `floor(n * (1 - fraction))` 件が学習用、残りが検証用。
    /// 戻り値: (学習用, 検証用)
    pub fn split_validation(mut self, fraction: f64) -> (Self, Self) {
        let total_len = self.items.len();
        let split_at = ((total_len as f64 * (1.0 - fraction)) as usize).min(total_len);
        let valid_items = self.items.split_off(split_at);

        let valid = Self::from_items(valid_items, self.image_size);
        (self, valid)
    }

    /// 2つの集合を連結する
    ///
    /// 両方を消費するので、連結元のバッファはここで解放される
    pub fn concat(mut self, mut other: Self) -> Result<Self> {
        if self.image_size != other.image_size {
            anyhow::bail!(
                "画像サイズが一致しないデータセットは連結できません: {} と {}",
                self.image_size,
                other.image_size
            );
        }
        self.items.append(&mut other.items);
        Ok(self)
    }
}

impl Dataset<GlyphItem> for GlyphSet {
    fn get(&self, index: usize) -> Option<GlyphItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

impl DatasetSplit {
    /// 学習用・テスト用をそれぞれ連結する
    pub fn merge(self, other: DatasetSplit) -> Result<DatasetSplit> {
        let train = self.train.concat(other.train)?;
        let test = self.test.concat(other.test)?;
        Ok(DatasetSplit { train, test })
    }

    pub fn total_len(&self) -> usize {
        self.train.len() + self.test.len()
    }
}
