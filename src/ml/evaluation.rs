//! テストデータでの評価
//!
//! 予測クラスの取得と、クラスごとの適合率・再現率・F1値の集計（分類レポート）。

use anyhow::Result;
use burn::{data::dataloader::batcher::Batcher, tensor::backend::Backend};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

use crate::dataset::GlyphSet;
use crate::labels::symbol_for_label;
use crate::ml::{CharClassifier, GlyphBatch, GlyphBatcher};

/// クラスごとの評価値
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub label: usize,
    pub symbol: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// テストデータ中のこのクラスのサンプル数
    pub support: usize,
}

/// 平均値（macro / weighted）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AverageMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// 分類レポート
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub per_class: Vec<ClassMetrics>,
    pub accuracy: f64,
    pub macro_avg: AverageMetrics,
    pub weighted_avg: AverageMetrics,
}

/// 正解率
pub fn accuracy_score(truth: &[usize], predicted: &[usize]) -> f64 {
    if truth.is_empty() {
        return 0.0;
    }
    let correct = truth.iter().zip(predicted).filter(|(t, p)| t == p).count();
    correct as f64 / truth.len() as f64
}

impl ClassificationReport {
    /// 正解ラベルと予測ラベルからレポートを作成
    ///
    /// 予測が1件もないクラスの適合率、サンプルがないクラスの再現率は0とする
    pub fn from_predictions(truth: &[usize], predicted: &[usize], num_classes: usize) -> Result<Self> {
        if truth.len() != predicted.len() {
            anyhow::bail!(
                "正解ラベル数と予測数が一致しません: {} / {}",
                truth.len(),
                predicted.len()
            );
        }

        let mut true_positive = vec![0usize; num_classes];
        let mut predicted_count = vec![0usize; num_classes];
        let mut support = vec![0usize; num_classes];

        for (&t, &p) in truth.iter().zip(predicted) {
            if t >= num_classes || p >= num_classes {
                anyhow::bail!("範囲外のクラスIDです: 正解 {} / 予測 {}", t, p);
            }
            support[t] += 1;
            predicted_count[p] += 1;
            if t == p {
                true_positive[t] += 1;
            }
        }

        let per_class: Vec<ClassMetrics> = (0..num_classes)
            .map(|label| {
                let precision = ratio(true_positive[label], predicted_count[label]);
                let recall = ratio(true_positive[label], support[label]);
                let f1 = if precision + recall > 0.0 {
                    2.0 * precision * recall / (precision + recall)
                } else {
                    0.0
                };

                ClassMetrics {
                    label,
                    symbol: symbol_for_label(label).unwrap_or("?").to_string(),
                    precision,
                    recall,
                    f1,
                    support: support[label],
                }
            })
            .collect();

        let total_support: usize = support.iter().sum();
        let n = num_classes.max(1) as f64;

        let macro_avg = AverageMetrics {
            precision: per_class.iter().map(|m| m.precision).sum::<f64>() / n,
            recall: per_class.iter().map(|m| m.recall).sum::<f64>() / n,
            f1: per_class.iter().map(|m| m.f1).sum::<f64>() / n,
            support: total_support,
        };

        let weighted = |value: fn(&ClassMetrics) -> f64| {
            if total_support == 0 {
                0.0
            } else {
                per_class
                    .iter()
                    .map(|m| value(m) * m.support as f64)
                    .sum::<f64>()
                    / total_support as f64
            }
        };
        let weighted_avg = AverageMetrics {
            precision: weighted(|m| m.precision),
            recall: weighted(|m| m.recall),
            f1: weighted(|m| m.f1),
            support: total_support,
        };

        Ok(Self {
            per_class,
            accuracy: accuracy_score(truth, predicted),
            macro_avg,
            weighted_avg,
        })
    }

    /// 表形式のテキスト
    pub fn to_text(&self, digits: usize) -> String {
        let width = digits + 7;
        let mut text = String::new();

        let _ = writeln!(
            text,
            "{:>12} {:>width$} {:>width$} {:>width$} {:>9}",
            "",
            "precision",
            "recall",
            "f1-score",
            "support",
            width = width
        );
        let _ = writeln!(text);

        for m in &self.per_class {
            let _ = writeln!(
                text,
                "{:>12} {:>width$.digits$} {:>width$.digits$} {:>width$.digits$} {:>9}",
                m.symbol,
                m.precision,
                m.recall,
                m.f1,
                m.support,
                width = width,
                digits = digits
            );
        }
        let _ = writeln!(text);

        let _ = writeln!(
            text,
            "{:>12} {:>width$} {:>width$} {:>width$.digits$} {:>9}",
            "accuracy",
            "",
            "",
            self.accuracy,
            self.macro_avg.support,
            width = width,
            digits = digits
        );
        for (name, avg) in [("macro avg", &self.macro_avg), ("weighted avg", &self.weighted_avg)] {
            let _ = writeln!(
                text,
                "{:>12} {:>width$.digits$} {:>width$.digits$} {:>width$.digits$} {:>9}",
                name,
                avg.precision,
                avg.recall,
                avg.f1,
                avg.support,
                width = width,
                digits = digits
            );
        }

        text
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// データセット全体の予測クラスIDを返す
pub fn predict_classes<B: Backend>(
    model: &CharClassifier<B>,
    set: &GlyphSet,
    batch_size: usize,
    device: &B::Device,
) -> Result<Vec<usize>> {
    let batcher = GlyphBatcher::new(set.image_size());
    let mut predictions = Vec::with_capacity(set.len());

    for chunk in set.items().chunks(batch_size.max(1)) {
        let batch: GlyphBatch<B> = batcher.batch(chunk.to_vec(), device);
        let predicted = model
            .predict(batch.images)
            .into_data()
            .convert::<i64>()
            .to_vec::<i64>()
            .map_err(|e| anyhow::anyhow!("推論結果の取得エラー: {:?}", e))?;

        predictions.extend(predicted.into_iter().map(|p| p as usize));
    }

    Ok(predictions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::GlyphItem;
    use crate::labels::NUM_CLASSES;
    use crate::ml::ModelConfig;
    use burn_ndarray::{NdArray, NdArrayDevice};

    #[test]
    fn test_accuracy_score() {
        assert_eq!(accuracy_score(&[1, 2, 3, 4], &[1, 2, 0, 0]), 0.5);
        assert_eq!(accuracy_score(&[], &[]), 0.0);
    }

    #[test]
    fn test_report_per_class_values() {
        // クラス0: TP=2, FP=1, FN=0 / クラス1: TP=1, FP=0, FN=1
        let truth = [0, 0, 1, 1];
        let predicted = [0, 0, 0, 1];
        let report = ClassificationReport::from_predictions(&truth, &predicted, 3).unwrap();

        let c0 = &report.per_class[0];
        assert!((c0.precision - 2.0 / 3.0).abs() < 1e-9);
        assert!((c0.recall - 1.0).abs() < 1e-9);
        assert!((c0.f1 - 0.8).abs() < 1e-9);
        assert_eq!(c0.support, 2);

        let c1 = &report.per_class[1];
        assert!((c1.precision - 1.0).abs() < 1e-9);
        assert!((c1.recall - 0.5).abs() < 1e-9);

        // 予測もサンプルもないクラスは0
        let c2 = &report.per_class[2];
        assert_eq!(c2.precision, 0.0);
        assert_eq!(c2.recall, 0.0);
        assert_eq!(c2.f1, 0.0);
        assert_eq!(c2.support, 0);

        assert!((report.accuracy - 0.75).abs() < 1e-9);
        assert_eq!(report.weighted_avg.support, 4);
        let expected_macro_precision = (2.0 / 3.0 + 1.0 + 0.0) / 3.0;
        assert!((report.macro_avg.precision - expected_macro_precision).abs() < 1e-9);
        let expected_weighted_recall = (1.0 * 2.0 + 0.5 * 2.0) / 4.0;
        assert!((report.weighted_avg.recall - expected_weighted_recall).abs() < 1e-9);
    }

    #[test]
    fn test_report_rejects_mismatch() {
        assert!(ClassificationReport::from_predictions(&[0, 1], &[0], 2).is_err());
        assert!(ClassificationReport::from_predictions(&[0, 5], &[0, 1], 2).is_err());
    }

    #[test]
    fn test_report_text_uses_symbols() {
        let report =
            ClassificationReport::from_predictions(&[10, 19], &[10, 18], NUM_CLASSES).unwrap();
        let text = report.to_text(3);

        assert!(text.contains("precision"));
        assert!(text.contains("weighted avg"));
        assert!(text.contains("1.000"));
        // クラス行 + 見出し/空行/平均行
        let class_lines = text
            .lines()
            .filter(|l| report.per_class.iter().any(|m| l.trim_start().starts_with(&format!("{} ", m.symbol))))
            .count();
        assert_eq!(class_lines, NUM_CLASSES);
    }

    #[test]
    fn test_predict_classes_covers_every_item() {
        let device = NdArrayDevice::Cpu;
        let model = ModelConfig::new(NUM_CLASSES)
            .init::<NdArray<f32>>(&device)
            .unwrap();

        let items = (0..7)
            .map(|i| GlyphItem {
                pixels: vec![i as f32 / 7.0; 28 * 28],
                label: i,
            })
            .collect();
        let set = GlyphSet::from_items(items, 28);

        let predictions = predict_classes(&model, &set, 3, &device).unwrap();
        assert_eq!(predictions.len(), 7);
        assert!(predictions.iter().all(|p| *p < NUM_CLASSES));
    }
}
