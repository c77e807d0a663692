//! 学習結果のグラフ出力
//!
//! - クラスごとの適合率の棒グラフ
//! - エポックごとの精度・損失の推移（学習 / 検証）

use anyhow::Result;
use plotters::prelude::*;
use std::path::Path;

use crate::labels::{symbol_for_label, NUM_CLASSES};
use crate::ml::{ClassificationReport, TrainingHistory};

/// 棒グラフの1本分
#[derive(Debug, Clone, PartialEq)]
pub struct PrecisionBar {
    pub symbol: String,
    pub precision: f64,
}

fn plot_error<E: std::fmt::Debug>(e: E) -> anyhow::Error {
    anyhow::anyhow!("グラフ描画エラー: {:?}", e)
}

/// 定義済みの全クラスについて、クラスID順に適合率を並べる
///
/// レポートに含まれないクラスは0として扱う
pub fn precision_bars(report: &ClassificationReport) -> Vec<PrecisionBar> {
    (0..NUM_CLASSES)
        .map(|label| PrecisionBar {
            symbol: symbol_for_label(label).unwrap_or("?").to_string(),
            precision: report
                .per_class
                .iter()
                .find(|m| m.label == label)
                .map(|m| m.precision)
                .unwrap_or(0.0),
        })
        .collect()
}

/// 分類レポートの適合率を棒グラフで保存
pub fn plot_classification_report(
    report: &ClassificationReport,
    output_path: &Path,
    size: (u32, u32),
) -> Result<()> {
    let bars = precision_bars(report);
    let num_bars = bars.len() as u32;

    let root = BitMapBackend::new(output_path, size).into_drawing_area();
    root.fill(&WHITE).map_err(plot_error)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Classification Report", ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d((0u32..num_bars).into_segmented(), 0.0f64..1.05f64)
        .map_err(plot_error)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_desc("class")
        .y_desc("precision")
        .x_labels(bars.len())
        .x_label_formatter(&|v| match v {
            SegmentValue::Exact(i) | SegmentValue::CenterOf(i) => bars
                .get(*i as usize)
                .map(|b| b.symbol.clone())
                .unwrap_or_default(),
            SegmentValue::Last => String::new(),
        })
        .draw()
        .map_err(plot_error)?;

    chart
        .draw_series(
            Histogram::vertical(&chart)
                .style(BLUE.mix(0.5).filled())
                .margin(2)
                .data(bars.iter().enumerate().map(|(i, b)| (i as u32, b.precision))),
        )
        .map_err(plot_error)?;

    root.present().map_err(plot_error)?;
    tracing::info!("棒グラフを保存しました: {}", output_path.display());
    Ok(())
}

/// 精度と損失の推移をそれぞれ折れ線グラフで保存
pub fn plot_training_history(
    history: &TrainingHistory,
    accuracy_path: &Path,
    loss_path: &Path,
    size: (u32, u32),
) -> Result<()> {
    draw_history_chart(
        accuracy_path,
        size,
        "Model Accuracy History",
        "accuracy",
        &history.train_accuracy,
        &history.valid_accuracy,
    )?;
    draw_history_chart(
        loss_path,
        size,
        "Model Loss History",
        "loss",
        &history.train_loss,
        &history.valid_loss,
    )?;
    Ok(())
}

fn draw_history_chart(
    output_path: &Path,
    size: (u32, u32),
    title: &str,
    y_desc: &str,
    train: &[f64],
    test: &[f64],
) -> Result<()> {
    let root = BitMapBackend::new(output_path, size).into_drawing_area();
    root.fill(&WHITE).map_err(plot_error)?;

    let num_epochs = train.len().max(test.len());
    let x_max = num_epochs.saturating_sub(1).max(1) as f64;
    let (y_min, y_max) = value_range(train.iter().chain(test).copied());

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(35)
        .y_label_area_size(50)
        .build_cartesian_2d(0.0f64..x_max, y_min..y_max)
        .map_err(plot_error)?;

    chart
        .configure_mesh()
        .x_desc("epoch")
        .y_desc(y_desc)
        .draw()
        .map_err(plot_error)?;

    for (name, values, color) in [("train", train, BLUE), ("test", test, RED)] {
        chart
            .draw_series(LineSeries::new(
                values.iter().enumerate().map(|(i, v)| (i as f64, *v)),
                color.stroke_width(2),
            ))
            .map_err(plot_error)?
            .label(name)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperLeft)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(plot_error)?;

    root.present().map_err(plot_error)?;
    tracing::info!("推移グラフを保存しました: {}", output_path.display());
    Ok(())
}

/// 縦軸の範囲（上下に5%の余白）
fn value_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (min, max) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));

    if !min.is_finite() {
        return (0.0, 1.0);
    }
    if (max - min).abs() < f64::EPSILON {
        return (min - 0.5, max + 0.5);
    }

    let pad = (max - min) * 0.05;
    (min - pad, max + pad)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::CLASS_SYMBOLS;

    #[test]
    fn test_one_bar_per_class() {
        let truth: Vec<usize> = (0..NUM_CLASSES).collect();
        let report = ClassificationReport::from_predictions(&truth, &truth, NUM_CLASSES).unwrap();

        let bars = precision_bars(&report);
        assert_eq!(bars.len(), NUM_CLASSES);
        for (bar, symbol) in bars.iter().zip(CLASS_SYMBOLS) {
            assert_eq!(bar.symbol, symbol);
            assert_eq!(bar.precision, 1.0);
        }
    }

    #[test]
    fn test_bars_cover_classes_missing_from_report() {
        // 数字のみで作ったレポートでも38本になる
        let report = ClassificationReport::from_predictions(&[0, 1, 2], &[0, 1, 1], 10).unwrap();
        let bars = precision_bars(&report);

        assert_eq!(bars.len(), NUM_CLASSES);
        assert_eq!(bars[1].precision, 0.5);
        assert_eq!(bars[10].symbol, "A");
        assert_eq!(bars[10].precision, 0.0);
    }

    #[test]
    fn test_plots_are_written() {
        let tmp = tempfile::tempdir().unwrap();
        let bar_path = tmp.path().join("Barplot.png");
        let accuracy_path = tmp.path().join("EpochsVSAccuracy.png");
        let loss_path = tmp.path().join("EpochsVSLoss.png");

        let report = ClassificationReport::from_predictions(&[0, 10, 23], &[0, 10, 22], NUM_CLASSES).unwrap();
        plot_classification_report(&report, &bar_path, (600, 500)).unwrap();

        let history = TrainingHistory {
            train_accuracy: vec![0.3, 0.6, 0.8],
            valid_accuracy: vec![0.25, 0.5, 0.7],
            train_loss: vec![2.1, 1.2, 0.6],
            valid_loss: vec![2.3, 1.4, 0.9],
        };
        plot_training_history(&history, &accuracy_path, &loss_path, (500, 500)).unwrap();

        for path in [&bar_path, &accuracy_path, &loss_path] {
            let size = std::fs::metadata(path).unwrap().len();
            assert!(size > 0, "{} is empty", path.display());
        }
    }

    #[test]
    fn test_value_range() {
        assert_eq!(value_range(std::iter::empty()), (0.0, 1.0));
        assert_eq!(value_range([0.3, 0.3].into_iter()), (-0.2, 0.8));

        let (lo, hi) = value_range([0.0, 1.0, f64::NAN].into_iter());
        assert!((lo + 0.05).abs() < 1e-9);
        assert!((hi - 1.05).abs() < 1e-9);
    }
}
