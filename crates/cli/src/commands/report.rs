//! Table renderers shared by the offline commands

use iku_lib::{
    evaluation::{rank_importances, CorrelationMatrix, EvaluationMetrics, HotMetrics, HotTestReport, HotTestRow},
    NUM_FEATURES,
};
use tabled::{builder::Builder, settings::Style, Tabled};

use crate::output::{
    color_category, color_regime, format_iku, format_optional, format_percent, print_heading,
    print_table, FieldRow,
};

/// Row for per-province prediction tables
#[derive(Tabled)]
struct ProvinceRow {
    #[tabled(rename = "#")]
    rank: usize,
    #[tabled(rename = "Province")]
    province: String,
    #[tabled(rename = "Prediction")]
    prediction: String,
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "Regime")]
    regime: String,
    #[tabled(rename = "Actual")]
    actual: String,
    #[tabled(rename = "Error")]
    error: String,
}

/// Row for feature importance tables
#[derive(Tabled)]
struct ImportanceRow {
    #[tabled(rename = "#")]
    rank: usize,
    #[tabled(rename = "Feature")]
    feature: String,
    #[tabled(rename = "Importance")]
    importance: String,
}

fn province_rows<'a>(rows: impl IntoIterator<Item = &'a HotTestRow>) -> Vec<ProvinceRow> {
    rows.into_iter()
        .enumerate()
        .map(|(i, row)| ProvinceRow {
            rank: i + 1,
            province: row.province.clone(),
            prediction: format_iku(row.prediction),
            category: color_category(row.category),
            regime: color_regime(row.regime),
            actual: format_optional(row.actual),
            error: format_optional(row.error),
        })
        .collect()
}

pub fn print_importances(importances: &[f64; NUM_FEATURES]) {
    let rows: Vec<ImportanceRow> = rank_importances(importances)
        .into_iter()
        .enumerate()
        .map(|(i, (feature, importance))| ImportanceRow {
            rank: i + 1,
            feature: feature.to_string(),
            importance: format_percent(importance),
        })
        .collect();
    print_heading("Feature importance");
    print_table(rows);
}

pub fn print_evaluation(metrics: &EvaluationMetrics) {
    let mut rows = vec![
        FieldRow::new("R² train", format!("{:.4}", metrics.r2_train)),
        FieldRow::new("R² test", format!("{:.4}", metrics.r2_test)),
        FieldRow::new("RMSE test", format!("{:.4}", metrics.rmse_test)),
        FieldRow::new("MAPE test", format!("{:.2}%", metrics.mape_test)),
    ];
    if let Some(hot) = &metrics.hot {
        rows.extend(hot_metric_rows(hot));
    }
    print_heading("Evaluation");
    print_table(rows);
}

fn hot_metric_rows(hot: &HotMetrics) -> Vec<FieldRow> {
    vec![
        FieldRow::new("R² hot test", format!("{:.4}", hot.r2_hot)),
        FieldRow::new("RMSE hot test", format!("{:.4}", hot.rmse_hot)),
        FieldRow::new("MAE hot test", format!("{:.4}", hot.mae_hot)),
        FieldRow::new("MAPE hot test", format!("{:.2}%", hot.mape_hot)),
    ]
}

/// Per-province table, hot-test metrics and top/bottom rankings
pub fn print_hot_report(report: &HotTestReport, top_n: usize) {
    print_heading("Hot test predictions");
    print_table(province_rows(&report.rows));

    if let Some(metrics) = &report.metrics {
        print_heading("Hot test metrics");
        print_table(hot_metric_rows(metrics));
    }

    if top_n > 0 {
        print_heading(&format!("Top {} provinces", top_n));
        print_table(province_rows(report.top(top_n)));
        print_heading(&format!("Bottom {} provinces", top_n));
        print_table(province_rows(report.bottom(top_n)));
    }
}

pub fn print_correlation(matrix: &CorrelationMatrix) {
    let mut builder = Builder::default();
    let mut header = vec![String::new()];
    header.extend(matrix.labels.iter().cloned());
    builder.push_record(header);

    for (label, values) in matrix.labels.iter().zip(&matrix.values) {
        let mut record = vec![label.clone()];
        record.extend(values.iter().map(|v| format!("{:.3}", v)));
        builder.push_record(record);
    }

    print_heading("Correlation");
    println!("{}", builder.build().with(Style::rounded()));
}
