//! Hot-test evaluation command

use anyhow::{Context, Result};
use iku_lib::{
    dataset::load_records,
    evaluation::{correlation_matrix, CorrelationMatrix, HotTestReport, HotTestRow},
};
use serde::Serialize;
use std::path::Path;

use super::predict::load_context;
use super::report::{print_correlation, print_hot_report};
use crate::output::{print_info, print_json, print_warning, OutputFormat};
use crate::EvaluateArgs;

#[derive(Serialize)]
struct EvaluationReport<'a> {
    model_version: &'a str,
    #[serde(flatten)]
    report: &'a HotTestReport,
    top: Vec<&'a HotTestRow>,
    bottom: Vec<&'a HotTestRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    correlation: Option<CorrelationMatrix>,
}

pub fn run(artifact: &Path, args: &EvaluateArgs, format: OutputFormat) -> Result<()> {
    let context = load_context(artifact, &args.blend)?;
    let predictor = context
        .predictor()
        .context("Artifact loaded without a predictor")?;

    let records = load_records(&args.hot)
        .with_context(|| format!("Failed to load hot-test data {}", args.hot.display()))?;
    let report = HotTestReport::build(predictor, &records).context("Evaluation failed")?;

    let rows: Vec<_> = records.iter().map(|r| r.features.to_array()).collect();
    let correlation = if rows.len() >= 2 {
        Some(correlation_matrix(&rows, &report.predictions())?)
    } else {
        None
    };

    let model_version = context.model_version().unwrap_or_default();
    match format {
        OutputFormat::Json => print_json(&EvaluationReport {
            model_version,
            report: &report,
            top: report.top(args.top),
            bottom: report.bottom(args.top),
            correlation,
        })?,
        OutputFormat::Table => {
            print_info(&format!(
                "Model {} on {} provinces",
                model_version,
                report.rows.len()
            ));
            print_hot_report(&report, args.top);
            if report.metrics.is_none() {
                print_warning("Dataset has no target column, metrics skipped");
            }
            match &correlation {
                Some(matrix) => print_correlation(matrix),
                None => print_warning("Correlation needs at least two provinces"),
            }
        }
    }

    Ok(())
}
