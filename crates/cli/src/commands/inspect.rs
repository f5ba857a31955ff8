//! Artifact inspection command

use anyhow::{Context, Result};
use iku_lib::{artifact, ModelArtifact, FEATURE_COLUMNS};
use serde::Serialize;
use std::path::Path;
use tabled::Tabled;

use super::report::{print_evaluation, print_importances};
use crate::output::{print_heading, print_json, print_table, FieldRow, OutputFormat};

/// Row for the training bounds table
#[derive(Tabled)]
struct BoundsRow {
    #[tabled(rename = "Feature")]
    feature: &'static str,
    #[tabled(rename = "Min")]
    min: String,
    #[tabled(rename = "Max")]
    max: String,
    #[tabled(rename = "Linear coef")]
    coefficient: String,
}

#[derive(Serialize)]
struct InspectReport<'a> {
    path: &'a Path,
    n_trees: usize,
    avg_depth: f64,
    #[serde(flatten)]
    artifact: &'a ModelArtifact,
}

pub fn run(path: &Path, format: OutputFormat) -> Result<()> {
    let model = artifact::load(path)
        .with_context(|| format!("Failed to load artifact {}", path.display()))?;

    match format {
        OutputFormat::Json => print_json(&InspectReport {
            path,
            n_trees: model.ensemble.n_trees(),
            avg_depth: model.ensemble.avg_depth(),
            artifact: &model,
        })?,
        OutputFormat::Table => print_summary(path, &model),
    }

    Ok(())
}

fn print_summary(path: &Path, model: &ModelArtifact) {
    let params = model.ensemble.params();
    let mut rows = vec![
        FieldRow::new("Artifact", path.display().to_string()),
        FieldRow::new("Model version", model.model_version.clone()),
        FieldRow::new("Format version", model.format_version.to_string()),
        FieldRow::new("Trained at", model.trained_at.to_rfc3339()),
        FieldRow::new("Training rows", model.training_rows.to_string()),
        FieldRow::new("Trees", model.ensemble.n_trees().to_string()),
        FieldRow::new("Average depth", format!("{:.1}", model.ensemble.avg_depth())),
        FieldRow::new("Bootstrap", params.bootstrap.to_string()),
        FieldRow::new(
            "Linear fallback",
            if model.linear.is_some() { "yes" } else { "no" },
        ),
    ];
    if let Some(aug) = &model.augmentation {
        rows.push(FieldRow::new(
            "Augmentation",
            format!(
                "noise {}, moderate {}, extreme {}, {} rows, seed {}",
                aug.noise_level, aug.extrapol_frac, aug.extreme_frac, aug.n_samples, aug.random_seed
            ),
        ));
    }
    print_table(rows);

    let bounds: Vec<BoundsRow> = FEATURE_COLUMNS
        .iter()
        .enumerate()
        .map(|(i, column)| BoundsRow {
            feature: *column,
            min: model.bounds.min[i].to_string(),
            max: model.bounds.max[i].to_string(),
            coefficient: model
                .linear
                .as_ref()
                .map(|l| format!("{:.6}", l.coefficients[i]))
                .unwrap_or_else(|| "-".to_string()),
        })
        .collect();
    print_heading("Training range");
    print_table(bounds);
    if let Some(linear) = &model.linear {
        println!("Linear intercept: {:.6}", linear.intercept);
    }

    print_importances(&model.feature_importances);
    if let Some(evaluation) = &model.evaluation {
        print_evaluation(evaluation);
    }
}
