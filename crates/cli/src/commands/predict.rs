//! Local prediction command

use anyhow::{Context, Result};
use iku_lib::{
    predictor::OutOfRangeField, BlendMode, Category, PredictionOutcome, Regime, ServingContext,
    Thresholds,
};
use serde::Serialize;
use std::path::Path;

use crate::output::{
    color_category, color_regime, format_iku, print_json, print_table, print_warning, FieldRow,
    OutputFormat,
};
use crate::{BlendArgs, PredictArgs};

#[derive(Serialize)]
struct PredictionReport<'a> {
    model_version: &'a str,
    #[serde(flatten)]
    outcome: &'a PredictionOutcome,
}

/// Load `artifact` with the requested thresholds and blend mode
pub fn load_context(artifact: &Path, blend: &BlendArgs) -> Result<ServingContext> {
    let thresholds = Thresholds::new(blend.threshold_minor, blend.threshold_major)
        .context("Invalid --threshold-minor / --threshold-major")?;
    let mode = if blend.ensemble_only {
        BlendMode::EnsembleOnly
    } else {
        BlendMode::Hybrid
    };
    ServingContext::load(artifact, thresholds, mode)
        .with_context(|| format!("Failed to load artifact {}", artifact.display()))
}

pub fn run(artifact: &Path, args: &PredictArgs, format: OutputFormat) -> Result<()> {
    let context = load_context(artifact, &args.blend)?;
    let outcome = context
        .predict(&args.features.features())
        .context("Prediction failed")?;
    let model_version = context.model_version().unwrap_or_default();

    match format {
        OutputFormat::Json => print_json(&PredictionReport {
            model_version,
            outcome: &outcome,
        })?,
        OutputFormat::Table => print_outcome(
            outcome.value,
            outcome.category,
            outcome.extremity,
            outcome.regime,
            &outcome.out_of_range,
            model_version,
        ),
    }

    Ok(())
}

/// Key/value table shared with `remote predict`
pub fn print_outcome(
    value: f64,
    category: Category,
    extremity: f64,
    regime: Regime,
    out_of_range: &[OutOfRangeField],
    model_version: &str,
) {
    print_table(vec![
        FieldRow::new("Prediction", format_iku(value)),
        FieldRow::new("Category", color_category(category)),
        FieldRow::new("Extremity", format!("{:.4}", extremity)),
        FieldRow::new("Regime", color_regime(regime)),
        FieldRow::new("Model", model_version),
    ]);

    for field in out_of_range {
        print_warning(&format!(
            "{} = {} is outside the training range [{}, {}]",
            field.column, field.value, field.min, field.max
        ));
    }
}
