//! Dataset augmentation command

use anyhow::{Context, Result};
use iku_lib::{
    augment,
    dataset::{labeled_rows, load_records, write_augmented_csv},
    model::{ForestParams, RandomForestRegressor},
    AugmentParams, Regressor,
};
use serde::Serialize;
use std::path::Path;

use crate::output::{print_json, print_success, print_table, FieldRow, OutputFormat};
use crate::AugmentArgs;

#[derive(Serialize)]
struct AugmentSummary<'a> {
    source_rows: usize,
    augmented_rows: usize,
    relabeled: bool,
    output: &'a Path,
    params: &'a AugmentParams,
}

/// Augment `--data` and write the synthetic rows to `--output`
pub fn run(args: &AugmentArgs, format: OutputFormat) -> Result<()> {
    let records = load_records(&args.data)
        .with_context(|| format!("Failed to load dataset {}", args.data.display()))?;
    let (x, y) = labeled_rows(&records).context("Dataset has rows without a target")?;
    let params = args.augmentation.params();

    let relabel_model = if args.relabel {
        let forest = RandomForestRegressor::fit(
            &x,
            &y,
            ForestParams {
                n_trees: args.trees,
                seed: params.random_seed,
                ..ForestParams::default()
            },
        )
        .context("Failed to fit relabeling forest")?;
        Some(forest)
    } else {
        None
    };

    let augmented = augment(
        &x,
        &y,
        relabel_model.as_ref().map(|m| m as &dyn Regressor),
        &params,
    )
    .context("Augmentation failed")?;

    write_augmented_csv(&args.output, &augmented)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    match format {
        OutputFormat::Json => print_json(&AugmentSummary {
            source_rows: x.len(),
            augmented_rows: augmented.len(),
            relabeled: args.relabel,
            output: &args.output,
            params: &params,
        })?,
        OutputFormat::Table => {
            print_success(&format!(
                "{} augmented rows written to {}",
                augmented.len(),
                args.output.display()
            ));
            print_table(vec![
                FieldRow::new("Source rows", x.len().to_string()),
                FieldRow::new("Noise level", params.noise_level.to_string()),
                FieldRow::new("Moderate extrapolation", params.extrapol_frac.to_string()),
                FieldRow::new("Extreme extrapolation", params.extreme_frac.to_string()),
                FieldRow::new("Seed", params.random_seed.to_string()),
                FieldRow::new(
                    "Targets",
                    if args.relabel { "forest" } else { "copied" },
                ),
            ]);
        }
    }

    Ok(())
}
