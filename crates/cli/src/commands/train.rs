//! Offline training command

use anyhow::{Context, Result};
use iku_lib::{
    artifact,
    dataset::load_records,
    evaluation::{rank_importances, EvaluationMetrics, HotTestReport},
    model::ForestParams,
    observability::StructuredLogger,
    Thresholds, Trainer, TrainingConfig,
};
use serde::Serialize;
use std::path::Path;

use super::report::{print_evaluation, print_hot_report, print_importances};
use crate::output::{print_info, print_json, print_success, OutputFormat};
use crate::TrainArgs;

/// Provinces listed in the post-training top/bottom rankings
const RANKING_SIZE: usize = 5;

#[derive(Serialize)]
struct TrainSummary<'a> {
    model_version: &'a str,
    artifact: &'a Path,
    checksum: String,
    train_rows: usize,
    test_rows: usize,
    augmented_rows: usize,
    feature_importances: Vec<(&'static str, f64)>,
    evaluation: Option<&'a EvaluationMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hot_test: Option<&'a HotTestReport>,
}

fn training_config(args: &TrainArgs) -> TrainingConfig {
    TrainingConfig {
        forest: ForestParams {
            n_trees: args.trees,
            max_depth: args.max_depth,
            seed: args.seed,
            ..ForestParams::default()
        },
        augmentation: (!args.no_augment).then(|| args.augmentation.params()),
        test_fraction: args.test_fraction,
        split_seed: args.seed,
        thresholds: Thresholds::default(),
        fit_linear: !args.no_linear,
        model_version: args.model_version.clone(),
    }
}

/// Train on `--data`, optionally evaluate on `--hot`, and write the artifact
pub fn run(args: &TrainArgs, format: OutputFormat) -> Result<()> {
    let records = load_records(&args.data)
        .with_context(|| format!("Failed to load training data {}", args.data.display()))?;
    let hot_records = match &args.hot {
        Some(path) => Some(
            load_records(path)
                .with_context(|| format!("Failed to load hot-test data {}", path.display()))?,
        ),
        None => None,
    };

    let config = training_config(args);
    let outcome =
        Trainer::train(&records, hot_records.as_deref(), &config).context("Training failed")?;

    let checksum = artifact::save(&outcome.artifact, &args.output)
        .with_context(|| format!("Failed to write artifact {}", args.output.display()))?;
    StructuredLogger::new("iku-cli")
        .log_training_completed(&outcome.artifact, outcome.augmented_rows);

    let model = &outcome.artifact;
    match format {
        OutputFormat::Json => print_json(&TrainSummary {
            model_version: &model.model_version,
            artifact: &args.output,
            checksum,
            train_rows: outcome.train_rows,
            test_rows: outcome.test_rows,
            augmented_rows: outcome.augmented_rows,
            feature_importances: rank_importances(&model.feature_importances),
            evaluation: model.evaluation.as_ref(),
            hot_test: outcome.hot_report.as_ref(),
        })?,
        OutputFormat::Table => {
            print_success(&format!(
                "Model {} written to {}",
                model.model_version,
                args.output.display()
            ));
            print_info(&format!(
                "{} train rows, {} test rows, {} augmented rows, checksum {}",
                outcome.train_rows, outcome.test_rows, outcome.augmented_rows, checksum
            ));
            if let Some(evaluation) = &model.evaluation {
                print_evaluation(evaluation);
            }
            print_importances(&model.feature_importances);
            if let Some(report) = &outcome.hot_report {
                print_hot_report(report, RANKING_SIZE);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AugmentOpts;
    use std::path::PathBuf;

    fn args() -> TrainArgs {
        TrainArgs {
            data: PathBuf::from("train.csv"),
            hot: None,
            output: PathBuf::from("model.json"),
            trees: 25,
            max_depth: Some(8),
            seed: 7,
            test_fraction: 0.25,
            no_augment: false,
            no_linear: false,
            model_version: Some("cli".to_string()),
            augmentation: AugmentOpts {
                noise_level: 0.05,
                extrapol_frac: 0.15,
                extreme_frac: 0.3,
                n_samples: 200,
                augment_seed: 3,
            },
        }
    }

    #[test]
    fn test_training_config_from_args() {
        let config = training_config(&args());
        assert_eq!(config.forest.n_trees, 25);
        assert_eq!(config.forest.max_depth, Some(8));
        assert_eq!(config.forest.seed, 7);
        assert_eq!(config.split_seed, 7);
        assert_eq!(config.augmentation.as_ref().map(|p| p.n_samples), Some(200));
        assert_eq!(config.augmentation.as_ref().map(|p| p.random_seed), Some(3));
        assert!(config.fit_linear);
        config.validate().unwrap();
    }

    #[test]
    fn test_no_augment_disables_augmentation() {
        let mut args = args();
        args.no_augment = true;
        args.no_linear = true;
        let config = training_config(&args);
        assert!(config.augmentation.is_none());
        assert!(!config.fit_linear);
    }
}
