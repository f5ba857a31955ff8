//! Commands that query a running prediction agent

use anyhow::Result;
use iku_lib::{
    health::{HealthResponse, ReadinessResponse},
    RawFeatureInput,
};
use tabled::Tabled;

use super::predict::print_outcome;
use super::report::print_evaluation;
use crate::client::{AgentStatus, ApiClient, RemoteModel, RemotePrediction};
use crate::output::{
    color_status, format_percent, print_heading, print_json, print_success, print_table,
    print_warning, FieldRow, OutputFormat,
};
use crate::FeatureArgs;

/// Row for the component health table
#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
}

/// Row for the remote feature table
#[derive(Tabled)]
struct FeatureRow {
    #[tabled(rename = "Feature")]
    column: String,
    #[tabled(rename = "Min")]
    min: String,
    #[tabled(rename = "Max")]
    max: String,
    #[tabled(rename = "Importance")]
    importance: String,
}

pub async fn predict(client: &ApiClient, features: &FeatureArgs, format: OutputFormat) -> Result<()> {
    let body = RawFeatureInput::from(features.features());
    let prediction: RemotePrediction = client.post("api/v1/predict", &body).await?;

    match format {
        OutputFormat::Json => print_json(&prediction)?,
        OutputFormat::Table => print_outcome(
            prediction.prediction,
            prediction.category,
            prediction.extremity,
            prediction.regime,
            &prediction.out_of_range,
            &prediction.model_version,
        ),
    }

    Ok(())
}

pub async fn status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health: HealthResponse = client.probe("healthz").await?;
    let readiness: ReadinessResponse = client.probe("readyz").await?;
    let status = AgentStatus { readiness, health };

    match format {
        OutputFormat::Json => print_json(&status)?,
        OutputFormat::Table => {
            if status.readiness.ready {
                print_success("Agent is ready");
            } else {
                print_warning(&format!(
                    "Agent is not ready: {}",
                    status.readiness.reason.as_deref().unwrap_or("unknown reason")
                ));
            }
            println!("Overall health: {}", color_status(status.health.status));

            let mut rows: Vec<ComponentRow> = status
                .health
                .components
                .iter()
                .map(|(name, component)| ComponentRow {
                    name: name.clone(),
                    status: color_status(component.status),
                    message: component.message.clone().unwrap_or_default(),
                })
                .collect();
            rows.sort_by(|a, b| a.name.cmp(&b.name));
            print_table(rows);
        }
    }

    Ok(())
}

pub async fn model(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let model: RemoteModel = client.get("api/v1/model").await?;

    match format {
        OutputFormat::Json => print_json(&model)?,
        OutputFormat::Table => {
            print_table(vec![
                FieldRow::new("Model version", model.model_version.clone()),
                FieldRow::new("Trained at", model.trained_at.clone()),
                FieldRow::new("Blend mode", format!("{:?}", model.blend_mode)),
                FieldRow::new(
                    "Thresholds",
                    format!("{} / {}", model.thresholds.minor, model.thresholds.major),
                ),
                FieldRow::new("Trees", model.n_trees.to_string()),
                FieldRow::new("Linear fallback", model.has_linear.to_string()),
                FieldRow::new("Training rows", model.training_rows.to_string()),
                FieldRow::new(
                    "Served (ensemble/blended/linear)",
                    format!(
                        "{} / {} / {}",
                        model.stats.ensemble, model.stats.blended, model.stats.linear
                    ),
                ),
            ]);

            let rows: Vec<FeatureRow> = model
                .features
                .iter()
                .map(|f| FeatureRow {
                    column: f.column.clone(),
                    min: f.min.to_string(),
                    max: f.max.to_string(),
                    importance: format_percent(f.importance),
                })
                .collect();
            print_heading("Features");
            print_table(rows);

            if let Some(evaluation) = &model.evaluation {
                print_evaluation(evaluation);
            }
        }
    }

    Ok(())
}
