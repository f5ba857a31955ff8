//! IKU Agent - serves provincial air quality predictions over HTTP
//!
//! The model artifact is loaded once at startup. A missing or corrupt
//! artifact does not stop the agent: health endpoints stay up and every
//! prediction is rejected until it is restarted with a valid artifact.

use anyhow::Result;
use iku_agent::{api, config::AgentConfig};
use iku_lib::{
    health::{components, HealthRegistry},
    observability::{AgentMetrics, StructuredLogger},
    BlendMode, ServingContext,
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting iku-agent");

    let config = AgentConfig::load()?;
    let thresholds = config.thresholds()?;
    let requested_mode = config.blend_mode();
    info!(
        instance = %config.instance_name,
        artifact_path = %config.artifact_path.display(),
        threshold_minor = thresholds.minor,
        threshold_major = thresholds.major,
        mode = ?requested_mode,
        "Agent configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::ARTIFACT).await;
    health_registry.register(components::PREDICTOR).await;

    let metrics = AgentMetrics::new();
    let logger = StructuredLogger::new(&config.instance_name);

    let context = match ServingContext::load(&config.artifact_path, thresholds, requested_mode) {
        Ok(context) => {
            if let Some(artifact) = context.artifact() {
                logger.log_artifact_loaded(&config.artifact_path, artifact);
            }
            let mode = context
                .predictor()
                .map(|p| p.mode())
                .unwrap_or(requested_mode);
            let mode_label = match mode {
                BlendMode::Hybrid => "hybrid",
                BlendMode::EnsembleOnly => "ensemble_only",
            };
            metrics.set_model_info(context.model_version().unwrap_or_default(), mode_label);

            if requested_mode == BlendMode::Hybrid && mode == BlendMode::EnsembleOnly {
                health_registry
                    .set_degraded(
                        components::PREDICTOR,
                        "artifact has no linear model, serving ensemble only",
                    )
                    .await;
            }
            health_registry.set_ready().await;
            context
        }
        Err(e) => {
            let reason = e.to_string();
            logger.log_artifact_load_failed(&config.artifact_path, &reason);
            health_registry
                .set_unhealthy(components::ARTIFACT, reason.clone())
                .await;
            health_registry.set_not_ready(reason.clone()).await;
            metrics.set_model_unloaded();
            ServingContext::unavailable(reason)
        }
    };

    logger.log_startup(AGENT_VERSION, context.model_version());

    let app_state = Arc::new(
        api::AppState::new(
            health_registry.clone(),
            metrics.clone(),
            logger.clone(),
            Arc::new(context),
        )
        .with_max_batch_size(config.max_batch_size),
    );

    tokio::select! {
        result = api::serve(config.api_port, app_state) => {
            if let Err(e) = result {
                error!(error = %e, "API server failed");
                logger.log_shutdown("API server error");
                return Err(e);
            }
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            logger.log_shutdown("SIGINT received");
        }
    }

    info!("Shutting down");
    Ok(())
}
