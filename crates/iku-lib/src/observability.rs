//! Observability infrastructure for the prediction agent
//!
//! Provides:
//! - Prometheus metrics (prediction latency, regime mix, extremity, errors, model info)
//! - Structured JSON logging with tracing

use crate::artifact::ModelArtifact;
use crate::predictor::{PredictionOutcome, Regime};
use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter_vec, register_int_gauge,
    GaugeVec, Histogram, IntCounterVec, IntGauge,
};
use std::path::Path;
use std::sync::OnceLock;
use tracing::{info, warn};

/// Default histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1,
];

/// Extremity buckets, dense around the default 0.1 / 0.3 thresholds
const EXTREMITY_BUCKETS: &[f64] = &[0.0, 0.01, 0.05, 0.1, 0.2, 0.3, 0.5, 1.0, 2.0, 10.0, 100.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<AgentMetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct AgentMetricsInner {
    prediction_latency_seconds: Histogram,
    predictions_total: IntCounterVec,
    prediction_errors_total: IntCounterVec,
    prediction_extremity: Histogram,
    model_info: GaugeVec,
    model_loaded: IntGauge,
}

impl AgentMetricsInner {
    fn new() -> Self {
        Self {
            prediction_latency_seconds: register_histogram!(
                "iku_prediction_latency_seconds",
                "Time spent computing a single hybrid prediction",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register prediction_latency_seconds"),

            predictions_total: register_int_counter_vec!(
                "iku_predictions_total",
                "Predictions served, by model regime",
                &["regime"]
            )
            .expect("Failed to register predictions_total"),

            prediction_errors_total: register_int_counter_vec!(
                "iku_prediction_errors_total",
                "Rejected prediction requests, by error kind",
                &["kind"]
            )
            .expect("Failed to register prediction_errors_total"),

            prediction_extremity: register_histogram!(
                "iku_prediction_extremity",
                "Distance of request inputs outside the training range",
                EXTREMITY_BUCKETS.to_vec()
            )
            .expect("Failed to register prediction_extremity"),

            model_info: register_gauge_vec!(
                "iku_model_info",
                "Information about the currently loaded model artifact",
                &["version", "mode"]
            )
            .expect("Failed to register model_info"),

            model_loaded: register_int_gauge!(
                "iku_model_loaded",
                "1 when a model artifact is loaded, 0 otherwise"
            )
            .expect("Failed to register model_loaded"),
        }
    }
}

/// Agent metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct AgentMetrics {
    _private: (),
}

impl Default for AgentMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(AgentMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &AgentMetricsInner {
        GLOBAL_METRICS.get_or_init(AgentMetricsInner::new)
    }

    /// Record a served prediction
    pub fn observe_prediction(&self, regime: Regime, extremity: f64, duration_secs: f64) {
        let inner = self.inner();
        inner.prediction_latency_seconds.observe(duration_secs);
        inner.prediction_extremity.observe(extremity);
        inner
            .predictions_total
            .with_label_values(&[regime.as_str()])
            .inc();
    }

    /// Count a rejected prediction by error kind
    pub fn inc_prediction_errors(&self, kind: &str) {
        self.inner()
            .prediction_errors_total
            .with_label_values(&[kind])
            .inc();
    }

    /// Publish the loaded model version and blend mode
    pub fn set_model_info(&self, version: &str, mode: &str) {
        let inner = self.inner();
        inner.model_info.reset();
        inner.model_info.with_label_values(&[version, mode]).set(1.0);
        inner.model_loaded.set(1);
    }

    pub fn set_model_unloaded(&self) {
        let inner = self.inner();
        inner.model_info.reset();
        inner.model_loaded.set(0);
    }

    /// Predictions served so far in one regime
    pub fn predictions_in_regime(&self, regime: Regime) -> u64 {
        self.inner()
            .predictions_total
            .with_label_values(&[regime.as_str()])
            .get()
    }
}

/// Structured logger for agent and training events
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    /// Log a prediction generation event
    pub fn log_prediction(
        &self,
        outcome: &PredictionOutcome,
        province: Option<&str>,
        model_version: &str,
    ) {
        info!(
            event = "prediction_generated",
            instance = %self.instance,
            province = province.unwrap_or("-"),
            prediction = outcome.value,
            category = %outcome.category,
            extremity = outcome.extremity,
            regime = %outcome.regime,
            out_of_range_fields = outcome.out_of_range.len(),
            model_version = %model_version,
            "Generated IKU prediction"
        );
    }

    /// Log a successful artifact load
    pub fn log_artifact_loaded(&self, path: &Path, artifact: &ModelArtifact) {
        info!(
            event = "artifact_loaded",
            instance = %self.instance,
            path = %path.display(),
            model_version = %artifact.model_version,
            trained_at = %artifact.trained_at,
            n_trees = artifact.ensemble.n_trees(),
            has_linear = artifact.linear.is_some(),
            "Model artifact loaded"
        );
    }

    /// Log an artifact that could not be loaded; the agent keeps running
    pub fn log_artifact_load_failed(&self, path: &Path, error: &str) {
        warn!(
            event = "artifact_load_failed",
            instance = %self.instance,
            path = %path.display(),
            error = %error,
            "Model artifact unavailable, predictions will be rejected"
        );
    }

    /// Log the end of a training run
    pub fn log_training_completed(&self, artifact: &ModelArtifact, augmented_rows: usize) {
        let evaluation = artifact.evaluation.as_ref();
        info!(
            event = "training_completed",
            instance = %self.instance,
            model_version = %artifact.model_version,
            training_rows = artifact.training_rows,
            augmented_rows = augmented_rows,
            n_trees = artifact.ensemble.n_trees(),
            r2_train = ?evaluation.map(|e| e.r2_train),
            r2_test = ?evaluation.map(|e| e.r2_test),
            rmse_test = ?evaluation.map(|e| e.rmse_test),
            r2_hot = ?evaluation.and_then(|e| e.hot).map(|h| h.r2_hot),
            "Hybrid model trained"
        );
    }

    /// Log agent startup
    pub fn log_startup(&self, version: &str, model_version: Option<&str>) {
        info!(
            event = "agent_started",
            instance = %self.instance,
            agent_version = %version,
            model_version = model_version.unwrap_or("none"),
            "IKU prediction agent started"
        );
    }

    /// Log agent shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            instance = %self.instance,
            reason = %reason,
            "IKU prediction agent shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;

    fn outcome(regime: Regime) -> PredictionOutcome {
        PredictionOutcome {
            value: 72.5,
            extremity: 0.15,
            regime,
            category: Category::Baik,
            out_of_range: Vec::new(),
        }
    }

    #[test]
    fn test_agent_metrics_observations() {
        let metrics = AgentMetrics::new();
        let before = metrics.predictions_in_regime(Regime::Blended);

        metrics.observe_prediction(Regime::Blended, 0.15, 0.0002);
        metrics.inc_prediction_errors("invalid_input");
        metrics.set_model_info("v1", "hybrid");

        assert!(metrics.predictions_in_regime(Regime::Blended) > before);
    }

    #[test]
    fn test_metrics_handles_share_registry() {
        let a = AgentMetrics::new();
        let b = a.clone();
        let before = a.predictions_in_regime(Regime::Linear);
        b.observe_prediction(Regime::Linear, 0.4, 0.0001);
        assert!(a.predictions_in_regime(Regime::Linear) > before);
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("test-instance");
        assert_eq!(logger.instance, "test-instance");
        logger.log_prediction(&outcome(Regime::Ensemble), Some("Aceh"), "v1");
    }
}
