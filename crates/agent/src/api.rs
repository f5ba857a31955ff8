//! HTTP API for predictions, health checks and Prometheus metrics

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use iku_lib::{
    evaluation::{EvaluationMetrics, HotMetrics, HotTestReport, HotTestRow},
    health::{ComponentStatus, HealthRegistry},
    models::{Category, ProvinceRecord, RawFeatureInput, FEATURE_COLUMNS, FEATURE_LABELS},
    observability::{AgentMetrics, StructuredLogger},
    predictor::{BlendMode, InferenceStats, OutOfRangeField, Regime, Thresholds},
    IkuError, ServingContext,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: AgentMetrics,
    pub logger: StructuredLogger,
    pub context: Arc<ServingContext>,
    pub max_batch_size: usize,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        metrics: AgentMetrics,
        logger: StructuredLogger,
        context: Arc<ServingContext>,
    ) -> Self {
        Self {
            health_registry,
            metrics,
            logger,
            context,
            max_batch_size: 1000,
        }
    }

    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }
}

/// Error body returned by the prediction endpoints
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Library error mapped onto an HTTP status
pub struct ApiError(IkuError);

impl From<IkuError> for ApiError {
    fn from(err: IkuError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self.0 {
            IkuError::InvalidInput(_) | IkuError::InvalidParameter(_) => StatusCode::BAD_REQUEST,
            IkuError::DegenerateRange => StatusCode::UNPROCESSABLE_ENTITY,
            IkuError::ModelUnavailable(_) | IkuError::ModelLoad(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.0.kind().to_string(),
            message: self.0.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

fn rejection_to_error(rejection: JsonRejection) -> IkuError {
    IkuError::InvalidInput(rejection.body_text())
}

/// Single prediction response
#[derive(Debug, Serialize)]
pub struct PredictionResponse {
    pub prediction: f64,
    pub category: Category,
    pub extremity: f64,
    pub regime: Regime,
    pub out_of_range: Vec<OutOfRangeField>,
    pub model_version: String,
}

/// One record of a batch request
#[derive(Debug, Deserialize)]
pub struct BatchRecord {
    pub province: String,
    pub features: RawFeatureInput,
    #[serde(default)]
    pub actual: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub records: Vec<BatchRecord>,
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub model_version: String,
    pub results: Vec<HotTestRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<HotMetrics>,
}

#[derive(Debug, Serialize)]
pub struct FeatureBounds {
    pub column: String,
    pub label: String,
    pub min: f64,
    pub max: f64,
    pub importance: f64,
}

/// Loaded model description
#[derive(Debug, Serialize)]
pub struct ModelInfoResponse {
    pub model_version: String,
    pub format_version: u32,
    pub trained_at: DateTime<Utc>,
    pub blend_mode: BlendMode,
    pub thresholds: Thresholds,
    pub n_trees: usize,
    pub has_linear: bool,
    pub training_rows: usize,
    pub features: Vec<FeatureBounds>,
    pub evaluation: Option<EvaluationMetrics>,
    pub stats: InferenceStats,
}

/// Health check response - returns 200 if healthy or degraded, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            Vec::new(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

async fn predict(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RawFeatureInput>, JsonRejection>,
) -> Result<Json<PredictionResponse>, ApiError> {
    let result = payload
        .map_err(rejection_to_error)
        .and_then(|Json(input)| input.into_features())
        .and_then(|features| {
            let started = Instant::now();
            let outcome = state.context.predict(&features)?;
            Ok((outcome, started.elapsed().as_secs_f64()))
        });

    let (outcome, elapsed) = match result {
        Ok(ok) => ok,
        Err(err) => {
            state.metrics.inc_prediction_errors(err.kind());
            return Err(err.into());
        }
    };

    let model_version = state.context.model_version().unwrap_or_default().to_string();
    state
        .metrics
        .observe_prediction(outcome.regime, outcome.extremity, elapsed);
    state.logger.log_prediction(&outcome, None, &model_version);

    Ok(Json(PredictionResponse {
        prediction: outcome.value,
        category: outcome.category,
        extremity: outcome.extremity,
        regime: outcome.regime,
        out_of_range: outcome.out_of_range,
        model_version,
    }))
}

async fn predict_batch(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<BatchRequest>, JsonRejection>,
) -> Result<Json<BatchResponse>, ApiError> {
    let result = payload
        .map_err(rejection_to_error)
        .and_then(|Json(request)| run_batch(&state, request));

    match result {
        Ok(response) => Ok(Json(response)),
        Err(err) => {
            state.metrics.inc_prediction_errors(err.kind());
            Err(err.into())
        }
    }
}

fn run_batch(state: &AppState, request: BatchRequest) -> iku_lib::Result<BatchResponse> {
    if request.records.is_empty() {
        return Err(IkuError::InvalidInput("batch contains no records".to_string()));
    }
    if request.records.len() > state.max_batch_size {
        return Err(IkuError::InvalidInput(format!(
            "batch of {} records exceeds the limit of {}",
            request.records.len(),
            state.max_batch_size
        )));
    }

    let predictor = state.context.predictor().ok_or_else(|| {
        IkuError::ModelUnavailable(
            state
                .context
                .unavailable_reason()
                .unwrap_or("model not loaded")
                .to_string(),
        )
    })?;

    let records = request
        .records
        .into_iter()
        .enumerate()
        .map(|(i, record)| {
            let features = record.features.into_features().map_err(|e| {
                IkuError::InvalidInput(format!("record {} ({}): {}", i, record.province, e))
            })?;
            Ok(ProvinceRecord {
                province: record.province,
                features,
                actual: record.actual,
            })
        })
        .collect::<iku_lib::Result<Vec<_>>>()?;

    let started = Instant::now();
    let report = HotTestReport::build(predictor, &records)?;
    let per_row = started.elapsed().as_secs_f64() / records.len() as f64;
    for row in &report.rows {
        state.metrics.observe_prediction(row.regime, row.extremity, per_row);
    }

    let model_version = state.context.model_version().unwrap_or_default().to_string();
    info!(
        records = report.rows.len(),
        with_actuals = report.metrics.is_some(),
        model_version = %model_version,
        "Batch prediction completed"
    );

    Ok(BatchResponse {
        model_version,
        results: report.rows,
        metrics: report.metrics,
    })
}

async fn model_info(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ModelInfoResponse>, ApiError> {
    let (artifact, predictor) = match (state.context.artifact(), state.context.predictor()) {
        (Some(artifact), Some(predictor)) => (artifact, predictor),
        _ => {
            let reason = state
                .context
                .unavailable_reason()
                .unwrap_or("model not loaded")
                .to_string();
            return Err(IkuError::ModelUnavailable(reason).into());
        }
    };

    let features = (0..FEATURE_COLUMNS.len())
        .map(|i| FeatureBounds {
            column: FEATURE_COLUMNS[i].to_string(),
            label: FEATURE_LABELS[i].to_string(),
            min: artifact.bounds.min[i],
            max: artifact.bounds.max[i],
            importance: artifact.feature_importances[i],
        })
        .collect();

    Ok(Json(ModelInfoResponse {
        model_version: artifact.model_version.clone(),
        format_version: artifact.format_version,
        trained_at: artifact.trained_at,
        blend_mode: predictor.mode(),
        thresholds: predictor.thresholds(),
        n_trees: artifact.ensemble.n_trees(),
        has_linear: artifact.linear.is_some(),
        training_rows: artifact.training_rows,
        features,
        evaluation: artifact.evaluation.clone(),
        stats: predictor.stats(),
    }))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/predict", post(predict))
        .route("/api/v1/predict/batch", post(predict_batch))
        .route("/api/v1/model", get(model_info))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
