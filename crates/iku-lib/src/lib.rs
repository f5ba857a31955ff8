//! Provincial air quality index (IKU) prediction library
//!
//! This crate provides the core functionality for:
//! - Hybrid prediction: a bagged-tree ensemble blended with a linear
//!   fallback by how far an input lies outside the training range
//! - Deterministic training-set augmentation
//! - Model training, evaluation and artifact persistence
//! - Health checks and observability for the serving agent

pub mod artifact;
pub mod augment;
pub mod dataset;
pub mod error;
pub mod evaluation;
pub mod health;
pub mod model;
pub mod models;
pub mod observability;
pub mod predictor;
pub mod serving;
pub mod training;

pub use artifact::{ModelArtifact, FORMAT_VERSION};
pub use augment::{augment, AugmentParams, AugmentedDataset};
pub use error::{IkuError, Result};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{AgentMetrics, StructuredLogger};
pub use predictor::{
    categorize, BlendMode, HybridPredictor, PredictionOutcome, Regime, Regressor, Thresholds,
};
pub use serving::ServingContext;
pub use training::{Trainer, TrainingConfig, TrainingOutcome};
