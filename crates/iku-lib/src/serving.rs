//! Immutable serving state shared across request handlers

use crate::artifact::{self, ModelArtifact};
use crate::error::{IkuError, Result};
use crate::models::FeatureVector;
use crate::predictor::{
    BlendMode, HybridPredictor, InferenceStats, PredictionOutcome, Regressor, Thresholds,
};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

enum State {
    Ready {
        artifact: ModelArtifact,
        predictor: HybridPredictor,
    },
    Unavailable {
        reason: String,
    },
}

/// A loaded model, or the reason no model could be loaded.
///
/// Built once at startup and shared through an `Arc`; nothing on the
/// prediction path takes a lock.
pub struct ServingContext {
    state: State,
}

impl ServingContext {
    /// Load and verify the artifact at `path`
    pub fn load(path: &Path, thresholds: Thresholds, mode: BlendMode) -> Result<Self> {
        let artifact = artifact::load(path)?;
        Self::from_artifact(artifact, thresholds, mode)
    }

    pub fn from_artifact(
        artifact: ModelArtifact,
        thresholds: Thresholds,
        mode: BlendMode,
    ) -> Result<Self> {
        let predictor = HybridPredictor::new(
            Arc::new(artifact.ensemble.clone()) as Arc<dyn Regressor>,
            artifact
                .linear
                .clone()
                .map(|model| Arc::new(model) as Arc<dyn Regressor>),
            artifact.bounds.clone(),
            thresholds,
            mode,
        )?;

        info!(
            model_version = %artifact.model_version,
            n_trees = artifact.ensemble.n_trees(),
            has_linear = artifact.linear.is_some(),
            mode = ?predictor.mode(),
            "Serving context ready"
        );

        Ok(Self {
            state: State::Ready {
                artifact,
                predictor,
            },
        })
    }

    /// A context that rejects every prediction with `ModelUnavailable`
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            state: State::Unavailable {
                reason: reason.into(),
            },
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, State::Ready { .. })
    }

    pub fn unavailable_reason(&self) -> Option<&str> {
        match &self.state {
            State::Ready { .. } => None,
            State::Unavailable { reason } => Some(reason),
        }
    }

    pub fn artifact(&self) -> Option<&ModelArtifact> {
        match &self.state {
            State::Ready { artifact, .. } => Some(artifact),
            State::Unavailable { .. } => None,
        }
    }

    pub fn predictor(&self) -> Option<&HybridPredictor> {
        match &self.state {
            State::Ready { predictor, .. } => Some(predictor),
            State::Unavailable { .. } => None,
        }
    }

    pub fn model_version(&self) -> Option<&str> {
        self.artifact().map(|a| a.model_version.as_str())
    }

    pub fn predict(&self, features: &FeatureVector) -> Result<PredictionOutcome> {
        match &self.state {
            State::Ready { predictor, .. } => predictor.predict_detailed(features),
            State::Unavailable { reason } => Err(IkuError::ModelUnavailable(reason.clone())),
        }
    }

    pub fn stats(&self) -> InferenceStats {
        self.predictor()
            .map(HybridPredictor::stats)
            .unwrap_or_default()
    }
}
