//! Model artifact persistence
//!
//! An artifact bundles everything a serving process needs: the fitted
//! forest, the optional linear fallback, the training bounds and the
//! evaluation summary. On disk it is wrapped in an envelope carrying the
//! SHA-256 of the exact payload bytes, and it is written through a temp
//! file plus rename so readers never see a partial file.

use crate::augment::AugmentParams;
use crate::error::{IkuError, Result};
use crate::evaluation::EvaluationMetrics;
use crate::model::{LinearRegression, RandomForestRegressor};
use crate::models::{TrainingBounds, NUM_FEATURES};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::Path;
use tracing::{debug, info};

/// Artifact layout version understood by this build
pub const FORMAT_VERSION: u32 = 1;

/// A trained hybrid model and its metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub format_version: u32,
    pub model_version: String,
    pub trained_at: DateTime<Utc>,
    pub ensemble: RandomForestRegressor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linear: Option<LinearRegression>,
    pub bounds: TrainingBounds,
    pub feature_importances: [f64; NUM_FEATURES],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<EvaluationMetrics>,
    /// Augmentation used for the final forest, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub augmentation: Option<AugmentParams>,
    #[serde(default)]
    pub training_rows: usize,
}

impl ModelArtifact {
    /// Semantic checks beyond what deserialization enforces
    pub fn validate(&self) -> Result<()> {
        if self.format_version != FORMAT_VERSION {
            return Err(IkuError::ModelLoad(format!(
                "unsupported artifact format version {} (expected {})",
                self.format_version, FORMAT_VERSION
            )));
        }
        self.bounds
            .validate()
            .map_err(|e| IkuError::ModelLoad(format!("invalid training bounds: {}", e)))?;
        self.ensemble.validate()?;
        if let Some(linear) = &self.linear {
            linear.validate()?;
        }
        if self.feature_importances.iter().any(|v| !v.is_finite()) {
            return Err(IkuError::ModelLoad(
                "feature importances must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

/// On-disk wrapper: checksum plus the verbatim artifact payload
#[derive(Debug, Serialize, Deserialize)]
pub struct ArtifactEnvelope {
    pub checksum: String,
    pub artifact: Box<RawValue>,
}

impl ArtifactEnvelope {
    /// Serialize `artifact` and checksum the resulting bytes
    pub fn seal(artifact: &ModelArtifact) -> Result<Self> {
        let payload = serde_json::to_string(artifact)?;
        let checksum = compute_checksum(payload.as_bytes());
        let artifact = RawValue::from_string(payload)?;
        Ok(Self { checksum, artifact })
    }

    /// Verify the checksum, then decode and validate the payload
    pub fn open(&self) -> Result<ModelArtifact> {
        let computed = compute_checksum(self.artifact.get().as_bytes());
        if computed != self.checksum {
            return Err(IkuError::ModelLoad(format!(
                "checksum mismatch: expected {}, got {}",
                self.checksum, computed
            )));
        }
        let artifact: ModelArtifact = serde_json::from_str(self.artifact.get())
            .map_err(|e| IkuError::ModelLoad(format!("malformed artifact payload: {}", e)))?;
        artifact.validate()?;
        Ok(artifact)
    }
}

/// Write `artifact` to `path` atomically and return its checksum
pub fn save(artifact: &ModelArtifact, path: &Path) -> Result<String> {
    artifact.validate()?;
    let envelope = ArtifactEnvelope::seal(artifact)?;
    let bytes = serde_json::to_vec_pretty(&envelope)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let temp_path = path.with_extension("tmp");
    let mut file = File::create(&temp_path)?;
    file.write_all(&bytes)?;
    file.sync_all()?;
    fs::rename(&temp_path, path)?;

    info!(
        path = %path.display(),
        model_version = %artifact.model_version,
        checksum = %envelope.checksum,
        size = bytes.len(),
        "Model artifact saved"
    );
    Ok(envelope.checksum)
}

/// Read, verify and validate an artifact
pub fn load(path: &Path) -> Result<ModelArtifact> {
    let contents = fs::read_to_string(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => {
            IkuError::ModelLoad(format!("artifact {} does not exist", path.display()))
        }
        _ => IkuError::ModelLoad(format!("cannot read {}: {}", path.display(), e)),
    })?;

    let envelope: ArtifactEnvelope = serde_json::from_str(&contents).map_err(|e| {
        IkuError::ModelLoad(format!("{} is not an artifact envelope: {}", path.display(), e))
    })?;
    let artifact = envelope.open()?;

    debug!(
        path = %path.display(),
        model_version = %artifact.model_version,
        checksum = %envelope.checksum,
        "Model artifact verified"
    );
    Ok(artifact)
}

/// SHA-256 of `data`, hex encoded
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ForestParams;
    use tempfile::TempDir;

    fn sample_artifact() -> ModelArtifact {
        let x: Vec<[f64; NUM_FEATURES]> = (0..12)
            .map(|i| {
                let t = i as f64;
                [50.0 + t, 10.0 * t, 150_000.0 + 5000.0 * t, 60.0 + t]
            })
            .collect();
        let y: Vec<f64> = (0..12).map(|i| 70.0 + i as f64 * 1.5).collect();
        let ensemble = RandomForestRegressor::fit(
            &x,
            &y,
            ForestParams {
                n_trees: 4,
                ..ForestParams::default()
            },
        )
        .unwrap();

        ModelArtifact {
            format_version: FORMAT_VERSION,
            model_version: "test-1".to_string(),
            trained_at: Utc::now(),
            feature_importances: ensemble.feature_importances(),
            ensemble,
            linear: Some(LinearRegression {
                intercept: 60.0,
                coefficients: [0.2, -0.001, 0.0, 0.1],
            }),
            bounds: TrainingBounds::from_rows(&x).unwrap(),
            evaluation: None,
            augmentation: None,
            training_rows: x.len(),
        }
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("models").join("iku.json");
        let artifact = sample_artifact();

        let checksum = save(&artifact, &path).unwrap();
        assert_eq!(checksum.len(), 64);
        assert!(!path.with_extension("tmp").exists());

        let loaded = load(&path).unwrap();
        assert_eq!(loaded, artifact);
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = load(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, IkuError::ModelLoad(_)));
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("iku.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(load(&path), Err(IkuError::ModelLoad(_))));
    }

    #[test]
    fn test_tampered_payload_detected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("iku.json");
        save(&sample_artifact(), &path).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let tampered = contents.replace("\"intercept\":60.0", "\"intercept\":61.0");
        assert_ne!(contents, tampered);
        fs::write(&path, tampered).unwrap();

        let err = load(&path).unwrap_err();
        assert!(err.to_string().contains("checksum mismatch"));
    }

    #[test]
    fn test_unsupported_format_version() {
        let mut artifact = sample_artifact();
        artifact.format_version = FORMAT_VERSION + 1;
        let envelope = ArtifactEnvelope::seal(&artifact).unwrap();
        let err = envelope.open().unwrap_err();
        assert!(err.to_string().contains("format version"));
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let mut artifact = sample_artifact();
        artifact.bounds.min[0] = artifact.bounds.max[0] + 1.0;
        let envelope = ArtifactEnvelope::seal(&artifact).unwrap();
        assert!(matches!(envelope.open(), Err(IkuError::ModelLoad(_))));

        let dir = TempDir::new().unwrap();
        assert!(save(&artifact, &dir.path().join("bad.json")).is_err());
    }

    #[test]
    fn test_wrong_feature_count_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("iku.json");
        let mut artifact = serde_json::to_value(sample_artifact()).unwrap();
        artifact["feature_importances"] = serde_json::json!([0.5, 0.5, 0.0]);
        let payload = serde_json::to_string(&artifact).unwrap();
        let raw = format!(
            "{{\"checksum\":\"{}\",\"artifact\":{}}}",
            compute_checksum(payload.as_bytes()),
            payload
        );
        fs::write(&path, raw).unwrap();

        let err = load(&path).unwrap_err();
        assert!(err.to_string().contains("malformed artifact payload"));
    }

    #[test]
    fn test_checksum_known_value() {
        assert_eq!(
            compute_checksum(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
