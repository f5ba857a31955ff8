//! Agent configuration

use anyhow::{Context, Result};
use iku_lib::predictor::{BlendMode, Thresholds};
use serde::Deserialize;
use std::path::PathBuf;

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Name reported in structured logs
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    /// API server port for predictions, health and metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Model artifact loaded once at startup
    #[serde(default = "default_artifact_path")]
    pub artifact_path: PathBuf,

    /// Extremity below which only the ensemble is used
    #[serde(default = "default_threshold_minor")]
    pub threshold_minor: f64,

    /// Extremity from which only the linear model is used
    #[serde(default = "default_threshold_major")]
    pub threshold_major: f64,

    /// Never consult the linear fallback
    #[serde(default)]
    pub ensemble_only: bool,

    /// Maximum records accepted by the batch endpoint
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "iku-agent".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_artifact_path() -> PathBuf {
    PathBuf::from("/var/lib/iku/model.json")
}

fn default_threshold_minor() -> f64 {
    0.1
}

fn default_threshold_major() -> f64 {
    0.3
}

fn default_max_batch_size() -> usize {
    1000
}

impl AgentConfig {
    /// Load configuration from `IKU_*` environment variables
    pub fn load() -> Result<Self> {
        Self::from_source(
            config::Environment::with_prefix("IKU")
                .prefix_separator("_")
                .try_parsing(true),
        )
    }

    pub fn from_source<S>(source: S) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let config = config::Config::builder()
            .add_source(source)
            .build()
            .context("Failed to read agent configuration")?;

        config
            .try_deserialize()
            .context("Invalid agent configuration")
    }

    /// Validated extremity thresholds
    pub fn thresholds(&self) -> Result<Thresholds> {
        Thresholds::new(self.threshold_minor, self.threshold_major)
            .context("Invalid IKU_THRESHOLD_MINOR / IKU_THRESHOLD_MAJOR")
    }

    pub fn blend_mode(&self) -> BlendMode {
        if self.ensemble_only {
            BlendMode::EnsembleOnly
        } else {
            BlendMode::Hybrid
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{File, FileFormat};

    #[test]
    fn test_defaults_apply() {
        let config = AgentConfig::from_source(File::from_str("{}", FileFormat::Json)).unwrap();
        assert_eq!(config.api_port, 8080);
        assert_eq!(config.threshold_minor, 0.1);
        assert_eq!(config.threshold_major, 0.3);
        assert_eq!(config.blend_mode(), BlendMode::Hybrid);
        assert!(config.thresholds().is_ok());
    }

    #[test]
    fn test_overrides() {
        let json = r#"{
            "api_port": 9000,
            "artifact_path": "/tmp/iku.json",
            "threshold_minor": 0.05,
            "threshold_major": 0.5,
            "ensemble_only": true
        }"#;
        let config = AgentConfig::from_source(File::from_str(json, FileFormat::Json)).unwrap();
        assert_eq!(config.api_port, 9000);
        assert_eq!(config.artifact_path, PathBuf::from("/tmp/iku.json"));
        assert_eq!(config.blend_mode(), BlendMode::EnsembleOnly);

        let thresholds = config.thresholds().unwrap();
        assert_eq!(thresholds.minor, 0.05);
        assert_eq!(thresholds.major, 0.5);
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let json = r#"{ "threshold_minor": 0.4, "threshold_major": 0.2 }"#;
        let config = AgentConfig::from_source(File::from_str(json, FileFormat::Json)).unwrap();
        assert!(config.thresholds().is_err());
    }
}
