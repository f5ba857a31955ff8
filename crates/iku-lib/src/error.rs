//! Error types for the IKU predictor library

use thiserror::Error;

/// Errors surfaced by prediction, augmentation, training and artifact handling
#[derive(Debug, Error)]
pub enum IkuError {
    /// A feature field is missing or not a finite number. Rejects one request.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The model artifact was never loaded into the serving context
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    /// The model artifact is absent or malformed
    #[error("failed to load model artifact: {0}")]
    ModelLoad(String),

    /// Every training range is zero-width and the row lies outside the bounds
    #[error("training range is degenerate: total width is zero and the row lies outside the bounds")]
    DegenerateRange,

    /// A caller-supplied parameter is out of its allowed domain
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Model fitting failed (singular system, empty data, ...)
    #[error("training failed: {0}")]
    Training(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl IkuError {
    /// Short machine-readable kind, used as a metrics label and in API error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            IkuError::InvalidInput(_) => "invalid_input",
            IkuError::ModelUnavailable(_) => "model_unavailable",
            IkuError::ModelLoad(_) => "model_load",
            IkuError::DegenerateRange => "degenerate_range",
            IkuError::InvalidParameter(_) => "invalid_parameter",
            IkuError::Training(_) => "training",
            IkuError::Io(_) => "io",
            IkuError::Csv(_) => "csv",
            IkuError::Json(_) => "json",
        }
    }
}

pub type Result<T> = std::result::Result<T, IkuError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds_are_stable() {
        assert_eq!(IkuError::DegenerateRange.kind(), "degenerate_range");
        assert_eq!(IkuError::InvalidInput("x".into()).kind(), "invalid_input");
        assert_eq!(
            IkuError::ModelUnavailable("not loaded".into()).kind(),
            "model_unavailable"
        );
    }

    #[test]
    fn test_error_display_includes_detail() {
        let err = IkuError::InvalidParameter("n_samples must be >= 1".into());
        assert_eq!(err.to_string(), "invalid parameter: n_samples must be >= 1");
    }
}
