//! Core data models for the IKU predictor

use crate::error::{IkuError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of input features expected by both regressors
pub const NUM_FEATURES: usize = 4;

/// Dataset column names, in feature order
pub const FEATURE_COLUMNS: [&str; NUM_FEATURES] = [
    "IKTL_(%)",
    "Karhutla_(ha)",
    "Kendaraan_Bermotor",
    "Rumah_Tangga_Listrik_PLN_(%)",
];

/// Human-readable feature labels, in feature order
pub const FEATURE_LABELS: [&str; NUM_FEATURES] = [
    "Indeks Kualitas Tutupan Lahan (%)",
    "Luas Kebakaran Hutan dan Lahan (ha)",
    "Jumlah Kendaraan Bermotor (unit)",
    "Persentase Rumah Tangga Listrik PLN (%)",
];

/// Feature vector for hybrid inference
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    #[serde(alias = "IKTL_(%)")]
    pub land_cover_quality: f64,
    #[serde(alias = "Karhutla_(ha)")]
    pub burned_area_ha: f64,
    #[serde(alias = "Kendaraan_Bermotor")]
    pub motor_vehicles: f64,
    #[serde(alias = "Rumah_Tangga_Listrik_PLN_(%)")]
    pub grid_electricity_pct: f64,
}

impl FeatureVector {
    pub fn new(
        land_cover_quality: f64,
        burned_area_ha: f64,
        motor_vehicles: f64,
        grid_electricity_pct: f64,
    ) -> Self {
        Self {
            land_cover_quality,
            burned_area_ha,
            motor_vehicles,
            grid_electricity_pct,
        }
    }

    pub fn from_array(values: [f64; NUM_FEATURES]) -> Self {
        Self::new(values[0], values[1], values[2], values[3])
    }

    pub fn to_array(&self) -> [f64; NUM_FEATURES] {
        [
            self.land_cover_quality,
            self.burned_area_ha,
            self.motor_vehicles,
            self.grid_electricity_pct,
        ]
    }

    /// Reject NaN and infinite coordinates
    pub fn validate(&self) -> Result<()> {
        for (value, column) in self.to_array().iter().zip(FEATURE_COLUMNS) {
            if !value.is_finite() {
                return Err(IkuError::InvalidInput(format!(
                    "feature {} must be a finite number, got {}",
                    column, value
                )));
            }
        }
        Ok(())
    }
}

/// Untrusted feature payload as received from API callers.
///
/// Every field is optional so that a missing coordinate can be reported
/// by name instead of surfacing as a generic deserialization failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawFeatureInput {
    #[serde(default, alias = "IKTL_(%)")]
    pub land_cover_quality: Option<f64>,
    #[serde(default, alias = "Karhutla_(ha)")]
    pub burned_area_ha: Option<f64>,
    #[serde(default, alias = "Kendaraan_Bermotor")]
    pub motor_vehicles: Option<f64>,
    #[serde(default, alias = "Rumah_Tangga_Listrik_PLN_(%)")]
    pub grid_electricity_pct: Option<f64>,
}

impl RawFeatureInput {
    /// Validate into a complete, finite feature vector
    pub fn into_features(self) -> Result<FeatureVector> {
        let fields = [
            self.land_cover_quality,
            self.burned_area_ha,
            self.motor_vehicles,
            self.grid_electricity_pct,
        ];
        let mut values = [0.0; NUM_FEATURES];
        for (i, (field, column)) in fields.iter().zip(FEATURE_COLUMNS).enumerate() {
            values[i] = field.ok_or_else(|| {
                IkuError::InvalidInput(format!("feature {} is missing", column))
            })?;
        }
        let features = FeatureVector::from_array(values);
        features.validate()?;
        Ok(features)
    }
}

impl From<FeatureVector> for RawFeatureInput {
    fn from(features: FeatureVector) -> Self {
        Self {
            land_cover_quality: Some(features.land_cover_quality),
            burned_area_ha: Some(features.burned_area_ha),
            motor_vehicles: Some(features.motor_vehicles),
            grid_electricity_pct: Some(features.grid_electricity_pct),
        }
    }
}

/// Per-feature minimum and maximum observed in the original training set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingBounds {
    pub min: [f64; NUM_FEATURES],
    pub max: [f64; NUM_FEATURES],
}

impl TrainingBounds {
    pub fn new(min: [f64; NUM_FEATURES], max: [f64; NUM_FEATURES]) -> Result<Self> {
        let bounds = Self { min, max };
        bounds.validate()?;
        Ok(bounds)
    }

    /// Compute bounds from a non-empty set of rows
    pub fn from_rows(rows: &[[f64; NUM_FEATURES]]) -> Result<Self> {
        if rows.is_empty() {
            return Err(IkuError::InvalidParameter(
                "cannot compute training bounds from an empty dataset".to_string(),
            ));
        }
        let mut min = [f64::INFINITY; NUM_FEATURES];
        let mut max = [f64::NEG_INFINITY; NUM_FEATURES];
        for row in rows {
            for i in 0..NUM_FEATURES {
                min[i] = min[i].min(row[i]);
                max[i] = max[i].max(row[i]);
            }
        }
        Self::new(min, max)
    }

    pub fn validate(&self) -> Result<()> {
        for i in 0..NUM_FEATURES {
            if !self.min[i].is_finite() || !self.max[i].is_finite() {
                return Err(IkuError::InvalidParameter(format!(
                    "bounds for {} must be finite",
                    FEATURE_COLUMNS[i]
                )));
            }
            if self.min[i] > self.max[i] {
                return Err(IkuError::InvalidParameter(format!(
                    "bounds for {} are inverted: min {} > max {}",
                    FEATURE_COLUMNS[i], self.min[i], self.max[i]
                )));
            }
        }
        Ok(())
    }

    /// Sum of per-feature range widths
    pub fn total_range(&self) -> f64 {
        (0..NUM_FEATURES).map(|i| self.max[i] - self.min[i]).sum()
    }

    pub fn contains(&self, row: &[f64; NUM_FEATURES]) -> bool {
        (0..NUM_FEATURES).all(|i| row[i] >= self.min[i] && row[i] <= self.max[i])
    }
}

/// Air quality category derived from a prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "Sangat Baik")]
    SangatBaik,
    #[serde(rename = "Baik")]
    Baik,
    #[serde(rename = "Sedang")]
    Sedang,
    #[serde(rename = "Kurang")]
    Kurang,
    #[serde(rename = "Sangat Kurang")]
    SangatKurang,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::SangatBaik => "Sangat Baik",
            Category::Baik => "Baik",
            Category::Sedang => "Sedang",
            Category::Kurang => "Kurang",
            Category::SangatKurang => "Sangat Kurang",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One province row from the training or hot-test dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvinceRecord {
    pub province: String,
    pub features: FeatureVector,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<f64>,
}
