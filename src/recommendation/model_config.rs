//! SAR model configuration
//!
//! Column roles and scoring parameters fixed at model construction.

use serde::{Deserialize, Serialize};

use super::similarity::SimilarityType;
use crate::error::{Error, Result};

/// Default time-decay half-life: 30 days in seconds
pub const DEFAULT_TIME_DECAY_HALF_LIFE: f64 = 2_592_000.0;

/// Default rating threshold
pub const DEFAULT_THRESHOLD: f64 = 1.0;

/// Maps logical column roles to table column names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnNames {
    pub col_user: String,
    pub col_item: String,
    pub col_rating: String,
    pub col_timestamp: String,
    pub col_prediction: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            col_user: "userID".to_string(),
            col_item: "itemID".to_string(),
            col_rating: "rating".to_string(),
            col_timestamp: "timestamp".to_string(),
            col_prediction: "prediction".to_string(),
        }
    }
}

impl ColumnNames {
    fn validate(&self) -> Result<()> {
        let roles = [
            ("col_user", &self.col_user),
            ("col_item", &self.col_item),
            ("col_rating", &self.col_rating),
            ("col_timestamp", &self.col_timestamp),
            ("col_prediction", &self.col_prediction),
        ];
        for (idx, (role, name)) in roles.iter().enumerate() {
            if name.trim().is_empty() {
                return Err(Error::configuration(format!("{} must not be empty", role)));
            }
            if let Some((other, _)) = roles[idx + 1..].iter().find(|(_, n)| n == name) {
                return Err(Error::configuration(format!(
                    "{} and {} both map to column '{}'",
                    role, other, name
                )));
            }
        }
        Ok(())
    }
}

/// Immutable SAR model configuration
///
/// Build with [`SarConfig::builder`]; every field is validated once there and
/// never changes afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SarConfig {
    columns: ColumnNames,
    similarity_type: SimilarityType,
    time_decay_flag: bool,
    time_decay_half_life: f64,
    time_now: Option<f64>,
    threshold: f64,
    binary: bool,
}

impl SarConfig {
    pub fn builder(similarity_type: SimilarityType) -> SarConfigBuilder {
        SarConfigBuilder {
            config: SarConfig {
                columns: ColumnNames::default(),
                similarity_type,
                time_decay_flag: false,
                time_decay_half_life: DEFAULT_TIME_DECAY_HALF_LIFE,
                time_now: None,
                threshold: DEFAULT_THRESHOLD,
                binary: false,
            },
        }
    }

    pub fn columns(&self) -> &ColumnNames {
        &self.columns
    }

    pub fn col_user(&self) -> &str {
        &self.columns.col_user
    }

    pub fn col_item(&self) -> &str {
        &self.columns.col_item
    }

    pub fn col_rating(&self) -> &str {
        &self.columns.col_rating
    }

    pub fn col_timestamp(&self) -> &str {
        &self.columns.col_timestamp
    }

    pub fn col_prediction(&self) -> &str {
        &self.columns.col_prediction
    }

    pub fn similarity_type(&self) -> SimilarityType {
        self.similarity_type
    }

    pub fn time_decay_flag(&self) -> bool {
        self.time_decay_flag
    }

    /// Half-life in seconds
    pub fn time_decay_half_life(&self) -> f64 {
        self.time_decay_half_life
    }

    /// Reference timestamp for decay; `None` means the latest observed one
    pub fn time_now(&self) -> Option<f64> {
        self.time_now
    }

    /// Ratings below this value are left out of the affinity matrix
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Implicit mode: every retained interaction weighs 1
    pub fn binary(&self) -> bool {
        self.binary
    }
}

/// Builder for [`SarConfig`]
#[derive(Debug, Clone)]
pub struct SarConfigBuilder {
    config: SarConfig,
}

impl SarConfigBuilder {
    pub fn columns(mut self, columns: ColumnNames) -> Self {
        self.config.columns = columns;
        self
    }

    /// Enable time decay with the given half-life in seconds
    pub fn time_decay(mut self, half_life_secs: f64) -> Self {
        self.config.time_decay_flag = true;
        self.config.time_decay_half_life = half_life_secs;
        self
    }

    pub fn time_decay_flag(mut self, enabled: bool) -> Self {
        self.config.time_decay_flag = enabled;
        self
    }

    pub fn time_decay_half_life(mut self, half_life_secs: f64) -> Self {
        self.config.time_decay_half_life = half_life_secs;
        self
    }

    pub fn time_now(mut self, time_now: Option<f64>) -> Self {
        self.config.time_now = time_now;
        self
    }

    pub fn threshold(mut self, threshold: f64) -> Self {
        self.config.threshold = threshold;
        self
    }

    pub fn binary(mut self, binary: bool) -> Self {
        self.config.binary = binary;
        self
    }

    pub fn build(self) -> Result<SarConfig> {
        let config = self.config;
        config.columns.validate()?;

        if !(config.time_decay_half_life.is_finite() && config.time_decay_half_life > 0.0) {
            return Err(Error::configuration(format!(
                "time_decay_half_life must be positive, got {}",
                config.time_decay_half_life
            )));
        }
        if !config.threshold.is_finite() {
            return Err(Error::configuration("threshold must be finite"));
        }
        if let Some(now) = config.time_now {
            if !now.is_finite() {
                return Err(Error::configuration("time_now must be finite"));
            }
        }

        Ok(config)
    }
}
