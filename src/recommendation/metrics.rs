//! Fit statistics and performance timing
//!
//! Used to log what a fit produced and how long each stage took.

use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::similarity::SimilarityType;

/// Fits slower than this are logged at warn level
pub const SLOW_FIT_THRESHOLD_MS: u64 = 5_000;

/// What a successful `fit` produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitSummary {
    pub n_users: usize,
    pub n_items: usize,
    pub n_interactions: usize,
    pub affinity_nnz: usize,
    pub similarity_nnz: usize,
    pub similarity_type: SimilarityType,
    pub fit_duration_ms: u64,
}

impl FitSummary {
    /// Fraction of the item-item matrix that is stored
    pub fn similarity_density(&self) -> f64 {
        if self.n_items == 0 {
            return 0.0;
        }
        self.similarity_nnz as f64 / (self.n_items as f64 * self.n_items as f64)
    }
}

/// Performance timer for tracking operation duration
pub struct PerformanceTimer {
    start: Instant,
    label: String,
}

impl PerformanceTimer {
    pub fn new(label: &str) -> Self {
        Self {
            start: Instant::now(),
            label: label.to_string(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    pub fn log_if_slow(&self, threshold_ms: u64) {
        let elapsed = self.elapsed_ms();
        if elapsed > threshold_ms {
            tracing::warn!(
                "Slow operation: {} took {}ms (threshold: {}ms)",
                self.label,
                elapsed,
                threshold_ms
            );
        }
    }
}

impl Drop for PerformanceTimer {
    fn drop(&mut self) {
        tracing::debug!("{} completed in {}ms", self.label, self.elapsed_ms());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_similarity_density() {
        let summary = FitSummary {
            n_users: 3,
            n_items: 4,
            n_interactions: 6,
            affinity_nnz: 6,
            similarity_nnz: 8,
            similarity_type: SimilarityType::Jaccard,
            fit_duration_ms: 1,
        };
        assert_eq!(summary.similarity_density(), 0.5);
    }

    #[test]
    fn test_density_of_empty_fit() {
        let summary = FitSummary {
            n_users: 0,
            n_items: 0,
            n_interactions: 0,
            affinity_nnz: 0,
            similarity_nnz: 0,
            similarity_type: SimilarityType::Cosine,
            fit_duration_ms: 0,
        };
        assert_eq!(summary.similarity_density(), 0.0);
    }
}
