//! Similarity Engine
//!
//! Derives an item-item similarity matrix from the affinity matrix. With
//! `co[i,j]` the number of users holding nonzero affinity for both items:
//!
//! | metric | score |
//! |---|---|
//! | cooccurrence | `co[i,j]` |
//! | jaccard | `co[i,j] / (co[i,i] + co[j,j] - co[i,j])` |
//! | lift | `co[i,j] / (co[i,i] * co[j,j])` |
//! | cosine | `co[i,j] / sqrt(co[i,i] * co[j,j])` |
//!
//! A zero denominator yields 0.
//!
//! ## Complexity
//!
//! Co-occurrence counting visits every pair of items sharing a user, so it
//! costs O(Σ_u deg(u)²) time, and the result holds O(nnz(co)) entries: up to
//! O(items²) when users overlap densely. Rows are computed independently on
//! the rayon pool, so the output does not depend on scheduling.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::affinity::AffinityMatrix;
use crate::error::{Error, Result};

/// Item-item similarity metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityType {
    Cooccurrence,
    Jaccard,
    Lift,
    Cosine,
}

impl fmt::Display for SimilarityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimilarityType::Cooccurrence => write!(f, "cooccurrence"),
            SimilarityType::Jaccard => write!(f, "jaccard"),
            SimilarityType::Lift => write!(f, "lift"),
            SimilarityType::Cosine => write!(f, "cosine"),
        }
    }
}

impl FromStr for SimilarityType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cooccurrence" => Ok(SimilarityType::Cooccurrence),
            "jaccard" => Ok(SimilarityType::Jaccard),
            "lift" => Ok(SimilarityType::Lift),
            "cosine" => Ok(SimilarityType::Cosine),
            other => Err(Error::configuration(format!(
                "unknown similarity type '{}'",
                other
            ))),
        }
    }
}

/// Sparse symmetric item-item matrix
///
/// Rows are indexed by item position, entries sorted by item position.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityMatrix {
    metric: SimilarityType,
    rows: Vec<Vec<(usize, f64)>>,
}

impl SimilarityMatrix {
    pub fn metric(&self) -> SimilarityType {
        self.metric
    }

    pub fn n_items(&self) -> usize {
        self.rows.len()
    }

    pub fn row(&self, item: usize) -> &[(usize, f64)] {
        &self.rows[item]
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        let row = &self.rows[i];
        row.binary_search_by_key(&j, |&(k, _)| k)
            .map(|pos| row[pos].1)
            .unwrap_or(0.0)
    }

    pub fn nnz(&self) -> usize {
        self.rows.iter().map(Vec::len).sum()
    }
}

/// Co-occurrence counts, one sparse row per item
pub fn cooccurrence(affinity: &AffinityMatrix) -> Vec<Vec<(usize, f64)>> {
    let item_users = affinity.item_users();
    let n_items = affinity.n_items();

    (0..n_items)
        .into_par_iter()
        .map(|i| {
            let mut counts: HashMap<usize, u32> = HashMap::new();
            for &user in &item_users[i] {
                for &(j, _) in affinity.row(user) {
                    *counts.entry(j).or_insert(0) += 1;
                }
            }
            let mut row: Vec<(usize, f64)> = counts
                .into_iter()
                .map(|(j, c)| (j, f64::from(c)))
                .collect();
            row.sort_unstable_by_key(|&(j, _)| j);
            row
        })
        .collect()
}

/// Compute the item-item similarity matrix
pub fn compute(affinity: &AffinityMatrix, metric: SimilarityType) -> SimilarityMatrix {
    let co = cooccurrence(affinity);
    let diag: Vec<f64> = co
        .iter()
        .enumerate()
        .map(|(i, row)| {
            row.binary_search_by_key(&i, |&(j, _)| j)
                .map(|pos| row[pos].1)
                .unwrap_or(0.0)
        })
        .collect();

    let rows = co
        .into_par_iter()
        .enumerate()
        .map(|(i, row)| {
            row.into_iter()
                .map(|(j, c)| (j, score(metric, c, diag[i], diag[j])))
                .collect()
        })
        .collect();

    SimilarityMatrix { metric, rows }
}

fn score(metric: SimilarityType, co_ij: f64, co_ii: f64, co_jj: f64) -> f64 {
    let (numerator, denominator) = match metric {
        SimilarityType::Cooccurrence => return co_ij,
        SimilarityType::Jaccard => (co_ij, co_ii + co_jj - co_ij),
        SimilarityType::Lift => (co_ij, co_ii * co_jj),
        SimilarityType::Cosine => (co_ij, (co_ii * co_jj).sqrt()),
    };
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recommendation::affinity;
    use crate::recommendation::interactions::InteractionStore;
    use crate::recommendation::model_config::SarConfig;
    use crate::table::{Column, Id, Table};

    // users: 1 -> {a, b}, 2 -> {a, b, c}, 3 -> {c}
    fn affinity_for(metric: SimilarityType) -> AffinityMatrix {
        let users = [1, 1, 2, 2, 2, 3];
        let items = ["a", "b", "a", "b", "c", "c"];
        let table = Table::new()
            .with_column(
                "userID",
                Column::Ids(users.iter().map(|&u| Id::Int(u)).collect()),
            )
            .unwrap()
            .with_column(
                "itemID",
                Column::Ids(items.iter().map(|&i| Id::from(i)).collect()),
            )
            .unwrap()
            .with_column("rating", Column::Numbers(vec![5.0; 6]))
            .unwrap();
        let config = SarConfig::builder(metric).build().unwrap();
        let store = InteractionStore::from_table(&table, &config).unwrap();
        affinity::build(&store, &config).unwrap()
    }

    #[test]
    fn test_parse_similarity_type() {
        assert_eq!("Jaccard".parse::<SimilarityType>().unwrap(), SimilarityType::Jaccard);
        assert_eq!(
            "cooccurrence".parse::<SimilarityType>().unwrap(),
            SimilarityType::Cooccurrence
        );
        let err = "pearson".parse::<SimilarityType>().unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn test_cooccurrence_counts() {
        let sim = compute(&affinity_for(SimilarityType::Cooccurrence), SimilarityType::Cooccurrence);
        // items in first-seen order: a=0, b=1, c=2
        assert_eq!(sim.get(0, 0), 2.0);
        assert_eq!(sim.get(0, 1), 2.0);
        assert_eq!(sim.get(0, 2), 1.0);
        assert_eq!(sim.get(2, 2), 2.0);
        assert_eq!(sim.nnz(), 9);
    }

    #[test]
    fn test_jaccard_values() {
        let sim = compute(&affinity_for(SimilarityType::Jaccard), SimilarityType::Jaccard);
        assert_eq!(sim.get(0, 0), 1.0);
        assert_eq!(sim.get(0, 1), 1.0);
        // 1 / (2 + 2 - 1)
        assert!((sim.get(0, 2) - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_lift_and_cosine_values() {
        let a = affinity_for(SimilarityType::Lift);
        let lift = compute(&a, SimilarityType::Lift);
        assert!((lift.get(0, 2) - 0.25).abs() < 1e-12);

        let cosine = compute(&a, SimilarityType::Cosine);
        assert!((cosine.get(0, 2) - 0.5).abs() < 1e-12);
        assert!((cosine.get(1, 1) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_symmetry_every_metric() {
        let a = affinity_for(SimilarityType::Jaccard);
        for metric in [
            SimilarityType::Cooccurrence,
            SimilarityType::Jaccard,
            SimilarityType::Lift,
            SimilarityType::Cosine,
        ] {
            let sim = compute(&a, metric);
            for i in 0..sim.n_items() {
                for j in 0..sim.n_items() {
                    assert_eq!(sim.get(i, j), sim.get(j, i), "{} not symmetric", metric);
                }
            }
        }
    }

    #[test]
    fn test_zero_denominator_scores_zero() {
        assert_eq!(score(SimilarityType::Jaccard, 0.0, 0.0, 0.0), 0.0);
        assert_eq!(score(SimilarityType::Lift, 0.0, 0.0, 3.0), 0.0);
        assert_eq!(score(SimilarityType::Cosine, 0.0, 2.0, 0.0), 0.0);
    }
}
