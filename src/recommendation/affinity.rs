//! Affinity Builder
//!
//! Turns interactions into a sparse user-item affinity matrix. Each retained
//! interaction adds its weight to its (user, item) cell:
//!
//! - plain: the rating
//! - binary: 1
//! - time decay: the above times `2^(-(time_now - t) / half_life)`
//!
//! Interactions rated below the threshold are skipped. Building is O(n) in
//! the number of interactions.

use std::collections::HashMap;

use tracing::debug;

use super::interactions::InteractionStore;
use super::model_config::SarConfig;
use crate::error::{Error, Result};

/// Sparse user-item affinity matrix
///
/// Rows are indexed by user position, entries sorted by item position. Only
/// nonzero weights are stored.
#[derive(Debug, Clone, PartialEq)]
pub struct AffinityMatrix {
    rows: Vec<Vec<(usize, f64)>>,
    n_items: usize,
}

impl AffinityMatrix {
    pub fn n_users(&self) -> usize {
        self.rows.len()
    }

    pub fn n_items(&self) -> usize {
        self.n_items
    }

    /// Nonzero entries of a user's row
    pub fn row(&self, user: usize) -> &[(usize, f64)] {
        &self.rows[user]
    }

    pub fn get(&self, user: usize, item: usize) -> f64 {
        let row = &self.rows[user];
        row.binary_search_by_key(&item, |&(i, _)| i)
            .map(|pos| row[pos].1)
            .unwrap_or(0.0)
    }

    /// Number of stored entries
    pub fn nnz(&self) -> usize {
        self.rows.iter().map(Vec::len).sum()
    }

    /// Users with nonzero affinity for each item, ascending
    pub fn item_users(&self) -> Vec<Vec<usize>> {
        let mut columns = vec![Vec::new(); self.n_items];
        for (user, row) in self.rows.iter().enumerate() {
            for &(item, _) in row {
                columns[item].push(user);
            }
        }
        columns
    }
}

/// Build the affinity matrix for `store`
pub fn build(store: &InteractionStore, config: &SarConfig) -> Result<AffinityMatrix> {
    let decay = if config.time_decay_flag() {
        let half_life = config.time_decay_half_life();
        if !(half_life.is_finite() && half_life > 0.0) {
            return Err(Error::configuration(format!(
                "time_decay_half_life must be positive, got {}",
                half_life
            )));
        }
        let time_now = config
            .time_now()
            .or_else(|| store.max_timestamp())
            .ok_or_else(|| Error::configuration("time decay requires timestamps"))?;
        debug!(time_now, half_life, "Applying time decay to affinity");
        Some((time_now, half_life))
    } else {
        None
    };

    let mut accumulators: Vec<HashMap<usize, f64>> = vec![HashMap::new(); store.users().len()];

    for record in store.records() {
        if record.rating < config.threshold() {
            continue;
        }

        let base = if config.binary() { 1.0 } else { record.rating };
        let weight = match decay {
            Some((time_now, half_life)) => {
                let timestamp = record
                    .timestamp
                    .ok_or_else(|| Error::configuration("time decay requires timestamps"))?;
                base * decay_factor(time_now, timestamp, half_life)
            }
            None => base,
        };

        *accumulators[record.user].entry(record.item).or_insert(0.0) += weight;
    }

    let rows = accumulators
        .into_iter()
        .map(|acc| {
            let mut row: Vec<(usize, f64)> = acc.into_iter().filter(|&(_, w)| w != 0.0).collect();
            row.sort_unstable_by_key(|&(item, _)| item);
            row
        })
        .collect();

    Ok(AffinityMatrix {
        rows,
        n_items: store.items().len(),
    })
}

/// `2^(-(time_now - timestamp) / half_life)`
pub fn decay_factor(time_now: f64, timestamp: f64, half_life: f64) -> f64 {
    (-(time_now - timestamp) / half_life).exp2()
}
