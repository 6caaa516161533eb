//! Interaction Store
//!
//! Validates an interaction table against the model's column mapping and
//! indexes users and items in first-seen order.

use std::collections::HashMap;

use super::model_config::SarConfig;
use crate::error::{Error, Result};
use crate::table::{Id, Table};

/// Stable index over identifiers, in first-seen order
#[derive(Debug, Clone, Default)]
pub struct IdIndex {
    ids: Vec<Id>,
    positions: HashMap<Id, usize>,
}

impl IdIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Position of `id`, inserting it at the end if unseen
    pub fn insert(&mut self, id: &Id) -> usize {
        if let Some(&pos) = self.positions.get(id) {
            return pos;
        }
        let pos = self.ids.len();
        self.ids.push(id.clone());
        self.positions.insert(id.clone(), pos);
        pos
    }

    pub fn position(&self, id: &Id) -> Option<usize> {
        self.positions.get(id).copied()
    }

    pub fn id(&self, pos: usize) -> &Id {
        &self.ids[pos]
    }

    pub fn ids(&self) -> &[Id] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// One validated interaction, referring to users and items by index
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interaction {
    pub user: usize,
    pub item: usize,
    pub rating: f64,
    pub timestamp: Option<f64>,
}

/// Validated interaction records
///
/// Duplicate rows are kept; each one contributes to the affinity matrix.
#[derive(Debug, Clone)]
pub struct InteractionStore {
    users: IdIndex,
    items: IdIndex,
    records: Vec<Interaction>,
}

impl InteractionStore {
    /// Read interactions out of `table` using the column names in `config`
    pub fn from_table(table: &Table, config: &SarConfig) -> Result<Self> {
        let users = table.ids(config.col_user())?;
        let items = table.ids(config.col_item())?;
        let ratings = table.numbers(config.col_rating())?;

        let timestamps = if table.has_column(config.col_timestamp()) {
            Some(table.numbers(config.col_timestamp())?)
        } else if config.time_decay_flag() {
            return Err(Error::configuration(format!(
                "time decay requires timestamp column '{}'",
                config.col_timestamp()
            )));
        } else {
            None
        };

        let mut user_index = IdIndex::new();
        let mut item_index = IdIndex::new();
        let mut records = Vec::with_capacity(table.len());

        for row in 0..table.len() {
            let rating = ratings[row];
            if !rating.is_finite() {
                return Err(Error::schema(
                    config.col_rating(),
                    format!("row {} has non-finite rating {}", row, rating),
                ));
            }
            let timestamp = match timestamps {
                Some(ts) if !ts[row].is_finite() => {
                    return Err(Error::schema(
                        config.col_timestamp(),
                        format!("row {} has non-finite timestamp", row),
                    ));
                }
                Some(ts) => Some(ts[row]),
                None => None,
            };

            records.push(Interaction {
                user: user_index.insert(&users[row]),
                item: item_index.insert(&items[row]),
                rating,
                timestamp,
            });
        }

        Ok(Self {
            users: user_index,
            items: item_index,
            records,
        })
    }

    pub fn users(&self) -> &IdIndex {
        &self.users
    }

    pub fn items(&self) -> &IdIndex {
        &self.items
    }

    /// Consume the store, keeping only the user and item indices
    pub fn into_indices(self) -> (IdIndex, IdIndex) {
        (self.users, self.items)
    }

    pub fn records(&self) -> &[Interaction] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Items each user interacted with, sorted by item index
    ///
    /// Built from every record, regardless of rating threshold.
    pub fn seen_items(&self) -> Vec<Vec<usize>> {
        let mut seen = vec![Vec::new(); self.users.len()];
        for record in &self.records {
            seen[record.user].push(record.item);
        }
        for items in &mut seen {
            items.sort_unstable();
            items.dedup();
        }
        seen
    }

    /// Latest timestamp in the store, if any
    pub fn max_timestamp(&self) -> Option<f64> {
        self.records
            .iter()
            .filter_map(|r| r.timestamp)
            .fold(None, |acc, t| Some(acc.map_or(t, |a: f64| a.max(t))))
    }
}
