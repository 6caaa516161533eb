//! SAR Recommendation Engine
//!
//! Fits affinity and similarity matrices from interaction history and scores
//! candidate items for users as `affinity_row × similarity`.
//!
//! A [`Sar`] model starts unfitted. `fit` builds a complete new
//! [`FittedModel`] off to the side and swaps it in under a short write lock,
//! so concurrent readers see either the previous or the new state, and a
//! failed fit leaves the previous state in place.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::affinity::{self, AffinityMatrix};
use super::interactions::{IdIndex, InteractionStore};
use super::metrics::{FitSummary, PerformanceTimer, SLOW_FIT_THRESHOLD_MS};
use super::model_config::SarConfig;
use super::similarity::{self, SimilarityMatrix};
use crate::error::{Error, Result};
use crate::table::{Column, Id, Table};

/// A scored recommendation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub user: Id,
    pub item: Id,
    pub score: f64,
}

/// An item ranked by similarity to a seed item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarItem {
    pub seed: Id,
    pub item: Id,
    pub score: f64,
}

/// Immutable artifacts of one successful fit
#[derive(Debug)]
pub struct FittedModel {
    users: IdIndex,
    items: IdIndex,
    affinity: AffinityMatrix,
    similarity: SimilarityMatrix,
    seen: Vec<Vec<usize>>,
    summary: FitSummary,
}

impl FittedModel {
    pub fn users(&self) -> &IdIndex {
        &self.users
    }

    pub fn items(&self) -> &IdIndex {
        &self.items
    }

    pub fn affinity(&self) -> &AffinityMatrix {
        &self.affinity
    }

    pub fn similarity(&self) -> &SimilarityMatrix {
        &self.similarity
    }

    pub fn summary(&self) -> &FitSummary {
        &self.summary
    }

    /// Items the user interacted with in training, sorted by position
    pub fn seen_items(&self, user: usize) -> &[usize] {
        &self.seen[user]
    }

    /// Top-K items for the user at `user` position
    ///
    /// Users with no affinity get nothing.
    pub fn recommend_position(
        &self,
        user: usize,
        top_k: usize,
        remove_seen: bool,
    ) -> Vec<(usize, f64)> {
        let row = self.affinity.row(user);
        if row.is_empty() || top_k == 0 {
            return Vec::new();
        }
        let scores = score_items(row, &self.similarity);
        let excluded: &[usize] = if remove_seen { &self.seen[user] } else { &[] };
        top_k_items(&scores, &self.items, top_k, excluded)
    }

    fn recommend(&self, user: &Id, top_k: usize, remove_seen: bool) -> Vec<Recommendation> {
        let Some(position) = self.users.position(user) else {
            return Vec::new();
        };
        self.recommend_position(position, top_k, remove_seen)
            .into_iter()
            .map(|(item, score)| Recommendation {
                user: user.clone(),
                item: self.items.id(item).clone(),
                score,
            })
            .collect()
    }

    fn predict_pair(&self, user: usize, item: usize) -> f64 {
        self.affinity
            .row(user)
            .iter()
            .map(|&(j, weight)| weight * self.similarity.get(j, item))
            .sum()
    }
}

/// Dense score vector: `Σ weight(j) · similarity(j, ·)` over the row
pub fn score_items(row: &[(usize, f64)], similarity: &SimilarityMatrix) -> Vec<f64> {
    let mut scores = vec![0.0; similarity.n_items()];
    for &(j, weight) in row {
        for &(item, sim) in similarity.row(j) {
            scores[item] += weight * sim;
        }
    }
    scores
}

/// Highest scores first, ties broken by ascending identifier
fn rank_order(a: &(usize, f64), b: &(usize, f64), items: &IdIndex) -> Ordering {
    b.1.total_cmp(&a.1)
        .then_with(|| items.id(a.0).cmp(items.id(b.0)))
}

/// Select the `k` best candidates, skipping `excluded` (sorted positions)
///
/// Every item is a candidate, including ones scoring 0. Fewer than `k`
/// candidates are all returned.
pub fn top_k_items(
    scores: &[f64],
    items: &IdIndex,
    k: usize,
    excluded: &[usize],
) -> Vec<(usize, f64)> {
    let mut candidates: Vec<(usize, f64)> = scores
        .iter()
        .enumerate()
        .filter(|(item, _)| excluded.binary_search(item).is_err())
        .map(|(item, &score)| (item, score))
        .collect();

    if k == 0 {
        return Vec::new();
    }
    if candidates.len() > k {
        candidates.select_nth_unstable_by(k - 1, |a, b| rank_order(a, b, items));
        candidates.truncate(k);
    }
    candidates.sort_by(|a, b| rank_order(a, b, items));
    candidates
}

/// SAR model
#[derive(Debug)]
pub struct Sar {
    config: SarConfig,
    state: RwLock<Option<Arc<FittedModel>>>,
}

impl Sar {
    pub fn new(config: SarConfig) -> Self {
        Self {
            config,
            state: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &SarConfig {
        &self.config
    }

    pub fn is_fitted(&self) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Current fitted state
    pub fn fitted(&self) -> Result<Arc<FittedModel>> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(Error::NotFitted)
    }

    /// Build affinity and similarity from `interactions`, replacing any
    /// previous fit
    #[instrument(skip(self, interactions), fields(rows = interactions.len()))]
    pub fn fit(&self, interactions: &Table) -> Result<FitSummary> {
        let timer = PerformanceTimer::new("sar_fit");

        let store = InteractionStore::from_table(interactions, &self.config)?;
        let affinity = affinity::build(&store, &self.config)?;
        debug!(
            users = affinity.n_users(),
            items = affinity.n_items(),
            nnz = affinity.nnz(),
            "Affinity matrix built"
        );

        let similarity = similarity::compute(&affinity, self.config.similarity_type());
        let seen = store.seen_items();

        let summary = FitSummary {
            n_users: store.users().len(),
            n_items: store.items().len(),
            n_interactions: store.len(),
            affinity_nnz: affinity.nnz(),
            similarity_nnz: similarity.nnz(),
            similarity_type: self.config.similarity_type(),
            fit_duration_ms: timer.elapsed_ms(),
        };
        timer.log_if_slow(SLOW_FIT_THRESHOLD_MS);

        info!(
            "Fitted SAR ({}): {} users, {} items, {} similarity entries",
            summary.similarity_type, summary.n_users, summary.n_items, summary.similarity_nnz
        );

        let (users, items) = store.into_indices();
        let fitted = Arc::new(FittedModel {
            users,
            items,
            affinity,
            similarity,
            seen,
            summary: summary.clone(),
        });

        *self.state.write().unwrap_or_else(PoisonError::into_inner) = Some(fitted);
        Ok(summary)
    }

    /// Top-K recommendations for every distinct user in `test`
    ///
    /// Output columns are the model's user, item and prediction columns, one
    /// row per recommendation. Users unknown to the model are skipped.
    pub fn recommend_k_items(&self, test: &Table, top_k: usize, remove_seen: bool) -> Result<Table> {
        let fitted = self.fitted()?;
        let test_users = test.ids(self.config.col_user())?;

        let mut seen_users = HashSet::new();
        let users: Vec<&Id> = test_users
            .iter()
            .filter(|u| seen_users.insert(*u))
            .collect();

        let per_user: Vec<Vec<Recommendation>> = users
            .par_iter()
            .map(|user| fitted.recommend(user, top_k, remove_seen))
            .collect();

        let total: usize = per_user.iter().map(Vec::len).sum();
        let mut out_users = Vec::with_capacity(total);
        let mut out_items = Vec::with_capacity(total);
        let mut out_scores = Vec::with_capacity(total);
        for rec in per_user.into_iter().flatten() {
            out_users.push(rec.user);
            out_items.push(rec.item);
            out_scores.push(rec.score);
        }

        debug!(
            users = users.len(),
            rows = total,
            "Generated top-{} recommendations",
            top_k
        );

        Table::new()
            .with_column(self.config.col_user(), Column::Ids(out_users))?
            .with_column(self.config.col_item(), Column::Ids(out_items))?
            .with_column(self.config.col_prediction(), Column::Numbers(out_scores))
    }

    /// Top-K recommendations for a single user; empty for unknown users
    pub fn recommend_for_user(
        &self,
        user: &Id,
        top_k: usize,
        remove_seen: bool,
    ) -> Result<Vec<Recommendation>> {
        Ok(self.fitted()?.recommend(user, top_k, remove_seen))
    }

    /// Score each (user, item) row of `test`
    ///
    /// Rows whose user or item was not in training are dropped.
    pub fn predict(&self, test: &Table) -> Result<Table> {
        let fitted = self.fitted()?;
        let users = test.ids(self.config.col_user())?;
        let items = test.ids(self.config.col_item())?;

        let mut out_users = Vec::new();
        let mut out_items = Vec::new();
        let mut out_scores = Vec::new();
        for (user, item) in users.iter().zip(items.iter()) {
            let (Some(u), Some(i)) = (fitted.users.position(user), fitted.items.position(item))
            else {
                continue;
            };
            out_users.push(user.clone());
            out_items.push(item.clone());
            out_scores.push(fitted.predict_pair(u, i));
        }

        Table::new()
            .with_column(self.config.col_user(), Column::Ids(out_users))?
            .with_column(self.config.col_item(), Column::Ids(out_items))?
            .with_column(self.config.col_prediction(), Column::Numbers(out_scores))
    }

    /// Items ranked by the number of distinct users with affinity for them
    pub fn popular_items(&self, top_k: usize) -> Result<Vec<(Id, f64)>> {
        let fitted = self.fitted()?;
        let popularity: Vec<f64> = fitted
            .affinity
            .item_users()
            .iter()
            .map(|users| users.len() as f64)
            .collect();

        Ok(top_k_items(&popularity, &fitted.items, top_k, &[])
            .into_iter()
            .map(|(item, count)| (fitted.items.id(item).clone(), count))
            .collect())
    }

    /// The `top_k` most similar other items for each known seed item
    pub fn similar_items(&self, seeds: &[Id], top_k: usize) -> Result<Vec<SimilarItem>> {
        let fitted = self.fitted()?;
        let mut out = Vec::new();

        for seed in seeds {
            let Some(position) = fitted.items.position(seed) else {
                continue;
            };
            let mut row: Vec<(usize, f64)> = fitted
                .similarity
                .row(position)
                .iter()
                .copied()
                .filter(|&(item, score)| item != position && score > 0.0)
                .collect();
            row.sort_by(|a, b| rank_order(a, b, &fitted.items));
            row.truncate(top_k);

            out.extend(row.into_iter().map(|(item, score)| SimilarItem {
                seed: seed.clone(),
                item: fitted.items.id(item).clone(),
                score,
            }));
        }

        Ok(out)
    }
}
