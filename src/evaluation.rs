//! Ranking evaluation metrics
//!
//! Compares a prediction table against ground truth, both keyed by
//! (user, item) under the same column names. Only users present in both
//! tables are evaluated. Relevance is binary: an item is relevant when the
//! user has it in the truth table. Predictions are ranked per user by score
//! descending, ties by item ascending, and cut at `k`.
//!
//! - precision@k = hits / k
//! - recall@k = hits / |relevant|
//! - MAP@k = Σ_{hit at rank r} (hits up to r / r) / |relevant|
//! - NDCG@k = DCG / IDCG with gain `1 / log2(rank + 1)`
//!
//! Each is averaged over evaluated users and lies in [0, 1]; 0 when no user
//! is shared.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::recommendation::model_config::ColumnNames;
use crate::table::{Id, Table};

/// All four ranking metrics at one cutoff
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankingReport {
    pub k: usize,
    pub n_users: usize,
    pub map: f64,
    pub ndcg: f64,
    pub precision: f64,
    pub recall: f64,
}

/// Ranks (1-based) of relevant items among one user's top-k predictions
struct UserHits {
    ranks: Vec<usize>,
    n_relevant: usize,
}

fn collect_hits(
    truth: &Table,
    predictions: &Table,
    columns: &ColumnNames,
    k: usize,
) -> Result<Vec<UserHits>> {
    let truth_users = truth.ids(&columns.col_user)?;
    let truth_items = truth.ids(&columns.col_item)?;
    let pred_users = predictions.ids(&columns.col_user)?;
    let pred_items = predictions.ids(&columns.col_item)?;
    let pred_scores = predictions.numbers(&columns.col_prediction)?;

    let mut relevant: HashMap<&Id, HashSet<&Id>> = HashMap::new();
    let mut order: Vec<&Id> = Vec::new();
    for (user, item) in truth_users.iter().zip(truth_items.iter()) {
        relevant
            .entry(user)
            .or_insert_with(|| {
                order.push(user);
                HashSet::new()
            })
            .insert(item);
    }

    let mut ranked: HashMap<&Id, Vec<(&Id, f64)>> = HashMap::new();
    for ((user, item), &score) in pred_users
        .iter()
        .zip(pred_items.iter())
        .zip(pred_scores.iter())
    {
        ranked.entry(user).or_default().push((item, score));
    }

    let hits = order
        .into_iter()
        .filter_map(|user| {
            let mut preds = ranked.remove(user)?;
            let relevant = &relevant[user];
            preds.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
            // a repeated item keeps its best rank only
            let mut listed = HashSet::new();
            preds.retain(|(item, _)| listed.insert(*item));
            let ranks = preds
                .iter()
                .take(k)
                .enumerate()
                .filter(|(_, (item, _))| relevant.contains(item))
                .map(|(idx, _)| idx + 1)
                .collect();
            Some(UserHits {
                ranks,
                n_relevant: relevant.len(),
            })
        })
        .collect();

    Ok(hits)
}

fn average(hits: &[UserHits], per_user: impl Fn(&UserHits) -> f64) -> f64 {
    if hits.is_empty() {
        return 0.0;
    }
    hits.iter().map(per_user).sum::<f64>() / hits.len() as f64
}

fn precision(hits: &UserHits, k: usize) -> f64 {
    hits.ranks.len() as f64 / k as f64
}

fn recall(hits: &UserHits) -> f64 {
    hits.ranks.len() as f64 / hits.n_relevant as f64
}

fn average_precision(hits: &UserHits) -> f64 {
    hits.ranks
        .iter()
        .enumerate()
        .map(|(idx, &rank)| (idx + 1) as f64 / rank as f64)
        .sum::<f64>()
        / hits.n_relevant as f64
}

fn ndcg(hits: &UserHits, k: usize) -> f64 {
    let gain = |rank: usize| 1.0 / ((rank + 1) as f64).log2();
    let dcg: f64 = hits.ranks.iter().map(|&r| gain(r)).sum();
    let idcg: f64 = (1..=hits.n_relevant.min(k)).map(gain).sum();
    if idcg == 0.0 {
        0.0
    } else {
        dcg / idcg
    }
}

pub fn precision_at_k(truth: &Table, predictions: &Table, columns: &ColumnNames, k: usize) -> Result<f64> {
    if k == 0 {
        return Ok(0.0);
    }
    let hits = collect_hits(truth, predictions, columns, k)?;
    Ok(average(&hits, |h| precision(h, k)))
}

pub fn recall_at_k(truth: &Table, predictions: &Table, columns: &ColumnNames, k: usize) -> Result<f64> {
    let hits = collect_hits(truth, predictions, columns, k)?;
    Ok(average(&hits, recall))
}

pub fn map_at_k(truth: &Table, predictions: &Table, columns: &ColumnNames, k: usize) -> Result<f64> {
    let hits = collect_hits(truth, predictions, columns, k)?;
    Ok(average(&hits, average_precision))
}

pub fn ndcg_at_k(truth: &Table, predictions: &Table, columns: &ColumnNames, k: usize) -> Result<f64> {
    let hits = collect_hits(truth, predictions, columns, k)?;
    Ok(average(&hits, |h| ndcg(h, k)))
}

/// Compute all four metrics in a single pass over the tables
pub fn evaluate(truth: &Table, predictions: &Table, columns: &ColumnNames, k: usize) -> Result<RankingReport> {
    let hits = collect_hits(truth, predictions, columns, k)?;
    let precision = if k == 0 {
        0.0
    } else {
        average(&hits, |h| precision(h, k))
    };
    Ok(RankingReport {
        k,
        n_users: hits.len(),
        map: average(&hits, average_precision),
        ndcg: average(&hits, |h| ndcg(h, k)),
        precision,
        recall: average(&hits, recall),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::table::Column;

    fn columns() -> ColumnNames {
        ColumnNames::default()
    }

    fn truth() -> Table {
        let rows = [(1, "a"), (1, "b"), (1, "c"), (2, "d"), (3, "x")];
        Table::new()
            .with_column("userID", Column::Ids(rows.iter().map(|r| Id::Int(r.0)).collect()))
            .unwrap()
            .with_column("itemID", Column::Ids(rows.iter().map(|r| Id::from(r.1)).collect()))
            .unwrap()
    }

    fn predictions() -> Table {
        // user 1 is listed out of score order on purpose
        let rows = [
            (1, "b", 0.7),
            (1, "a", 0.9),
            (1, "e", 0.8),
            (2, "f", 0.5),
            (2, "d", 0.4),
            (4, "a", 1.0),
        ];
        Table::new()
            .with_column("userID", Column::Ids(rows.iter().map(|r| Id::Int(r.0)).collect()))
            .unwrap()
            .with_column("itemID", Column::Ids(rows.iter().map(|r| Id::from(r.1)).collect()))
            .unwrap()
            .with_column("prediction", Column::Numbers(rows.iter().map(|r| r.2).collect()))
            .unwrap()
    }

    #[test]
    fn test_precision_and_recall() {
        let p = precision_at_k(&truth(), &predictions(), &columns(), 3).unwrap();
        let r = recall_at_k(&truth(), &predictions(), &columns(), 3).unwrap();
        assert!((p - 0.5).abs() < 1e-12);
        assert!((r - 5.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_duplicate_predictions_count_once() {
        let truth = Table::new()
            .with_column("userID", Column::Ids(vec![Id::Int(1)]))
            .unwrap()
            .with_column("itemID", Column::Ids(vec![Id::from("a")]))
            .unwrap();
        let predictions = Table::new()
            .with_column("userID", Column::Ids(vec![Id::Int(1), Id::Int(1)]))
            .unwrap()
            .with_column("itemID", Column::Ids(vec![Id::from("a"), Id::from("a")]))
            .unwrap()
            .with_column("prediction", Column::Numbers(vec![1.0, 1.0]))
            .unwrap();

        let report = evaluate(&truth, &predictions, &columns(), 2).unwrap();
        assert!((report.precision - 0.5).abs() < 1e-12);
        assert!((report.recall - 1.0).abs() < 1e-12);
        assert!((report.map - 1.0).abs() < 1e-12);
        assert!((report.ndcg - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_map() {
        let m = map_at_k(&truth(), &predictions(), &columns(), 3).unwrap();
        assert!((m - 19.0 / 36.0).abs() < 1e-12);
    }

    #[test]
    fn test_ndcg() {
        let n = ndcg_at_k(&truth(), &predictions(), &columns(), 3).unwrap();
        let user1 = 1.5 / (1.5 + 1.0 / 3f64.log2());
        let user2 = 1.0 / 3f64.log2();
        assert!((n - (user1 + user2) / 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_cutoff_drops_lower_ranks() {
        let report = evaluate(&truth(), &predictions(), &columns(), 1).unwrap();
        assert_eq!(report.n_users, 2);
        // only user 1 hits at rank 1
        assert!((report.precision - 0.5).abs() < 1e-12);
        assert!((report.ndcg - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_perfect_ranking_scores_one() {
        let report = evaluate(&truth(), &truth_as_predictions(), &columns(), 3).unwrap();
        assert!((report.ndcg - 1.0).abs() < 1e-12);
        assert!((report.map - 1.0).abs() < 1e-12);
        assert!((report.recall - 1.0).abs() < 1e-12);
    }

    fn truth_as_predictions() -> Table {
        let truth = truth();
        let n = truth.len();
        truth
            .with_column("prediction", Column::Numbers(vec![1.0; n]))
            .unwrap()
    }

    #[test]
    fn test_no_shared_users() {
        let empty = Table::new()
            .with_column("userID", Column::Ids(vec![]))
            .unwrap()
            .with_column("itemID", Column::Ids(vec![]))
            .unwrap()
            .with_column("prediction", Column::Numbers(vec![]))
            .unwrap();
        let report = evaluate(&truth(), &empty, &columns(), 10).unwrap();
        assert_eq!(report.n_users, 0);
        assert_eq!(report.map, 0.0);
        assert_eq!(report.precision, 0.0);
    }

    #[test]
    fn test_missing_prediction_column() {
        let err = map_at_k(&truth(), &truth(), &columns(), 3).unwrap_err();
        assert!(matches!(err, Error::Schema { .. }));
    }
}
