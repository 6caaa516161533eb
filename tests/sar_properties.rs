//! Model-level properties of the SAR engine
//!
//! Run with: cargo test --test sar_properties

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sar::{Column, Error, Id, Sar, SarConfig, SimilarityType, Table};
use std::collections::HashSet;

const METRICS: [SimilarityType; 4] = [
    SimilarityType::Cooccurrence,
    SimilarityType::Jaccard,
    SimilarityType::Lift,
    SimilarityType::Cosine,
];

/// Random interactions over 30 users and 25 items, with duplicates
fn random_interactions(seed: u64) -> Table {
    let mut rng = StdRng::seed_from_u64(seed);
    let n = 400;
    let mut users = Vec::with_capacity(n);
    let mut items = Vec::with_capacity(n);
    let mut ratings = Vec::with_capacity(n);
    let mut timestamps = Vec::with_capacity(n);
    for _ in 0..n {
        users.push(Id::Int(rng.gen_range(0..30)));
        items.push(Id::Text(format!("item-{:02}", rng.gen_range(0..25))));
        ratings.push(rng.gen_range(1..=5) as f64);
        timestamps.push(rng.gen_range(1_000_000.0..2_000_000.0));
    }

    Table::new()
        .with_column("userID", Column::Ids(users))
        .unwrap()
        .with_column("itemID", Column::Ids(items))
        .unwrap()
        .with_column("rating", Column::Numbers(ratings))
        .unwrap()
        .with_column("timestamp", Column::Numbers(timestamps))
        .unwrap()
}

fn fitted(metric: SimilarityType, table: &Table) -> Sar {
    let model = Sar::new(SarConfig::builder(metric).build().unwrap());
    model.fit(table).unwrap();
    model
}

#[test]
fn similarity_is_symmetric_for_every_metric() {
    let table = random_interactions(1);
    for metric in METRICS {
        let model = fitted(metric, &table);
        let fit = model.fitted().unwrap();
        let sim = fit.similarity();
        for i in 0..sim.n_items() {
            for j in 0..sim.n_items() {
                assert_eq!(sim.get(i, j), sim.get(j, i), "{} at ({}, {})", metric, i, j);
            }
        }
    }
}

#[test]
fn similarity_values_are_in_range() {
    let table = random_interactions(2);
    for metric in METRICS {
        let model = fitted(metric, &table);
        let fit = model.fitted().unwrap();
        let sim = fit.similarity();
        for i in 0..sim.n_items() {
            for &(_, value) in sim.row(i) {
                assert!(value >= 0.0, "{} produced {}", metric, value);
                if matches!(metric, SimilarityType::Jaccard | SimilarityType::Cosine) {
                    assert!(value <= 1.0 + 1e-12, "{} produced {}", metric, value);
                }
            }
        }
    }
}

#[test]
fn unknown_user_gets_empty_result() {
    let model = fitted(SimilarityType::Jaccard, &random_interactions(3));
    let recs = model
        .recommend_for_user(&Id::from("nobody"), 10, true)
        .unwrap();
    assert!(recs.is_empty());

    let test = Table::new()
        .with_column("userID", Column::Ids(vec![Id::Int(999)]))
        .unwrap();
    let out = model.recommend_k_items(&test, 10, true).unwrap();
    assert_eq!(out.len(), 0);
}

#[test]
fn remove_seen_excludes_training_items() {
    let table = random_interactions(4);
    let model = fitted(SimilarityType::Cosine, &table);
    let out = model.recommend_k_items(&table, 10, true).unwrap();

    let train: HashSet<(Id, Id)> = table
        .ids("userID")
        .unwrap()
        .iter()
        .cloned()
        .zip(table.ids("itemID").unwrap().iter().cloned())
        .collect();

    let users = out.ids("userID").unwrap();
    let items = out.ids("itemID").unwrap();
    assert!(!users.is_empty());
    for (user, item) in users.iter().zip(items.iter()) {
        assert!(!train.contains(&(user.clone(), item.clone())));
    }
}

#[test]
fn results_are_bounded_and_ordered() {
    let table = random_interactions(5);
    for metric in METRICS {
        let model = fitted(metric, &table);
        let out = model.recommend_k_items(&table, 7, false).unwrap();
        let users = out.ids("userID").unwrap();
        let items = out.ids("itemID").unwrap();
        let scores = out.numbers("prediction").unwrap();

        let mut per_user = std::collections::HashMap::new();
        for user in users.iter() {
            *per_user.entry(user).or_insert(0usize) += 1;
        }
        assert!(per_user.values().all(|&n| n <= 7));

        for row in 1..out.len() {
            if users[row] != users[row - 1] {
                continue;
            }
            let ordered = scores[row - 1] > scores[row]
                || (scores[row - 1] == scores[row] && items[row - 1] < items[row]);
            assert!(ordered, "{} rows {} and {} out of order", metric, row - 1, row);
        }
    }
}

#[test]
fn refit_is_deterministic() {
    let table = random_interactions(6);
    let config = SarConfig::builder(SimilarityType::Lift)
        .time_decay(86_400.0 * 3.0)
        .build()
        .unwrap();

    let a = Sar::new(config.clone());
    let b = Sar::new(config);
    a.fit(&table).unwrap();
    b.fit(&table).unwrap();
    let (fa, fb) = (a.fitted().unwrap(), b.fitted().unwrap());
    assert_eq!(fa.affinity(), fb.affinity());
    assert_eq!(fa.similarity(), fb.similarity());

    let ra = a.recommend_k_items(&table, 5, true).unwrap();
    let rb = b.recommend_k_items(&table, 5, true).unwrap();
    assert_eq!(ra, rb);
}

#[test]
fn failed_fit_keeps_previous_state() {
    let table = random_interactions(7);
    let model = fitted(SimilarityType::Jaccard, &table);
    let before = model.recommend_k_items(&table, 5, true).unwrap();

    let broken = Table::new()
        .with_column("userID", Column::Ids(vec![Id::Int(1)]))
        .unwrap();
    assert!(matches!(model.fit(&broken), Err(Error::Schema { .. })));

    let after = model.recommend_k_items(&table, 5, true).unwrap();
    assert_eq!(before, after);
}

#[test]
fn unfitted_model_reports_not_fitted() {
    let model = Sar::new(SarConfig::builder(SimilarityType::Jaccard).build().unwrap());
    assert!(!model.is_fitted());
    assert!(matches!(
        model.recommend_k_items(&random_interactions(8), 5, true),
        Err(Error::NotFitted)
    ));
    assert!(matches!(model.popular_items(5), Err(Error::NotFitted)));
}

#[test]
fn default_configuration() {
    let config = SarConfig::builder(SimilarityType::Jaccard).build().unwrap();
    assert_eq!(config.time_decay_half_life(), 2_592_000.0);
    assert!(!config.time_decay_flag());
    assert_eq!(config.time_now(), None);
    assert_eq!(config.threshold(), 1.0);
    assert!(!config.binary());
}
