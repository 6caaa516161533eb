//! End-to-end run on MovieLens 100k
//!
//! Needs a local copy of `u.data`:
//! MOVIELENS_100K_PATH=/data/ml-100k/u.data cargo test --test movielens_benchmark -- --ignored

use sar::datasets::{movielens, split};
use sar::evaluation;
use sar::{ColumnNames, Sar, SarConfig, SimilarityType};

const TOLERANCE: f64 = 0.05;

fn within(value: f64, low: f64, high: f64) -> bool {
    value >= low - TOLERANCE && value <= high + TOLERANCE
}

#[test]
#[ignore]
fn jaccard_top10_matches_reference_band() {
    let path = std::env::var("MOVIELENS_100K_PATH")
        .expect("MOVIELENS_100K_PATH must point at u.data");

    let columns = ColumnNames {
        col_user: "UserId".to_string(),
        col_item: "MovieId".to_string(),
        col_rating: "Rating".to_string(),
        col_timestamp: "Timestamp".to_string(),
        col_prediction: "prediction".to_string(),
    };
    let header = ["UserId", "MovieId", "Rating", "Timestamp"];
    let data = movielens::load_ratings_with(&path, &header, "\t").unwrap();
    assert_eq!(data.len(), 100_000);

    let (train, test) = split::stratified_split(&data, 0.75, "UserId", 42).unwrap();

    let config = SarConfig::builder(SimilarityType::Jaccard)
        .columns(columns.clone())
        .time_decay(30.0 * 24.0 * 3600.0)
        .build()
        .unwrap();
    let model = Sar::new(config);
    let summary = model.fit(&train).unwrap();
    assert_eq!(summary.n_users, 943);

    let top_k = model.recommend_k_items(&test, 10, true).unwrap();
    let report = evaluation::evaluate(&test, &top_k, &columns, 10).unwrap();
    println!("{:?}", report);

    assert!(within(report.map, 0.107, 0.111), "MAP@10 {}", report.map);
    assert!(within(report.ndcg, 0.379, 0.382), "NDCG@10 {}", report.ndcg);
    assert!(within(report.precision, 0.330, 0.331), "P@10 {}", report.precision);
    assert!(within(report.recall, 0.176, 0.176), "R@10 {}", report.recall);
}
