//! Train/test splitting
//!
//! Both splitters are deterministic for a given seed and keep the original
//! row order inside each output table.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::{Error, Result};
use crate::table::{Id, Table};

fn check_ratio(ratio: f64) -> Result<()> {
    if !(ratio > 0.0 && ratio < 1.0) {
        return Err(Error::configuration(format!(
            "split ratio must be in (0, 1), got {}",
            ratio
        )));
    }
    Ok(())
}

fn partition(table: &Table, mut train_rows: Vec<usize>) -> (Table, Table) {
    train_rows.sort_unstable();
    let mut in_train = vec![false; table.len()];
    for &row in &train_rows {
        in_train[row] = true;
    }
    let test_rows: Vec<usize> = (0..table.len()).filter(|&r| !in_train[r]).collect();
    (table.select_rows(&train_rows), table.select_rows(&test_rows))
}

/// Split each user's rows so round(ratio * n) of them land in train
pub fn stratified_split(
    table: &Table,
    ratio: f64,
    col_user: &str,
    seed: u64,
) -> Result<(Table, Table)> {
    check_ratio(ratio)?;
    let users = table.ids(col_user)?;

    let mut order: Vec<&Id> = Vec::new();
    let mut rows_by_user: HashMap<&Id, Vec<usize>> = HashMap::new();
    for (row, user) in users.iter().enumerate() {
        rows_by_user
            .entry(user)
            .or_insert_with(|| {
                order.push(user);
                Vec::new()
            })
            .push(row);
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut train_rows = Vec::with_capacity(table.len());
    for user in order {
        let Some(mut rows) = rows_by_user.remove(user) else {
            continue;
        };
        rows.shuffle(&mut rng);
        let n_train = ((ratio * rows.len() as f64).round() as usize).min(rows.len());
        train_rows.extend_from_slice(&rows[..n_train]);
    }

    Ok(partition(table, train_rows))
}

/// Split rows uniformly at random, ignoring users
pub fn random_split(table: &Table, ratio: f64, seed: u64) -> Result<(Table, Table)> {
    check_ratio(ratio)?;
    let mut rows: Vec<usize> = (0..table.len()).collect();
    rows.shuffle(&mut StdRng::seed_from_u64(seed));
    let n_train = (ratio * rows.len() as f64).round() as usize;
    rows.truncate(n_train);
    Ok(partition(table, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Column;
    use std::collections::HashSet;

    fn ratings() -> Table {
        let users: Vec<Id> = (0..40).map(|r| Id::Int(r % 4)).collect();
        let items: Vec<Id> = (0..40).map(Id::Int).collect();
        Table::new()
            .with_column("userID", Column::Ids(users))
            .unwrap()
            .with_column("itemID", Column::Ids(items))
            .unwrap()
            .with_column("rating", Column::Numbers(vec![3.0; 40]))
            .unwrap()
    }

    #[test]
    fn test_stratified_split_per_user_ratio() {
        let (train, test) = stratified_split(&ratings(), 0.75, "userID", 42).unwrap();
        assert_eq!(train.len() + test.len(), 40);

        let train_users = train.ids("userID").unwrap();
        for user in 0..4 {
            let count = train_users.iter().filter(|u| **u == Id::Int(user)).count();
            // 10 rows each, round(7.5) = 8
            assert_eq!(count, 8);
        }
    }

    #[test]
    fn test_split_is_disjoint_and_ordered() {
        let (train, test) = stratified_split(&ratings(), 0.5, "userID", 7).unwrap();
        let train_items = train.ids("itemID").unwrap();
        let test_items = test.ids("itemID").unwrap();

        let a: HashSet<&Id> = train_items.iter().collect();
        let b: HashSet<&Id> = test_items.iter().collect();
        assert!(a.is_disjoint(&b));
        assert!(train_items.windows(2).all(|w| w[0] < w[1]));
        assert!(test_items.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_same_seed_same_split() {
        let (a, _) = stratified_split(&ratings(), 0.6, "userID", 3).unwrap();
        let (b, _) = stratified_split(&ratings(), 0.6, "userID", 3).unwrap();
        assert_eq!(a.ids("itemID").unwrap(), b.ids("itemID").unwrap());
    }

    #[test]
    fn test_random_split_sizes() {
        let (train, test) = random_split(&ratings(), 0.25, 1).unwrap();
        assert_eq!(train.len(), 10);
        assert_eq!(test.len(), 30);
    }

    #[test]
    fn test_invalid_ratio() {
        for ratio in [0.0, 1.0, -0.5, f64::NAN] {
            let err = stratified_split(&ratings(), ratio, "userID", 0).unwrap_err();
            assert!(matches!(err, Error::Configuration { .. }));
        }
    }
}
