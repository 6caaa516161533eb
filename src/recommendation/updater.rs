//! Batch recommendation job
//!
//! Loads the interactions file, refits the shared model and stores the top-K
//! list of every training user in the repository. Rows left over from earlier
//! runs are then deleted. Fitting and scoring are CPU bound and run on the
//! blocking pool.

use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use tracing::{info, instrument, warn};

use super::engine::Sar;
use super::metrics::FitSummary;
use crate::config::BatchConfig;
use crate::database::{RecommendationRepository, StoredRecommendation};
use crate::datasets::movielens;
use crate::error::{Error, Result};
use crate::table::Table;

/// Rows written per repository call
const STORE_CHUNK_SIZE: usize = 1_000;

/// Outcome of one batch run
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub fit: FitSummary,
    pub users: usize,
    pub rows_written: u64,
    pub rows_pruned: u64,
}

/// Refit `model` from the configured file and store fresh recommendations
#[instrument(skip_all, fields(path))]
pub async fn update_all_recommendations(
    model: Arc<Sar>,
    repository: &dyn RecommendationRepository,
    batch: &BatchConfig,
) -> Result<BatchReport> {
    let path = batch
        .interactions_path
        .clone()
        .ok_or_else(|| Error::configuration("BATCH_INTERACTIONS_PATH is not set"))?;
    tracing::Span::current().record("path", tracing::field::display(path.display()));

    let columns = model.config().columns().clone();
    let separator = batch.separator.clone();
    let interactions = tokio::task::spawn_blocking(move || {
        let header = [
            columns.col_user.as_str(),
            columns.col_item.as_str(),
            columns.col_rating.as_str(),
            columns.col_timestamp.as_str(),
        ];
        movielens::load_ratings_with(&path, &header, &separator)
    })
    .await??;

    let top_k = batch.top_k;
    let remove_seen = batch.remove_seen;
    let fit_model = model.clone();
    let (fit, recommendations) = tokio::task::spawn_blocking(move || {
        let fit = fit_model.fit(&interactions)?;
        let recommendations = fit_model.recommend_k_items(&interactions, top_k, remove_seen)?;
        Ok::<_, Error>((fit, recommendations))
    })
    .await??;

    // Postgres keeps microseconds
    let computed_at = Utc::now().trunc_subsecs(6);
    let rows = to_stored_rows(&recommendations, &model, computed_at)?;
    let users = rows.len();

    let mut rows_written = 0;
    for chunk in rows.chunks(STORE_CHUNK_SIZE) {
        rows_written += repository.store(chunk).await?;
    }

    if rows_written < users as u64 {
        warn!("Only {}/{} users were written", rows_written, users);
    }
    let rows_pruned = repository.prune(computed_at).await?;
    if rows_pruned > 0 {
        info!("Removed {} stale recommendation rows", rows_pruned);
    }
    info!(
        "Recommendations updated for {} users (top {}, {} items in model)",
        users, top_k, fit.n_items
    );

    Ok(BatchReport {
        fit,
        users,
        rows_written,
        rows_pruned,
    })
}

/// Group a recommendation table into one stored row per user
///
/// Rows of one user are contiguous and already ranked.
fn to_stored_rows(
    recommendations: &Table,
    model: &Sar,
    computed_at: DateTime<Utc>,
) -> Result<Vec<StoredRecommendation>> {
    let config = model.config();
    let users = recommendations.ids(config.col_user())?;
    let items = recommendations.ids(config.col_item())?;
    let scores = recommendations.numbers(config.col_prediction())?;

    let mut rows: Vec<StoredRecommendation> = Vec::new();
    for ((user, item), &score) in users.iter().zip(items.iter()).zip(scores.iter()) {
        let user_id = user.to_string();
        match rows.last_mut() {
            Some(last) if last.user_id == user_id => {
                last.items.push(item.to_string());
                last.scores.push(score);
            }
            _ => rows.push(StoredRecommendation {
                user_id,
                items: vec![item.to_string()],
                scores: vec![score],
                computed_at,
            }),
        }
    }

    Ok(rows)
}
