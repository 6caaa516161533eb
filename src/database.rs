//! Recommendation storage
//!
//! Precomputed top-K lists are written by the batch job and read by the API
//! through [`RecommendationRepository`]. Two implementations:
//! - [`Database`]: PostgreSQL via an sqlx pool, with migrations
//! - [`InMemoryRepository`]: a map behind a lock, used when no database is
//!   configured and in tests

use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{ConnectOptions, Row};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

/// One user's stored recommendation list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecommendation {
    pub user_id: String,
    pub items: Vec<String>,
    pub scores: Vec<f64>,
    pub computed_at: DateTime<Utc>,
}

/// Storage for precomputed recommendations
#[async_trait]
pub trait RecommendationRepository: Send + Sync {
    /// Stored list for `user_id`, if any
    async fn fetch(&self, user_id: &str) -> Result<Option<StoredRecommendation>>;

    /// Insert or replace rows, returning how many were written
    async fn store(&self, rows: &[StoredRecommendation]) -> Result<u64>;

    /// Delete rows computed before `older_than`, returning how many were removed
    async fn prune(&self, older_than: DateTime<Utc>) -> Result<u64>;

    /// Check the backing store is reachable
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// Database connection pool
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool
    #[instrument(skip(config))]
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = create_pool(config).await?;
        Ok(Self { pool })
    }

    /// Get reference to the underlying pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Close all connections gracefully
    pub async fn close(&self) {
        info!("Closing database connection pool...");
        self.pool.close().await;
        info!("Database connection pool closed");
    }
}

#[async_trait]
impl RecommendationRepository for Database {
    #[instrument(skip(self))]
    async fn fetch(&self, user_id: &str) -> Result<Option<StoredRecommendation>> {
        let row = sqlx::query(
            "SELECT user_id, items, scores, computed_at FROM recommendations WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<StoredRecommendation> {
            let Json(items): Json<Vec<String>> = row.try_get("items")?;
            let Json(scores): Json<Vec<f64>> = row.try_get("scores")?;
            Ok(StoredRecommendation {
                user_id: row.try_get("user_id")?,
                items,
                scores,
                computed_at: row.try_get("computed_at")?,
            })
        })
        .transpose()
    }

    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    async fn store(&self, rows: &[StoredRecommendation]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut written = 0;

        for row in rows {
            let result = sqlx::query(
                r#"
                INSERT INTO recommendations (user_id, items, scores, computed_at)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (user_id) DO UPDATE
                SET items = EXCLUDED.items,
                    scores = EXCLUDED.scores,
                    computed_at = EXCLUDED.computed_at
                "#,
            )
            .bind(&row.user_id)
            .bind(Json(&row.items))
            .bind(Json(&row.scores))
            .bind(row.computed_at)
            .execute(&mut *tx)
            .await?;
            written += result.rows_affected();
        }

        tx.commit().await?;
        debug!("Stored {} recommendation rows", written);
        Ok(written)
    }

    #[instrument(skip(self))]
    async fn prune(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM recommendations WHERE computed_at < $1")
            .bind(older_than)
            .execute(&self.pool)
            .await?;
        debug!("Pruned {} stale recommendation rows", result.rows_affected());
        Ok(result.rows_affected())
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Error::Database {
                message: format!("Health check failed: {}", e).into(),
                source: Some(e),
            })?;
        Ok(())
    }
}

/// Repository kept in process memory
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    rows: RwLock<HashMap<String, StoredRecommendation>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

#[async_trait]
impl RecommendationRepository for InMemoryRepository {
    async fn fetch(&self, user_id: &str) -> Result<Option<StoredRecommendation>> {
        Ok(self.rows.read().await.get(user_id).cloned())
    }

    async fn store(&self, rows: &[StoredRecommendation]) -> Result<u64> {
        let mut stored = self.rows.write().await;
        for row in rows {
            stored.insert(row.user_id.clone(), row.clone());
        }
        Ok(rows.len() as u64)
    }

    async fn prune(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let mut stored = self.rows.write().await;
        let before = stored.len();
        stored.retain(|_, row| row.computed_at >= older_than);
        Ok((before - stored.len()) as u64)
    }
}

/// Create a connection pool with the given configuration
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool> {
    info!("Creating database connection pool...");
    debug!(
        "Pool config: max={}, min={}, connect_timeout={:?}",
        config.max_connections, config.min_connections, config.connect_timeout
    );

    let mut connect_options =
        PgConnectOptions::from_str(&config.url).map_err(|e| Error::InvalidConfig {
            key: "DATABASE_URL",
            message: format!("Invalid database URL: {}", e).into(),
        })?;

    connect_options = connect_options.statement_cache_capacity(config.statement_cache_size);
    connect_options = connect_options.log_statements(log::LevelFilter::Debug);
    connect_options =
        connect_options.log_slow_statements(log::LevelFilter::Warn, Duration::from_secs(1));

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.connect_timeout)
        .idle_timeout(Some(config.idle_timeout))
        .max_lifetime(Some(config.max_lifetime))
        .connect_with(connect_options)
        .await
        .map_err(|e| Error::Database {
            message: format!("Failed to create connection pool: {}", e).into(),
            source: Some(e),
        })?;

    // Verify we can connect
    sqlx::query("SELECT 1").fetch_one(&pool).await.map_err(|e| {
        Error::Database {
            message: format!("Failed to verify database connection: {}", e).into(),
            source: Some(e),
        }
    })?;

    info!(
        "Database connection pool created (size: {}, idle: {})",
        pool.size(),
        pool.num_idle()
    );

    Ok(pool)
}

/// Run database migrations
#[instrument(skip(pool))]
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    info!("Running database migrations...");

    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| Error::Migration(e.to_string()))?;

    info!("Database migrations completed successfully");
    Ok(())
}
