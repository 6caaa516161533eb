//! HTTP API Server for Recommendations
//!
//! Serves precomputed top-K lists from the repository and live scores from
//! the fitted model.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ApiConfig;
use crate::database::RecommendationRepository;
use crate::error::{Error, Result};
use crate::recommendation::Sar;
use crate::table::Id;

/// Shared application state
pub struct AppState {
    pub repository: Arc<dyn RecommendationRepository>,
    pub model: Arc<Sar>,
}

/// Query params for live recommendations
#[derive(Debug, Deserialize)]
pub struct RecommendationsQuery {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_remove_seen")]
    pub remove_seen: bool,
}

fn default_top_k() -> usize {
    10
}

fn default_remove_seen() -> bool {
    true
}

/// Stored recommendation list
#[derive(Debug, Serialize, Deserialize)]
pub struct StoredResponse {
    pub items: Vec<String>,
    pub scores: Vec<f64>,
    pub computed_at: DateTime<Utc>,
}

/// Live recommendation list
#[derive(Debug, Serialize, Deserialize)]
pub struct LiveResponse {
    pub user_id: Id,
    pub items: Vec<ScoredItem>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScoredItem {
    pub item: Id,
    pub score: f64,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub model_fitted: bool,
}

/// Build the router with tracing and CORS layers
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/recommendations", post(get_stored_recommendations))
        .route(
            "/api/v1/recommendations/:user_id",
            get(get_live_recommendations),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// Start the API server
pub async fn start_server(state: Arc<AppState>, config: &ApiConfig) -> anyhow::Result<()> {
    let app = router(state).layer(TimeoutLayer::new(config.request_timeout));

    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting recommendation API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint
async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let (status, label) = match state.repository.health_check().await {
        Ok(()) => (StatusCode::OK, "healthy"),
        Err(e) => {
            warn!("Repository health check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "degraded")
        }
    };

    (
        status,
        Json(HealthResponse {
            status: label.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            model_fitted: state.model.is_fitted(),
        }),
    )
}

/// Stored key for a numeric `user_id`; `42`, `42.0` and `4.2e1` all map to "42"
fn numeric_user_id(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < 9_223_372_036_854_775_808.0 => {
            (f as i64).to_string()
        }
        _ => n.to_string(),
    }
}

/// Look up the precomputed list for `{"user_id": ...}`
async fn get_stored_recommendations(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<Json<StoredResponse>> {
    let user_id = match body.get("user_id") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => numeric_user_id(n),
        Some(_) => return Err(Error::bad_request("user_id must be a string or number")),
        None => return Err(Error::bad_request("missing user_id")),
    };

    let stored = state
        .repository
        .fetch(&user_id)
        .await?
        .ok_or_else(|| Error::not_found("recommendation", user_id))?;

    Ok(Json(StoredResponse {
        items: stored.items,
        scores: stored.scores,
        computed_at: stored.computed_at,
    }))
}

/// Score a user against the fitted model
async fn get_live_recommendations(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(query): Query<RecommendationsQuery>,
) -> Result<Json<LiveResponse>> {
    let user = Id::parse(&user_id);
    let items = state
        .model
        .recommend_for_user(&user, query.top_k, query.remove_seen)?
        .into_iter()
        .map(|rec| ScoredItem {
            item: rec.item,
            score: rec.score,
        })
        .collect();

    Ok(Json(LiveResponse {
        user_id: user,
        items,
    }))
}
