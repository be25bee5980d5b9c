//! Axum HTTP server: selectivity estimates over one loaded dataset.
//!
//! The dataset is loaded once at startup and shared as `Arc<Dataset>`.
//! Every request compiles its own plan; nothing is cached between requests.
//! Requests asking for more than `max_trials` trials are rejected with 400
//! before any work starts.
//!
//! ## Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | `/health` | Health check |
//! | GET | `/columns` | Column names, distinct-value counts, row count |
//! | POST | `/estimate` | Run the estimator for one query |

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, warn};

use crate::config::EstimatorConfig;
use crate::dataset::Dataset;
use crate::error::EstimateError;
use crate::estimator::{check_trial_limit, Estimate, Estimator};
use crate::query::QueryRanges;

#[derive(Clone)]
pub struct AppState {
    dataset: Arc<Dataset>,
    max_trials: usize,
}

type ApiError = (StatusCode, Json<serde_json::Value>);

pub fn create_router(dataset: Arc<Dataset>, max_trials: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health_check))
        .route("/columns", get(handle_get_columns))
        .route("/estimate", post(handle_estimate))
        .layer(cors)
        .with_state(AppState {
            dataset,
            max_trials,
        })
}

// ── Request types ───────────────────────────────────────────────────

#[derive(Deserialize)]
struct EstimateRequest {
    order: Vec<String>,
    ranges: QueryRanges,
    #[serde(flatten)]
    config: EstimatorConfig,
}

fn error_response(status: StatusCode, msg: &str) -> ApiError {
    (status, Json(serde_json::json!({ "error": msg })))
}

fn validation_error(err: &EstimateError) -> ApiError {
    let (status, mut body) = error_response(StatusCode::BAD_REQUEST, &err.to_string());
    if let Some(attribute) = err.attribute() {
        body.0["attribute"] = serde_json::json!(attribute);
    }
    (status, body)
}

// ── GET handlers ────────────────────────────────────────────────────

async fn handle_health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "OK" }))
}

async fn handle_get_columns(State(state): State<AppState>) -> Json<serde_json::Value> {
    let dataset = &state.dataset;
    let columns: Vec<serde_json::Value> = dataset
        .columns()
        .iter()
        .map(|c| {
            serde_json::json!({
                "name": c.name(),
                "cardinality": c.cardinality(),
            })
        })
        .collect();
    Json(serde_json::json!({
        "rows": dataset.num_rows(),
        "columns": columns,
    }))
}

// ── POST handler ────────────────────────────────────────────────────

async fn handle_estimate(
    State(state): State<AppState>,
    Json(req): Json<EstimateRequest>,
) -> Result<Json<Estimate>, ApiError> {
    debug!(attributes = req.order.len(), trials = req.config.trials, "estimate request");
    if let Err(err) = check_trial_limit(req.config.trials, state.max_trials) {
        warn!(trials = req.config.trials, max = state.max_trials, "trial count rejected");
        return Err(validation_error(&err));
    }

    let dataset = state.dataset;
    let result = tokio::task::spawn_blocking(move || {
        let estimator = Estimator::new(&dataset, req.order.as_slice(), &req.ranges)?;
        estimator.run(&req.config)
    })
    .await
    .map_err(|e| {
        warn!(error = %e, "estimate task failed");
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "estimate task failed")
    })?;

    match result {
        Ok(estimate) => Ok(Json(estimate)),
        Err(err) => Err(validation_error(&err)),
    }
}
