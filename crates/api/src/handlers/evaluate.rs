use crate::error::ApiResult;
use crate::state::AppState;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use std::time::Instant;
use verdict_core::Error;
use verdict_engine::{EvaluationRequest, EvaluationResponse};

pub fn evaluate_routes() -> Router<AppState> {
    Router::new().route("/", post(evaluate))
}

/// The evaluate verb: named rules when the request lists them, every
/// active rule (in stored order) otherwise. Per-rule failures ride along
/// inside the results; the request only fails outright when the tenant is
/// unknown or the store read behind a cold cache fails.
async fn evaluate(
    State(state): State<AppState>,
    Json(request): Json<EvaluationRequest>,
) -> ApiResult<Json<EvaluationResponse>> {
    if !request.facts.is_object() {
        return Err(Error::InvalidInput(
            "facts must be an object mapping object names to field values".to_string(),
        )
        .into());
    }

    let engine = state.manager.get_engine(request.tenant_id).await?;

    let started = Instant::now();
    let results = if request.rules.is_empty() {
        engine.evaluate_all(&request.facts).await?
    } else {
        let mut results = Vec::with_capacity(request.rules.len());
        for rule_id in &request.rules {
            results.push(engine.evaluate(rule_id, &request.facts).await?);
        }
        results
    };

    Ok(Json(EvaluationResponse {
        results,
        evaluation_time: format!("{:?}", started.elapsed()),
    }))
}
