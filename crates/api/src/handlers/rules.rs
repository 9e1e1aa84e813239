use crate::error::{validation_error, ApiResult};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{post, put};
use axum::{Json, Router};
use serde::Deserialize;
use validator::Validate;
use verdict_core::TenantId;
use verdict_engine::{NewRule, Rule};

pub fn rule_routes() -> Router<AppState> {
    Router::new()
        .route("/:tenant_id/rules", post(add_rule).get(list_rules))
        .route("/:tenant_id/rules/:rule_id", put(update_rule).delete(delete_rule))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RuleRequest {
    #[validate(length(min = 1, max = 200))]
    pub id: String,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 1))]
    pub expression: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl RuleRequest {
    fn into_new_rule(self) -> NewRule {
        NewRule {
            id: self.id,
            name: self.name,
            expression: self.expression,
            active: self.active,
        }
    }
}

async fn add_rule(
    State(state): State<AppState>,
    Path(tenant_id): Path<TenantId>,
    Json(request): Json<RuleRequest>,
) -> ApiResult<(StatusCode, Json<Rule>)> {
    request.validate().map_err(validation_error)?;

    let engine = state.manager.get_engine(tenant_id).await?;
    let rule = engine.add_rule(request.into_new_rule()).await?;
    Ok((StatusCode::CREATED, Json(rule)))
}

async fn list_rules(
    State(state): State<AppState>,
    Path(tenant_id): Path<TenantId>,
) -> ApiResult<Json<Vec<Rule>>> {
    let engine = state.manager.get_engine(tenant_id).await?;
    Ok(Json(engine.active_list().await?))
}

async fn update_rule(
    State(state): State<AppState>,
    Path((tenant_id, rule_id)): Path<(TenantId, String)>,
    Json(mut request): Json<RuleRequest>,
) -> ApiResult<Json<Rule>> {
    // the path wins over whatever id the body carries
    request.id = rule_id;
    request.validate().map_err(validation_error)?;

    let engine = state.manager.get_engine(tenant_id).await?;
    let rule = engine.update_rule(request.into_new_rule()).await?;
    Ok(Json(rule))
}

async fn delete_rule(
    State(state): State<AppState>,
    Path((tenant_id, rule_id)): Path<(TenantId, String)>,
) -> ApiResult<StatusCode> {
    let engine = state.manager.get_engine(tenant_id).await?;
    engine.delete_rule(&rule_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
