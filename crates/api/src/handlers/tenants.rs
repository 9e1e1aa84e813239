use crate::error::{validation_error, ApiResult};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use validator::Validate;
use verdict_core::TenantId;
use verdict_engine::store::TenantStore;
use verdict_engine::SchemaDef;

pub fn tenant_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_tenant).get(list_tenants))
        .route("/:tenant_id/schema", put(update_schema))
        .route("/:tenant_id", delete(delete_tenant))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateTenantRequest {
    /// Caller-assigned id; generated when omitted.
    pub id: Option<TenantId>,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub schema: SchemaDef,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantCreatedResponse {
    pub id: TenantId,
    pub name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaUpdatedResponse {
    pub version: i32,
    pub skipped: Vec<SkippedRule>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedRule {
    pub rule_id: String,
    pub name: String,
    pub error: String,
}

async fn create_tenant(
    State(state): State<AppState>,
    Json(request): Json<CreateTenantRequest>,
) -> ApiResult<(StatusCode, Json<TenantCreatedResponse>)> {
    request.validate().map_err(validation_error)?;
    // validate before any row is written
    request.schema.validate()?;

    let tenant_id = request.id.unwrap_or_default();
    let tenant = state
        .store
        .create_tenant(tenant_id, &request.name, &request.schema)
        .await?;
    state.manager.create_tenant(tenant_id, &request.schema).await?;

    Ok((
        StatusCode::CREATED,
        Json(TenantCreatedResponse {
            id: tenant.id,
            name: tenant.name,
        }),
    ))
}

async fn list_tenants(State(state): State<AppState>) -> Json<Vec<TenantId>> {
    let mut tenants = state.manager.list_tenants().await;
    tenants.sort_by_key(|t| t.0);
    Json(tenants)
}

async fn update_schema(
    State(state): State<AppState>,
    Path(tenant_id): Path<TenantId>,
    Json(schema): Json<SchemaDef>,
) -> ApiResult<Json<SchemaUpdatedResponse>> {
    let update = state.manager.update_tenant_schema(tenant_id, &schema).await?;

    Ok(Json(SchemaUpdatedResponse {
        version: update.version,
        skipped: update
            .skipped
            .into_iter()
            .map(|f| SkippedRule {
                rule_id: f.rule_id,
                name: f.name,
                error: f.error,
            })
            .collect(),
    }))
}

async fn delete_tenant(
    State(state): State<AppState>,
    Path(tenant_id): Path<TenantId>,
) -> ApiResult<StatusCode> {
    // the row is the source of truth; deletion cascades to schemas/rules
    state.store.delete_tenant(tenant_id).await?;

    // engine removal is best-effort: the tenant may never have been loaded
    if let Err(e) = state.manager.delete_tenant(tenant_id).await {
        if !e.is_not_found() {
            return Err(e.into());
        }
    }

    Ok(StatusCode::NO_CONTENT)
}
