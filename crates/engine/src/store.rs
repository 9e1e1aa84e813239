//! Persistent stores.
//!
//! [`RuleStore`] is tenant-scoped: a handle is constructed for exactly one
//! tenant and every statement it emits filters on that tenant's id, so no
//! query can ever touch another tenant's rows. [`TenantStore`] covers the
//! tenant/schema tables and hands out rule-store handles.
//!
//! All statements use parameter binding; backing-store failures are wrapped
//! with the operation that issued them.

use crate::model::{NewRule, Rule, Tenant, TenantSnapshot};
use crate::schema::SchemaDef;
use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use std::sync::Arc;
use verdict_core::{Error, Result, TenantId};

/// Durable rule storage for exactly one tenant.
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// The tenant this store is scoped to.
    fn tenant_id(&self) -> TenantId;

    /// Insert a rule. Fails with `RuleAlreadyExists` when the id or the
    /// name is already taken within this tenant.
    async fn add(&self, rule: &NewRule) -> Result<Rule>;

    /// Fetch a rule by id. Fails with `RuleNotFound` when absent for this
    /// tenant, including when the id exists under another tenant.
    async fn get(&self, id: &str) -> Result<Rule>;

    /// The tenant's active rules in ascending `created_at` order (ties
    /// broken by id). This is the evaluation order of evaluate-all.
    async fn list_active(&self) -> Result<Vec<Rule>>;

    /// Update a rule, preserving `created_at` and refreshing `updated_at`.
    /// Fails with `RuleNotFound` when the row is absent or vanished.
    async fn update(&self, rule: &NewRule) -> Result<Rule>;

    /// Delete a rule. Fails with `RuleNotFound` when absent for this tenant.
    async fn delete(&self, id: &str) -> Result<()>;
}

/// Tenant and schema persistence.
#[async_trait]
pub trait TenantStore: Send + Sync {
    /// All tenants joined with their active schemas, in one query.
    async fn load_tenants(&self) -> Result<Vec<TenantSnapshot>>;

    /// Insert a tenant row together with its version-1 active schema row,
    /// in one transaction.
    async fn create_tenant(&self, id: TenantId, name: &str, schema: &SchemaDef) -> Result<Tenant>;

    /// Deactivate every schema row of the tenant and insert the next
    /// version as active, in one transaction. Returns the new version.
    async fn rotate_schema(&self, tenant: TenantId, schema: &SchemaDef) -> Result<i32>;

    /// Delete the tenant row; schemas and rules go with it (cascade).
    async fn delete_tenant(&self, tenant: TenantId) -> Result<()>;

    /// A rule store scoped to the given tenant.
    fn rule_store(&self, tenant: TenantId) -> Arc<dyn RuleStore>;
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false)
}

/// PostgreSQL-backed [`RuleStore`].
pub struct PgRuleStore {
    pool: PgPool,
    tenant_id: TenantId,
}

impl PgRuleStore {
    pub fn new(pool: PgPool, tenant_id: TenantId) -> Self {
        Self { pool, tenant_id }
    }
}

#[async_trait]
impl RuleStore for PgRuleStore {
    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    async fn add(&self, rule: &NewRule) -> Result<Rule> {
        sqlx::query_as::<_, Rule>(
            "INSERT INTO rules (id, tenant_id, name, expression, active)
             VALUES ($1, $2, $3, $4, $5) RETURNING *",
        )
        .bind(&rule.id)
        .bind(self.tenant_id)
        .bind(&rule.name)
        .bind(&rule.expression)
        .bind(rule.active)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                Error::RuleAlreadyExists {
                    id: rule.id.clone(),
                }
            } else {
                Error::store("insert rule")(e)
            }
        })
    }

    async fn get(&self, id: &str) -> Result<Rule> {
        sqlx::query_as::<_, Rule>("SELECT * FROM rules WHERE id = $1 AND tenant_id = $2")
            .bind(id)
            .bind(self.tenant_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::store("fetch rule"))?
            .ok_or_else(|| Error::RuleNotFound { id: id.to_string() })
    }

    async fn list_active(&self) -> Result<Vec<Rule>> {
        sqlx::query_as::<_, Rule>(
            "SELECT * FROM rules WHERE tenant_id = $1 AND active
             ORDER BY created_at ASC, id ASC",
        )
        .bind(self.tenant_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::store("list active rules"))
    }

    async fn update(&self, rule: &NewRule) -> Result<Rule> {
        // Existence check first so an unknown id reports NotFound instead
        // of a silent no-op; created_at is untouched by the UPDATE.
        self.get(&rule.id).await?;

        sqlx::query_as::<_, Rule>(
            "UPDATE rules SET name = $1, expression = $2, active = $3, updated_at = now()
             WHERE id = $4 AND tenant_id = $5 RETURNING *",
        )
        .bind(&rule.name)
        .bind(&rule.expression)
        .bind(rule.active)
        .bind(&rule.id)
        .bind(self.tenant_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                Error::RuleAlreadyExists {
                    id: rule.id.clone(),
                }
            } else {
                Error::store("update rule")(e)
            }
        })?
        // the row can vanish between the check and the update
        .ok_or_else(|| Error::RuleNotFound {
            id: rule.id.clone(),
        })
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM rules WHERE id = $1 AND tenant_id = $2")
            .bind(id)
            .bind(self.tenant_id)
            .execute(&self.pool)
            .await
            .map_err(Error::store("delete rule"))?;

        if result.rows_affected() == 0 {
            return Err(Error::RuleNotFound { id: id.to_string() });
        }
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct TenantSchemaRow {
    id: TenantId,
    name: String,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
    definition: Option<Json<SchemaDef>>,
}

/// PostgreSQL-backed [`TenantStore`].
#[derive(Clone)]
pub struct PgTenantStore {
    pool: PgPool,
}

impl PgTenantStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl TenantStore for PgTenantStore {
    async fn load_tenants(&self) -> Result<Vec<TenantSnapshot>> {
        let rows = sqlx::query_as::<_, TenantSchemaRow>(
            "SELECT t.id, t.name, t.created_at, t.updated_at, s.definition
             FROM tenants t
             LEFT JOIN schemas s ON s.tenant_id = t.id AND s.active
             ORDER BY t.created_at ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::store("load tenants"))?;

        Ok(rows
            .into_iter()
            .map(|row| TenantSnapshot {
                tenant: Tenant {
                    id: row.id,
                    name: row.name,
                    created_at: row.created_at,
                    updated_at: row.updated_at,
                },
                schema: row.definition.map(|json| json.0),
            })
            .collect())
    }

    async fn create_tenant(&self, id: TenantId, name: &str, schema: &SchemaDef) -> Result<Tenant> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(Error::store("begin tenant creation"))?;

        let tenant = sqlx::query_as::<_, Tenant>(
            "INSERT INTO tenants (id, name) VALUES ($1, $2) RETURNING *",
        )
        .bind(id)
        .bind(name)
        .fetch_one(&mut *tx)
        .await
        .map_err(Error::store("insert tenant"))?;

        sqlx::query(
            "INSERT INTO schemas (tenant_id, version, definition, active)
             VALUES ($1, 1, $2, true)",
        )
        .bind(id)
        .bind(Json(schema))
        .execute(&mut *tx)
        .await
        .map_err(Error::store("insert initial schema"))?;

        tx.commit()
            .await
            .map_err(Error::store("commit tenant creation"))?;

        Ok(tenant)
    }

    async fn rotate_schema(&self, tenant: TenantId, schema: &SchemaDef) -> Result<i32> {
        // Deactivate and insert under one transaction so a crash cannot
        // leave the tenant without an active schema.
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(Error::store("begin schema rotation"))?;

        sqlx::query("UPDATE schemas SET active = false WHERE tenant_id = $1")
            .bind(tenant)
            .execute(&mut *tx)
            .await
            .map_err(Error::store("deactivate schemas"))?;

        let version: i32 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(version), 0) + 1 FROM schemas WHERE tenant_id = $1",
        )
        .bind(tenant)
        .fetch_one(&mut *tx)
        .await
        .map_err(Error::store("next schema version"))?;

        sqlx::query(
            "INSERT INTO schemas (tenant_id, version, definition, active)
             VALUES ($1, $2, $3, true)",
        )
        .bind(tenant)
        .bind(version)
        .bind(Json(schema))
        .execute(&mut *tx)
        .await
        .map_err(Error::store("insert schema"))?;

        tx.commit()
            .await
            .map_err(Error::store("commit schema rotation"))?;

        Ok(version)
    }

    async fn delete_tenant(&self, tenant: TenantId) -> Result<()> {
        let result = sqlx::query("DELETE FROM tenants WHERE id = $1")
            .bind(tenant)
            .execute(&self.pool)
            .await
            .map_err(Error::store("delete tenant"))?;

        if result.rows_affected() == 0 {
            return Err(Error::TenantNotFound { id: tenant });
        }
        Ok(())
    }

    fn rule_store(&self, tenant: TenantId) -> Arc<dyn RuleStore> {
        Arc::new(PgRuleStore::new(self.pool.clone(), tenant))
    }
}
