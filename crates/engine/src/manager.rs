//! Tenant lifecycle and engine dispatch.
//!
//! The [`TenantManager`] owns one [`Engine`] per tenant behind a
//! read-write lock. Lookups clone the engine's shared handle out of the
//! map, so evaluations run without holding the manager lock and a schema
//! update can swap the map entry underneath them: in-flight evaluations
//! finish against the engine they started with, later lookups see the
//! replacement, and the old engine is reclaimed when the last handle drops.
//!
//! Lock order is always manager → engine; nothing here acquires the
//! manager lock while holding an engine lock.

use crate::engine::{CompileFailure, Engine};
use crate::env::ExprEnv;
use crate::schema::SchemaDef;
use crate::store::TenantStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use verdict_core::metrics::EngineMetrics;
use verdict_core::{Error, Result, TenantId};

/// Outcome of a schema update.
#[derive(Debug)]
pub struct SchemaUpdate {
    /// The newly active schema version.
    pub version: i32,
    /// Rules that no longer compile under the new schema. The swap
    /// completed; these rules stay uncompiled until they are fixed.
    pub skipped: Vec<CompileFailure>,
}

pub struct TenantManager {
    store: Arc<dyn TenantStore>,
    engines: RwLock<HashMap<TenantId, Arc<Engine>>>,
}

impl TenantManager {
    pub fn new(store: Arc<dyn TenantStore>) -> Self {
        Self {
            store,
            engines: RwLock::new(HashMap::new()),
        }
    }

    /// Build an engine for every stored tenant. Called once at process
    /// start; a rule set that fails to compile is fatal here.
    ///
    /// Stored schemas that would fail today's validator are loaded anyway
    /// (with a warning) so tightening the validation rules cannot brick
    /// existing tenants.
    pub async fn load_all_tenants(&self) -> Result<usize> {
        let snapshots = self.store.load_tenants().await?;
        let mut engines = self.engines.write().await;

        for snapshot in snapshots {
            let tenant_id = snapshot.tenant.id;
            let schema = snapshot.schema.unwrap_or_default();
            if let Err(e) = schema.validate() {
                warn!(tenant = %tenant_id, "stored schema fails validation, loading anyway: {}", e);
            }

            let env = ExprEnv::new(&schema);
            let engine = Engine::new(env, self.store.rule_store(tenant_id)).await?;
            engines.insert(tenant_id, Arc::new(engine));
        }

        info!(tenants = engines.len(), "tenant engines loaded");
        Ok(engines.len())
    }

    /// Register an engine for a new tenant.
    ///
    /// In-memory only: the tenant row (and its initial schema row) are the
    /// caller's responsibility and must exist before rules are written.
    pub async fn create_tenant(&self, tenant: TenantId, schema: &SchemaDef) -> Result<()> {
        schema.validate()?;

        let mut engines = self.engines.write().await;
        let env = ExprEnv::new(schema);
        let engine = Engine::new(env, self.store.rule_store(tenant)).await?;
        engines.insert(tenant, Arc::new(engine));
        Ok(())
    }

    /// Shared handle to a tenant's engine.
    pub async fn get_engine(&self, tenant: TenantId) -> Result<Arc<Engine>> {
        self.engines
            .read()
            .await
            .get(&tenant)
            .cloned()
            .ok_or(Error::TenantNotFound { id: tenant })
    }

    /// Snapshot of the loaded tenant ids.
    pub async fn list_tenants(&self) -> Vec<TenantId> {
        self.engines.read().await.keys().copied().collect()
    }

    /// Replace a tenant's schema and swap in a freshly built engine.
    ///
    /// The write lock is held from entry to the map swap, covering the
    /// schema-row rotation and the rebuild compile phase — schema updates
    /// are rare and this keeps the missing-engine case on the same locked
    /// path instead of re-entering through tenant creation. Readers only
    /// wait out the swap itself; engines already handed out keep serving.
    pub async fn update_tenant_schema(
        &self,
        tenant: TenantId,
        schema: &SchemaDef,
    ) -> Result<SchemaUpdate> {
        schema.validate()?;

        let mut engines = self.engines.write().await;

        let version = self.store.rotate_schema(tenant, schema).await?;

        let env = ExprEnv::new(schema);
        let (engine, skipped) = Engine::rebuild(env, self.store.rule_store(tenant)).await?;
        for failure in &skipped {
            warn!(
                tenant = %tenant,
                rule = %failure.rule_id,
                "rule no longer compiles under schema v{}: {}",
                version,
                failure.error
            );
        }

        engines.insert(tenant, Arc::new(engine));
        EngineMetrics::global().engine_swaps_total.inc();
        info!(tenant = %tenant, version, "tenant engine swapped");

        Ok(SchemaUpdate { version, skipped })
    }

    /// Drop a tenant's engine. The database rows are the caller's concern
    /// (deleting the tenant row cascades to its schemas and rules).
    pub async fn delete_tenant(&self, tenant: TenantId) -> Result<()> {
        self.engines
            .write()
            .await
            .remove(&tenant)
            .map(|_| ())
            .ok_or(Error::TenantNotFound { id: tenant })
    }
}
