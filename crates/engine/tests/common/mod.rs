//! In-memory store pair used by the engine and manager tests.
//!
//! Mirrors the semantics of the Postgres stores closely enough to drive
//! the full engine/manager choreography without a database: tenant-keyed
//! tables, uniqueness on rule id and name, active-list ordering by
//! creation instant, and transactional-looking schema rotation. A couple
//! of test hooks are bolted on: a counter for `list_active` calls and a
//! switch that makes rule writes fail.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use verdict_core::{Error, Result, TenantId};
use verdict_engine::model::{NewRule, Rule, Tenant, TenantSnapshot};
use verdict_engine::schema::SchemaDef;
use verdict_engine::store::{RuleStore, TenantStore};

pub struct SchemaRow {
    pub version: i32,
    pub definition: SchemaDef,
    pub active: bool,
}

#[derive(Default)]
pub struct MemoryDb {
    pub tenants: Mutex<HashMap<TenantId, Tenant>>,
    pub schemas: Mutex<HashMap<TenantId, Vec<SchemaRow>>>,
    pub rules: Mutex<HashMap<(TenantId, String), Rule>>,
    seq: AtomicI64,
    pub list_active_calls: AtomicUsize,
    pub fail_rule_writes: AtomicBool,
}

impl MemoryDb {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Strictly increasing creation instants so ordering tests are
    /// deterministic.
    fn next_instant(&self) -> DateTime<Utc> {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        DateTime::from_timestamp(1_700_000_000 + seq, 0).expect("valid timestamp")
    }

    pub fn list_active_calls(&self) -> usize {
        self.list_active_calls.load(Ordering::SeqCst)
    }

    pub fn fail_rule_writes(&self, fail: bool) {
        self.fail_rule_writes.store(fail, Ordering::SeqCst);
    }

    fn check_write_allowed(&self) -> Result<()> {
        if self.fail_rule_writes.load(Ordering::SeqCst) {
            return Err(Error::Internal("injected store failure".to_string()));
        }
        Ok(())
    }
}

pub struct MemoryRuleStore {
    db: Arc<MemoryDb>,
    tenant_id: TenantId,
}

#[async_trait]
impl RuleStore for MemoryRuleStore {
    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    async fn add(&self, rule: &NewRule) -> Result<Rule> {
        self.db.check_write_allowed()?;
        let mut rules = self.db.rules.lock();

        let key = (self.tenant_id, rule.id.clone());
        if rules.contains_key(&key) {
            return Err(Error::RuleAlreadyExists {
                id: rule.id.clone(),
            });
        }
        if rules
            .iter()
            .any(|((t, _), r)| *t == self.tenant_id && r.name == rule.name)
        {
            return Err(Error::RuleAlreadyExists {
                id: rule.id.clone(),
            });
        }

        let now = self.db.next_instant();
        let stored = Rule {
            id: rule.id.clone(),
            tenant_id: self.tenant_id,
            name: rule.name.clone(),
            expression: rule.expression.clone(),
            active: rule.active,
            created_at: now,
            updated_at: now,
        };
        rules.insert(key, stored.clone());
        Ok(stored)
    }

    async fn get(&self, id: &str) -> Result<Rule> {
        self.db
            .rules
            .lock()
            .get(&(self.tenant_id, id.to_string()))
            .cloned()
            .ok_or_else(|| Error::RuleNotFound { id: id.to_string() })
    }

    async fn list_active(&self) -> Result<Vec<Rule>> {
        self.db.list_active_calls.fetch_add(1, Ordering::SeqCst);
        let rules = self.db.rules.lock();
        let mut active: Vec<Rule> = rules
            .values()
            .filter(|r| r.tenant_id == self.tenant_id && r.active)
            .cloned()
            .collect();
        active.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(active)
    }

    async fn update(&self, rule: &NewRule) -> Result<Rule> {
        self.db.check_write_allowed()?;
        let mut rules = self.db.rules.lock();
        let key = (self.tenant_id, rule.id.clone());

        let existing = rules
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::RuleNotFound {
                id: rule.id.clone(),
            })?;

        let updated = Rule {
            id: rule.id.clone(),
            tenant_id: self.tenant_id,
            name: rule.name.clone(),
            expression: rule.expression.clone(),
            active: rule.active,
            created_at: existing.created_at,
            updated_at: self.db.next_instant(),
        };
        rules.insert(key, updated.clone());
        Ok(updated)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.db.check_write_allowed()?;
        self.db
            .rules
            .lock()
            .remove(&(self.tenant_id, id.to_string()))
            .map(|_| ())
            .ok_or_else(|| Error::RuleNotFound { id: id.to_string() })
    }
}

pub struct MemoryTenantStore {
    db: Arc<MemoryDb>,
}

impl MemoryTenantStore {
    pub fn new(db: Arc<MemoryDb>) -> Arc<Self> {
        Arc::new(Self { db })
    }
}

#[async_trait]
impl TenantStore for MemoryTenantStore {
    async fn load_tenants(&self) -> Result<Vec<TenantSnapshot>> {
        let tenants = self.db.tenants.lock();
        let schemas = self.db.schemas.lock();

        let mut snapshots: Vec<TenantSnapshot> = tenants
            .values()
            .map(|tenant| TenantSnapshot {
                tenant: tenant.clone(),
                schema: schemas
                    .get(&tenant.id)
                    .and_then(|rows| rows.iter().find(|r| r.active))
                    .map(|r| r.definition.clone()),
            })
            .collect();
        snapshots.sort_by_key(|s| s.tenant.created_at);
        Ok(snapshots)
    }

    async fn create_tenant(&self, id: TenantId, name: &str, schema: &SchemaDef) -> Result<Tenant> {
        let now = self.db.next_instant();
        let tenant = Tenant {
            id,
            name: name.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.db.tenants.lock().insert(id, tenant.clone());
        self.db.schemas.lock().insert(
            id,
            vec![SchemaRow {
                version: 1,
                definition: schema.clone(),
                active: true,
            }],
        );
        Ok(tenant)
    }

    async fn rotate_schema(&self, tenant: TenantId, schema: &SchemaDef) -> Result<i32> {
        if !self.db.tenants.lock().contains_key(&tenant) {
            return Err(Error::Internal(
                "schema insert violates tenant foreign key".to_string(),
            ));
        }

        let mut schemas = self.db.schemas.lock();
        let rows = schemas.entry(tenant).or_default();
        for row in rows.iter_mut() {
            row.active = false;
        }
        let version = rows.iter().map(|r| r.version).max().unwrap_or(0) + 1;
        rows.push(SchemaRow {
            version,
            definition: schema.clone(),
            active: true,
        });
        Ok(version)
    }

    async fn delete_tenant(&self, tenant: TenantId) -> Result<()> {
        self.db
            .tenants
            .lock()
            .remove(&tenant)
            .ok_or(Error::TenantNotFound { id: tenant })?;
        self.db.schemas.lock().remove(&tenant);
        self.db
            .rules
            .lock()
            .retain(|(t, _), _| *t != tenant);
        Ok(())
    }

    fn rule_store(&self, tenant: TenantId) -> Arc<dyn RuleStore> {
        Arc::new(MemoryRuleStore {
            db: self.db.clone(),
            tenant_id: tenant,
        })
    }
}

pub fn schema(json: &str) -> SchemaDef {
    serde_json::from_str(json).expect("valid schema json")
}

pub fn user_schema() -> SchemaDef {
    schema(r#"{"User":{"Age":"int"}}"#)
}

pub fn new_rule(id: &str, name: &str, expression: &str) -> NewRule {
    NewRule {
        id: id.to_string(),
        name: name.to_string(),
        expression: expression.to_string(),
        active: true,
    }
}
