mod common;

use common::{new_rule, schema, user_schema, MemoryDb, MemoryTenantStore};
use serde_json::json;
use std::sync::Arc;
use verdict_core::{Error, TenantId};
use verdict_engine::store::{RuleStore, TenantStore};
use verdict_engine::TenantManager;

/// Tenant row + v1 schema row + manager registration, the way the HTTP
/// glue wires it up.
async fn provision(
    manager: &TenantManager,
    store: &Arc<MemoryTenantStore>,
    name: &str,
    schema: &verdict_engine::SchemaDef,
) -> TenantId {
    let tenant = TenantId::new();
    store.create_tenant(tenant, name, schema).await.unwrap();
    manager.create_tenant(tenant, schema).await.unwrap();
    tenant
}

#[tokio::test]
async fn create_and_get_engine() {
    let db = MemoryDb::new();
    let store = MemoryTenantStore::new(db.clone());
    let manager = TenantManager::new(store.clone());

    let tenant = provision(&manager, &store, "acme", &user_schema()).await;

    let engine = manager.get_engine(tenant).await.unwrap();
    assert_eq!(engine.program_count(), 0);
    assert_eq!(manager.list_tenants().await, vec![tenant]);
}

#[tokio::test]
async fn get_engine_unknown_tenant_is_not_found() {
    let db = MemoryDb::new();
    let manager = TenantManager::new(MemoryTenantStore::new(db));

    let err = manager.get_engine(TenantId::new()).await.unwrap_err();
    assert!(matches!(err, Error::TenantNotFound { .. }));
}

#[tokio::test]
async fn create_tenant_rejects_invalid_schema() {
    let db = MemoryDb::new();
    let manager = TenantManager::new(MemoryTenantStore::new(db));

    let bad = schema(r#"{"123Invalid":{"field-name":"varchar"},"EmptyObject":{}}"#);
    let err = manager.create_tenant(TenantId::new(), &bad).await.unwrap_err();
    assert!(matches!(err, Error::InvalidSchema(_)));
    assert!(manager.list_tenants().await.is_empty());
}

#[tokio::test]
async fn cross_tenant_rules_are_invisible() {
    let db = MemoryDb::new();
    let store = MemoryTenantStore::new(db.clone());
    let manager = TenantManager::new(store.clone());

    let tenant_a = provision(&manager, &store, "a", &user_schema()).await;
    let tenant_b = provision(&manager, &store, "b", &user_schema()).await;

    let engine_a = manager.get_engine(tenant_a).await.unwrap();
    engine_a
        .add_rule(new_rule("rA", "adult", "User.Age >= 18"))
        .await
        .unwrap();

    let engine_b = manager.get_engine(tenant_b).await.unwrap();
    let facts = json!({"User": {"Age": 25}});

    // evaluate, get, update, delete through B: all denied
    assert!(matches!(
        engine_b.evaluate("rA", &facts).await,
        Err(Error::RuleNotFound { .. })
    ));
    assert!(matches!(
        engine_b.store().get("rA").await,
        Err(Error::RuleNotFound { .. })
    ));
    assert!(matches!(
        engine_b
            .update_rule(new_rule("rA", "hijack", "true"))
            .await,
        Err(Error::RuleNotFound { .. })
    ));
    assert!(matches!(
        engine_b.delete_rule("rA").await,
        Err(Error::RuleNotFound { .. })
    ));

    // and B's active list never contains A's rule
    let results = engine_b.evaluate_all(&facts).await.unwrap();
    assert!(results.is_empty());

    // A is untouched by all of the above
    let results = engine_a.evaluate_all(&facts).await.unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].matched);
}

#[tokio::test]
async fn schema_update_bumps_version_and_keeps_compatible_rules() {
    let db = MemoryDb::new();
    let store = MemoryTenantStore::new(db.clone());
    let manager = TenantManager::new(store.clone());

    let tenant = provision(&manager, &store, "acme", &user_schema()).await;
    let engine = manager.get_engine(tenant).await.unwrap();
    engine
        .add_rule(new_rule("r1", "adult", "User.Age >= 18"))
        .await
        .unwrap();

    let wider = schema(
        r#"{"User":{"Age":"int","Email":"string"},"Transaction":{"Amount":"float64"}}"#,
    );
    let update = manager.update_tenant_schema(tenant, &wider).await.unwrap();
    assert_eq!(update.version, 2);
    assert!(update.skipped.is_empty(), "superset schema keeps every rule");

    // schema rows: exactly one active, and it is the max version
    {
        let schemas = db.schemas.lock();
        let rows = schemas.get(&tenant).unwrap();
        assert_eq!(rows.len(), 2);
        let active: Vec<_> = rows.iter().filter(|r| r.active).collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].version, 2);
    }

    // a rule compilable under S1 still matches identical facts under S2
    let engine = manager.get_engine(tenant).await.unwrap();
    let result = engine.evaluate("r1", &json!({"User": {"Age": 25}})).await.unwrap();
    assert!(result.matched);

    // and the wider schema is actually in effect
    engine
        .add_rule(new_rule("r2", "big-spender", "Transaction.Amount > 100.0"))
        .await
        .unwrap();
}

#[tokio::test]
async fn schema_update_swap_is_atomic_for_in_flight_handles() {
    let db = MemoryDb::new();
    let store = MemoryTenantStore::new(db.clone());
    let manager = TenantManager::new(store.clone());

    let tenant = provision(&manager, &store, "acme", &user_schema()).await;
    let old_engine = manager.get_engine(tenant).await.unwrap();
    old_engine
        .add_rule(new_rule("r1", "adult", "User.Age >= 18"))
        .await
        .unwrap();

    let wider = schema(r#"{"User":{"Age":"int","Email":"string"}}"#);
    manager.update_tenant_schema(tenant, &wider).await.unwrap();

    let new_engine = manager.get_engine(tenant).await.unwrap();
    assert!(
        !Arc::ptr_eq(&old_engine, &new_engine),
        "the map now holds a different engine"
    );

    // the orphaned engine finishes its work normally
    let result = old_engine
        .evaluate("r1", &json!({"User": {"Age": 25}}))
        .await
        .unwrap();
    assert!(result.matched);

    // and the new engine recompiled the rule against the new environment
    let result = new_engine
        .evaluate("r1", &json!({"User": {"Age": 25}}))
        .await
        .unwrap();
    assert!(result.matched);
}

#[tokio::test]
async fn schema_update_reports_rules_that_stop_compiling() {
    let db = MemoryDb::new();
    let store = MemoryTenantStore::new(db.clone());
    let manager = TenantManager::new(store.clone());

    let wide = schema(r#"{"User":{"Age":"int"},"Account":{"Balance":"int"}}"#);
    let tenant = provision(&manager, &store, "acme", &wide).await;
    let engine = manager.get_engine(tenant).await.unwrap();
    engine
        .add_rule(new_rule("r1", "adult", "User.Age >= 18"))
        .await
        .unwrap();
    engine
        .add_rule(new_rule("r2", "in-credit", "Account.Balance > 0"))
        .await
        .unwrap();

    // narrow the schema: the Account object disappears
    let update = manager
        .update_tenant_schema(tenant, &user_schema())
        .await
        .unwrap();
    assert_eq!(update.version, 2);
    assert_eq!(update.skipped.len(), 1);
    assert_eq!(update.skipped[0].rule_id, "r2");

    // the swap completed: surviving rule evaluates, broken one reports
    let engine = manager.get_engine(tenant).await.unwrap();
    let results = engine.evaluate_all(&json!({"User": {"Age": 25}})).await.unwrap();
    assert_eq!(results.len(), 2);
    assert!(results[0].matched);
    assert!(results[1].error.as_deref().unwrap().contains("not compiled"));
}

#[tokio::test]
async fn schema_update_loads_unregistered_tenant() {
    let db = MemoryDb::new();
    let store = MemoryTenantStore::new(db.clone());
    let manager = TenantManager::new(store.clone());

    // tenant exists in the database but was never loaded into this manager
    let tenant = TenantId::new();
    store.create_tenant(tenant, "acme", &user_schema()).await.unwrap();
    store
        .rule_store(tenant)
        .add(&new_rule("r1", "adult", "User.Age >= 18"))
        .await
        .unwrap();

    let update = manager
        .update_tenant_schema(tenant, &user_schema())
        .await
        .unwrap();
    assert_eq!(update.version, 2);

    let engine = manager.get_engine(tenant).await.unwrap();
    assert!(engine.has_program("r1"));
}

#[tokio::test]
async fn repeated_updates_keep_exactly_one_active_schema() {
    let db = MemoryDb::new();
    let store = MemoryTenantStore::new(db.clone());
    let manager = TenantManager::new(store.clone());

    let tenant = provision(&manager, &store, "acme", &user_schema()).await;
    for _ in 0..4 {
        manager
            .update_tenant_schema(tenant, &user_schema())
            .await
            .unwrap();
    }

    let schemas = db.schemas.lock();
    let rows = schemas.get(&tenant).unwrap();
    assert_eq!(rows.len(), 5);
    let active: Vec<_> = rows.iter().filter(|r| r.active).collect();
    assert_eq!(active.len(), 1);
    assert_eq!(
        active[0].version,
        rows.iter().map(|r| r.version).max().unwrap()
    );
}

#[tokio::test]
async fn update_rejects_invalid_schema_without_touching_rows() {
    let db = MemoryDb::new();
    let store = MemoryTenantStore::new(db.clone());
    let manager = TenantManager::new(store.clone());

    let tenant = provision(&manager, &store, "acme", &user_schema()).await;

    let bad = schema(r#"{"User":{"Age":"varchar"}}"#);
    let err = manager.update_tenant_schema(tenant, &bad).await.unwrap_err();
    assert!(matches!(err, Error::InvalidSchema(_)));

    let schemas = db.schemas.lock();
    assert_eq!(schemas.get(&tenant).unwrap().len(), 1, "no row written");
}

#[tokio::test]
async fn delete_tenant_drops_the_engine_only() {
    let db = MemoryDb::new();
    let store = MemoryTenantStore::new(db.clone());
    let manager = TenantManager::new(store.clone());

    let tenant = provision(&manager, &store, "acme", &user_schema()).await;
    manager.delete_tenant(tenant).await.unwrap();

    assert!(matches!(
        manager.get_engine(tenant).await,
        Err(Error::TenantNotFound { .. })
    ));
    assert!(matches!(
        manager.delete_tenant(tenant).await,
        Err(Error::TenantNotFound { .. })
    ));

    // the rows are the caller's concern and are still there
    assert!(db.tenants.lock().contains_key(&tenant));
}

#[tokio::test]
async fn load_all_tenants_builds_one_engine_per_tenant() {
    let db = MemoryDb::new();
    let store = MemoryTenantStore::new(db.clone());

    let tenant_a = TenantId::new();
    let tenant_b = TenantId::new();
    store.create_tenant(tenant_a, "a", &user_schema()).await.unwrap();
    store.create_tenant(tenant_b, "b", &user_schema()).await.unwrap();
    store
        .rule_store(tenant_a)
        .add(&new_rule("r1", "adult", "User.Age >= 18"))
        .await
        .unwrap();

    let manager = TenantManager::new(store.clone());
    let loaded = manager.load_all_tenants().await.unwrap();
    assert_eq!(loaded, 2);

    let engine_a = manager.get_engine(tenant_a).await.unwrap();
    assert!(engine_a.has_program("r1"));
    let engine_b = manager.get_engine(tenant_b).await.unwrap();
    assert_eq!(engine_b.program_count(), 0);
}

#[tokio::test]
async fn concurrent_lookup_and_swap() {
    let db = MemoryDb::new();
    let store = MemoryTenantStore::new(db.clone());
    let manager = Arc::new(TenantManager::new(store.clone()));

    let tenant = provision(&manager, &store, "acme", &user_schema()).await;
    let engine = manager.get_engine(tenant).await.unwrap();
    engine
        .add_rule(new_rule("r1", "adult", "User.Age >= 18"))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..6 {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..30 {
                let engine = manager.get_engine(tenant).await.unwrap();
                let result = engine
                    .evaluate("r1", &json!({"User": {"Age": 25}}))
                    .await
                    .unwrap();
                assert!(result.matched);
            }
        }));
    }
    {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..10 {
                manager
                    .update_tenant_schema(tenant, &user_schema())
                    .await
                    .unwrap();
            }
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }
}
