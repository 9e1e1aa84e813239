//! Multi-tenant rules-evaluation engine.
//!
//! Tenant-supplied boolean expressions are compiled once against the
//! tenant's declared fact schema, cached as programs inside a per-tenant
//! [`Engine`], and executed against live fact payloads. A [`TenantManager`]
//! owns one engine per tenant and swaps engines atomically when a tenant's
//! schema changes, so in-flight evaluations always finish against a
//! consistent environment.

pub mod cache;
pub mod engine;
pub mod env;
pub mod manager;
pub mod model;
pub mod schema;
pub mod store;

pub use cache::ActiveRuleCache;
pub use engine::{CompileFailure, Engine};
pub use env::{ExprEnv, MAX_EVAL_COST};
pub use manager::{SchemaUpdate, TenantManager};
pub use model::{
    EvaluationRequest, EvaluationResponse, NewRule, Rule, RuleResult, Tenant, TenantSnapshot,
};
pub use schema::SchemaDef;
pub use store::{PgRuleStore, PgTenantStore, RuleStore, TenantStore};
