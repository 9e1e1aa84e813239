//! Row types and wire shapes.

use crate::schema::SchemaDef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use verdict_core::TenantId;

/// A persisted rule.
///
/// `id` is globally unique; `(tenant_id, name)` is unique per tenant.
/// `active` rules participate in evaluate-all, in ascending `created_at`
/// order. Timestamps are maintained by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: String,
    pub tenant_id: TenantId,
    pub name: String,
    pub expression: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Mutation input for a rule; the store assigns timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRule {
    pub id: String,
    pub name: String,
    pub expression: String,
    pub active: bool,
}

/// A tenant row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A tenant with its currently active schema, as loaded at startup.
#[derive(Debug, Clone)]
pub struct TenantSnapshot {
    pub tenant: Tenant,
    /// `None` when the tenant has no active schema row.
    pub schema: Option<SchemaDef>,
}

/// The public evaluate verb.
///
/// `rules` empty or omitted means "evaluate all active rules".
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationRequest {
    pub tenant_id: TenantId,
    pub facts: Value,
    #[serde(default)]
    pub rules: Vec<String>,
}

/// Outcome of evaluating one rule against one fact payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleResult {
    pub rule_id: String,
    pub rule_name: String,
    pub matched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Raw value the expression produced, when evaluation produced one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<Value>,
}

impl RuleResult {
    pub fn matched(id: impl Into<String>, name: impl Into<String>, trace: Option<Value>) -> Self {
        Self {
            rule_id: id.into(),
            rule_name: name.into(),
            matched: true,
            error: None,
            trace,
        }
    }

    pub fn unmatched(id: impl Into<String>, name: impl Into<String>, trace: Option<Value>) -> Self {
        Self {
            rule_id: id.into(),
            rule_name: name.into(),
            matched: false,
            error: None,
            trace,
        }
    }

    pub fn failed(id: impl Into<String>, name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            rule_id: id.into(),
            rule_name: name.into(),
            matched: false,
            error: Some(error.into()),
            trace: None,
        }
    }
}

/// Wire response for the evaluate verb. Results preserve evaluation order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResponse {
    pub results: Vec<RuleResult>,
    /// Wall-clock duration of the evaluation, e.g. `"1.234ms"`.
    pub evaluation_time: String,
}
