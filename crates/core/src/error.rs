use thiserror::Error;

use crate::types::TenantId;

/// Errors surfaced by the rules engine and its stores.
///
/// Variants map one-to-one onto the error kinds callers see in API
/// responses: validation problems are the caller's fault, `NotFound` /
/// `AlreadyExists` describe resource state, and store failures carry the
/// operation that hit them so the original cause is never lost.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// Expression compile failure. The message carries the compiler
    /// diagnostic verbatim and is never wrapped a second time.
    #[error("rule validation failed: {0}")]
    InvalidExpression(String),

    #[error("Tenant not found: {id}")]
    TenantNotFound { id: TenantId },

    #[error("Rule not found: {id}")]
    RuleNotFound { id: String },

    #[error("Rule already exists: {id}")]
    RuleAlreadyExists { id: String },

    /// Per-rule failure at evaluate time (cost limit, missing field, type
    /// error). Captured into the rule's result; never aborts a batch.
    #[error("Evaluation failed: {0}")]
    Evaluation(String),

    /// Backing-store failure wrapped with the operation that issued it.
    #[error("{op}: {source}")]
    Store {
        op: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Wrap a store error with the operation that produced it.
    ///
    /// ```ignore
    /// sqlx::query(..).execute(pool).await.map_err(Error::store("insert rule"))?;
    /// ```
    pub fn store(op: impl Into<String>) -> impl FnOnce(sqlx::Error) -> Error {
        let op = op.into();
        move |source| Error::Store { op, source }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::TenantNotFound { .. } | Error::RuleNotFound { .. }
        )
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::RuleAlreadyExists { .. })
    }

    /// Stable machine-readable kind used by API responses and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidInput(_) => "invalid_input",
            Error::InvalidSchema(_) => "invalid_schema",
            Error::InvalidExpression(_) => "invalid_expression",
            Error::TenantNotFound { .. } | Error::RuleNotFound { .. } => "not_found",
            Error::RuleAlreadyExists { .. } => "already_exists",
            Error::Evaluation(_) => "evaluation_error",
            Error::Store { .. } | Error::Database(_) => "store_error",
            Error::Serialization(_) => "serialization_error",
            Error::Config(_) => "configuration_error",
            Error::Internal(_) => "internal_error",
        }
    }
}
