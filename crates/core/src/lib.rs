pub mod config;
pub mod database;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod types;

pub use config::{Config, DatabaseConfig, LogLevel, LoggingConfig, ServerConfig};
pub use error::{Error, Result};
pub use logging::LogSampler;
pub use metrics::{EngineMetrics, MetricsRegistry};
pub use types::TenantId;


// Re-export commonly used types from dependencies
pub use chrono::{DateTime, Utc};
pub use uuid::Uuid;
