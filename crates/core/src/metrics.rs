//! Prometheus metrics.
//!
//! A process-wide registry plus the counter set the engine increments on its
//! hot paths. Counters are incremented unconditionally even where the
//! corresponding log line is sampled away.

use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, Registry, TextEncoder};
use tracing::warn;

/// Namespaced wrapper around a prometheus [`Registry`].
#[derive(Debug, Clone)]
pub struct MetricsRegistry {
    registry: Registry,
}

impl MetricsRegistry {
    pub fn new(namespace: &str) -> Self {
        let registry = Registry::new_custom(Some(namespace.to_string()), None)
            .unwrap_or_else(|_| {
                warn!("failed to create custom registry, using default");
                Registry::new()
            });

        Self { registry }
    }

    pub fn register<T>(&self, collector: T) -> Result<(), prometheus::Error>
    where
        T: prometheus::core::Collector + 'static,
    {
        self.registry.register(Box::new(collector))
    }

    pub fn gather(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }

    /// Text exposition format served on `/metrics`.
    pub fn metrics_text(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.gather();

        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            warn!("failed to encode metrics: {}", e);
            return String::new();
        }

        String::from_utf8(buffer).unwrap_or_else(|e| {
            warn!("failed to convert metrics to UTF-8: {}", e);
            String::new()
        })
    }
}

/// Counters maintained by the engines and the tenant manager.
#[derive(Debug, Clone)]
pub struct EngineMetrics {
    pub evaluations_total: IntCounter,
    pub evaluation_errors_total: IntCounter,
    pub compilations_total: IntCounter,
    pub compile_errors_total: IntCounter,
    pub cache_hits_total: IntCounter,
    pub cache_misses_total: IntCounter,
    pub engine_swaps_total: IntCounter,
    pub suppressed_logs_total: IntCounter,
}

impl EngineMetrics {
    fn new(registry: &MetricsRegistry) -> Self {
        let counter = |name: &str, help: &str| {
            let c = IntCounter::new(name, help).expect("valid counter name");
            if let Err(e) = registry.register(c.clone()) {
                warn!(counter = name, "failed to register metric: {}", e);
            }
            c
        };

        Self {
            evaluations_total: counter(
                "rule_evaluations_total",
                "Total number of rule evaluations performed",
            ),
            evaluation_errors_total: counter(
                "rule_evaluation_errors_total",
                "Rule evaluations that ended in a per-rule error",
            ),
            compilations_total: counter(
                "rule_compilations_total",
                "Total number of successful rule compilations",
            ),
            compile_errors_total: counter(
                "rule_compile_errors_total",
                "Rule compilations rejected by the expression compiler",
            ),
            cache_hits_total: counter(
                "active_rule_cache_hits_total",
                "Active-rule cache hits during evaluate-all",
            ),
            cache_misses_total: counter(
                "active_rule_cache_misses_total",
                "Active-rule cache misses during evaluate-all",
            ),
            engine_swaps_total: counter(
                "engine_swaps_total",
                "Tenant engines replaced by schema updates",
            ),
            suppressed_logs_total: counter(
                "suppressed_logs_total",
                "Log lines dropped by the error-log sampler",
            ),
        }
    }

    /// Process-wide counter set, registered in [`registry`].
    pub fn global() -> &'static EngineMetrics {
        static METRICS: Lazy<EngineMetrics> = Lazy::new(|| EngineMetrics::new(registry()));
        &METRICS
    }
}

/// Process-wide registry backing [`EngineMetrics::global`].
pub fn registry() -> &'static MetricsRegistry {
    static REGISTRY: Lazy<MetricsRegistry> = Lazy::new(|| MetricsRegistry::new("verdict"));
    &REGISTRY
}
